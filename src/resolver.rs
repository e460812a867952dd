use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::domain::{
    AlignmentRecord, ConditionGroup, ExpressionRecord, ExpressionSet, ObjectRef, SampleLink,
};
use crate::error::DiffExprError;
use crate::manifest::{AssemblyManifest, MANIFEST_FILE, ManifestWriter};
use crate::platform::{DataDownloads, ObjectStore};

pub const EXPRESSION_ANNOTATION: &str = "transcripts.gtf";
pub const DEFAULT_ALIGNMENT: &str = "accepted_hits.bam";

#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub genome_ref: ObjectRef,
    pub reference_annotation: Utf8PathBuf,
    pub manifest: AssemblyManifest,
    pub conditions: Vec<ConditionGroup>,
}

impl PreparedInputs {
    pub fn labels(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .map(|group| group.label.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSheet {
    pub genome_ref: ObjectRef,
    pub samples: Vec<SampleLink>,
}

pub struct Resolver<'a, S: ObjectStore, D: DataDownloads> {
    store: &'a S,
    downloads: &'a D,
}

impl<'a, S: ObjectStore, D: DataDownloads> Resolver<'a, S, D> {
    pub fn new(store: &'a S, downloads: &'a D) -> Self {
        Self { store, downloads }
    }

    pub fn load_set(&self, set_ref: &ObjectRef) -> Result<ExpressionSet, DiffExprError> {
        let object = self.store.get_object(set_ref)?;
        info!(
            set = %set_ref,
            name = %object.info.name,
            type_tag = %object.info.type_tag,
            "loaded expression set"
        );
        ExpressionSet::from_stored(&object)
    }

    pub fn sample_sheet(&self, set: &ExpressionSet) -> Result<SampleSheet, DiffExprError> {
        match set {
            ExpressionSet::RnaSeq(set) => {
                let mut samples = Vec::new();
                for mapping in &set.mapped_expression_ids {
                    // Keys come back sorted, so several per mapping would lose sample order.
                    if mapping.len() > 1 {
                        return Err(DiffExprError::MalformedResponse(format!(
                            "expected one alignment per mapped_expression_ids entry, found {}",
                            mapping.len()
                        )));
                    }
                    for (alignment_ref, expression_ref) in mapping {
                        let alignment: AlignmentRecord =
                            self.store.get_object(alignment_ref)?.decode()?;
                        samples.push(SampleLink {
                            expression_ref: expression_ref.clone(),
                            alignment_ref: alignment_ref.clone(),
                            condition: alignment.condition,
                        });
                    }
                }
                Ok(SampleSheet {
                    genome_ref: set.genome_id.clone(),
                    samples,
                })
            }
            ExpressionSet::Generic(set) => {
                let mut genome_ref: Option<ObjectRef> = None;
                let mut samples = Vec::new();
                for item in &set.items {
                    let expression: ExpressionRecord =
                        self.store.get_object(&item.reference)?.decode()?;
                    let alignment_ref = expression
                        .mapped_rnaseq_alignment
                        .values()
                        .next()
                        .cloned()
                        .ok_or_else(|| {
                            DiffExprError::Materialization(format!(
                                "expression {} has no mapped alignment",
                                item.reference
                            ))
                        })?;
                    match &genome_ref {
                        None => genome_ref = Some(expression.genome_id.clone()),
                        Some(first) if *first != expression.genome_id => warn!(
                            expression = %item.reference,
                            genome = %expression.genome_id,
                            using = %first,
                            "expression references a different genome"
                        ),
                        Some(_) => {}
                    }
                    samples.push(SampleLink {
                        expression_ref: item.reference.clone(),
                        alignment_ref,
                        condition: expression.condition,
                    });
                }
                let genome_ref = genome_ref.ok_or_else(|| {
                    DiffExprError::Materialization("expression set has no items".to_string())
                })?;
                Ok(SampleSheet {
                    genome_ref,
                    samples,
                })
            }
        }
    }

    pub fn prepare(
        &self,
        sheet: &SampleSheet,
        result_dir: &Utf8Path,
        genome_dir: &Utf8Path,
    ) -> Result<PreparedInputs, DiffExprError> {
        if sheet.samples.is_empty() {
            return Err(DiffExprError::Materialization(
                "expression set has no samples".to_string(),
            ));
        }

        let mut manifest = ManifestWriter::create(&result_dir.join(MANIFEST_FILE))?;
        let mut groups: Vec<(String, Vec<Utf8PathBuf>)> = Vec::new();

        for sample in &sheet.samples {
            check_condition_label(&sample.condition)?;

            let expression_dir = utf8(self.downloads.download_expression(&sample.expression_ref)?)?;
            let annotation = expression_dir.join(EXPRESSION_ANNOTATION);
            if !annotation.as_std_path().is_file() {
                return Err(DiffExprError::Materialization(format!(
                    "{annotation} not found"
                )));
            }
            info!(expression = %sample.expression_ref, path = %annotation, "adding annotation");
            manifest.push(&annotation)?;

            let alignment_dir = utf8(self.downloads.download_alignment(&sample.alignment_ref)?)?;
            let labelled = label_alignment_dir(&alignment_dir, &sample.condition)?;
            debug!(alignment = %sample.alignment_ref, dir = %labelled, "alignment ready");

            match groups.iter_mut().find(|(label, _)| *label == sample.condition) {
                Some((_, dirs)) => dirs.push(labelled),
                None => groups.push((sample.condition.clone(), vec![labelled])),
            }
        }
        let manifest = manifest.finish()?;

        let reference_annotation = utf8(
            self.downloads
                .genome_annotation(&sheet.genome_ref, genome_dir.as_std_path())?,
        )?;
        if !reference_annotation.as_std_path().is_file() {
            return Err(DiffExprError::Materialization(format!(
                "annotation for genome {} not found at {reference_annotation}",
                sheet.genome_ref
            )));
        }

        let conditions = groups
            .into_iter()
            .map(|(label, dirs)| {
                let alignments = dirs
                    .iter()
                    .map(|dir| select_alignment(dir))
                    .collect::<Result<Vec<_>, DiffExprError>>()?;
                Ok(ConditionGroup { label, alignments })
            })
            .collect::<Result<Vec<_>, DiffExprError>>()?;

        Ok(PreparedInputs {
            genome_ref: sheet.genome_ref.clone(),
            reference_annotation,
            manifest,
            conditions,
        })
    }
}

pub fn select_alignment(dir: &Utf8Path) -> Result<Utf8PathBuf, DiffExprError> {
    let mut bams = Vec::new();
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| DiffExprError::Materialization(format!("read {dir}: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "bam") {
            bams.push(path);
        }
    }
    bams.sort();

    let chosen = match bams.len() {
        0 => {
            return Err(DiffExprError::Materialization(format!(
                "bam file does not exist in {dir}"
            )));
        }
        1 => utf8(bams.remove(0))?,
        _ => dir.join(DEFAULT_ALIGNMENT),
    };

    let size = fs::metadata(chosen.as_std_path())
        .map(|meta| meta.len())
        .map_err(|_| DiffExprError::Materialization(format!("{chosen} does not exist")))?;
    if size == 0 {
        return Err(DiffExprError::Materialization(format!("{chosen} is empty")));
    }
    Ok(chosen)
}

pub fn label_alignment_dir(dir: &Utf8Path, condition: &str) -> Result<Utf8PathBuf, DiffExprError> {
    let parent = dir.parent().ok_or_else(|| {
        DiffExprError::Materialization(format!("alignment directory has no parent: {dir}"))
    })?;
    let name = dir.file_name().ok_or_else(|| {
        DiffExprError::Materialization(format!("alignment directory has no name: {dir}"))
    })?;
    let target = parent.join(format!("{condition}_{name}"));
    fs::rename(dir.as_std_path(), target.as_std_path()).map_err(|err| {
        DiffExprError::Filesystem(format!("rename {dir} -> {target}: {err}"))
    })?;
    Ok(target)
}

fn check_condition_label(label: &str) -> Result<(), DiffExprError> {
    if label.trim().is_empty() || label.contains([',', '/']) || label.contains(char::is_whitespace) {
        return Err(DiffExprError::Materialization(format!(
            "unusable condition label {label:?}"
        )));
    }
    Ok(())
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf, DiffExprError> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        DiffExprError::Materialization(format!("non-utf8 path: {}", path.display()))
    })
}
