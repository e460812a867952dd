use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::command::{self, GENE_DIFF_FILE, MERGED_ANNOTATION};
use crate::config::{ResolvedConfig, RunParams, ToolPaths};
use crate::diff_output::{self, DiffExprTable};
use crate::domain::{ObjectRef, WorkspaceName};
use crate::error::DiffExprError;
use crate::platform::{DataDownloads, ObjectStore, ReportService, ResultStore, SaveMatrixSetParams};
use crate::report::ReportBuilder;
use crate::resolver::{PreparedInputs, Resolver};
use crate::runner::{ToolInvocation, ToolRunner};
use crate::scratch::ScratchLayout;

pub const TOOL_NAME: &str = "cuffdiff";

pub trait Platform: ObjectStore + DataDownloads + ResultStore + ReportService {}

impl<T: ObjectStore + DataDownloads + ResultStore + ReportService> Platform for T {}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub scratch: PathBuf,
    pub tools: ToolPaths,
    pub num_threads: usize,
    pub tool_version: String,
}

impl From<&ResolvedConfig> for RunSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            scratch: config.scratch.clone(),
            tools: config.tools.clone(),
            num_threads: config.num_threads,
            tool_version: config.tool_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub result_directory: String,
    #[serde(rename = "diffExprMatrixSet_ref")]
    pub diff_expr_matrix_set_ref: ObjectRef,
    pub report_name: String,
    pub report_ref: ObjectRef,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub struct App<P: Platform, T: ToolRunner> {
    platform: P,
    runner: T,
    settings: RunSettings,
}

impl<P: Platform, T: ToolRunner> App<P, T> {
    pub fn new(platform: P, runner: T, settings: RunSettings) -> Self {
        Self {
            platform,
            runner,
            settings,
        }
    }

    pub fn run(&self, params: &RunParams, sink: &dyn ProgressSink) -> Result<RunResult, DiffExprError> {
        sink.event(ProgressEvent {
            message: "phase=Validate; checking parameters".to_string(),
            elapsed: None,
        });
        let required = params.required()?;
        self.check_workspace(&required.workspace_name)?;

        let scratch = Utf8PathBuf::from_path_buf(self.settings.scratch.clone()).map_err(|path| {
            DiffExprError::Filesystem(format!("non-utf8 scratch path: {}", path.display()))
        })?;
        let layout = ScratchLayout::create(&scratch)?;
        info!(run = layout.run_id(), root = %layout.root(), "scratch ready");

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; expression set {}", required.expressionset_ref),
            elapsed: None,
        });
        let start = Instant::now();
        let inputs = self.prepare_inputs(&required.expressionset_ref, &layout)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} conditions, {} samples",
                inputs.conditions.len(),
                inputs.manifest.entries().len()
            ),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: "phase=Merge; running cuffmerge".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let merged = self.run_merge(&inputs, &layout)?;
        sink.event(ProgressEvent {
            message: format!("phase=Merge; merged annotation {merged}"),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: "phase=Diff; running cuffdiff".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let diff_dir = layout.unique_dir("cuffdiff_")?;
        self.run_diff(&inputs, &merged, &diff_dir, params)?;
        sink.event(ProgressEvent {
            message: "phase=Diff; cuffdiff finished".to_string(),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: "phase=Parse; reading differential expression table".to_string(),
            elapsed: None,
        });
        let table = diff_output::parse_diff_file(&diff_dir.join(GENE_DIFF_FILE))?;
        info!(
            comparisons = table.comparisons.len(),
            rows = table.row_count(),
            "parsed cuffdiff output"
        );

        sink.event(ProgressEvent {
            message: "phase=Store; saving differential expression matrix set".to_string(),
            elapsed: None,
        });
        let destination_ref = format!("{}/{}", required.workspace_name, required.output_obj_name);
        let matrix_set_ref = self.save_results(&table, &inputs.genome_ref, destination_ref, &layout)?;
        info!(matrix_set = %matrix_set_ref, "saved differential expression matrix set");

        sink.event(ProgressEvent {
            message: "phase=Report; building report".to_string(),
            elapsed: None,
        });
        let report = ReportBuilder::new(&self.platform, &self.platform, &layout).build(
            &matrix_set_ref,
            &required.workspace_name.to_string(),
            &diff_dir,
        )?;

        Ok(RunResult {
            result_directory: diff_dir.to_string(),
            diff_expr_matrix_set_ref: matrix_set_ref,
            report_name: report.name,
            report_ref: report.reference,
            finished_at: iso_timestamp(),
        })
    }

    fn check_workspace(&self, workspace: &WorkspaceName) -> Result<(), DiffExprError> {
        let WorkspaceName::Name(name) = workspace else {
            return Ok(());
        };
        match self.platform.workspace_id(name) {
            Ok(_) => Ok(()),
            // Only a service-side rejection means the name is bad.
            Err(DiffExprError::ServiceCall { message, .. }) => {
                let prefix = message.split('.').next().unwrap_or_default().to_string();
                Err(DiffExprError::Validation(prefix))
            }
            Err(other) => Err(other),
        }
    }

    pub fn prepare_inputs(
        &self,
        set_ref: &ObjectRef,
        layout: &ScratchLayout,
    ) -> Result<PreparedInputs, DiffExprError> {
        let resolver = Resolver::new(&self.platform, &self.platform);
        let set = resolver.load_set(set_ref)?;
        let sheet = resolver.sample_sheet(&set)?;
        let result_dir = layout.unique_dir("expset_")?;
        resolver.prepare(&sheet, &result_dir, layout.root())
    }

    fn run_merge(
        &self,
        inputs: &PreparedInputs,
        layout: &ScratchLayout,
    ) -> Result<Utf8PathBuf, DiffExprError> {
        let merge_dir = layout.unique_dir("cuffmerge_")?;
        let invocation = ToolInvocation::new(
            self.settings.tools.cuffmerge.clone(),
            command::cuffmerge_args(
                self.settings.num_threads,
                &merge_dir,
                &inputs.reference_annotation,
                inputs.manifest.path(),
            ),
        )
        .in_dir(merge_dir.clone());
        self.runner.run(&invocation)?;

        let merged = merge_dir.join(MERGED_ANNOTATION);
        if !merged.as_std_path().is_file() {
            return Err(DiffExprError::ToolExecution {
                command: invocation.command_line(),
                cause: format!("expected output {merged} was not produced"),
            });
        }
        Ok(merged)
    }

    fn run_diff(
        &self,
        inputs: &PreparedInputs,
        merged: &Utf8Path,
        diff_dir: &Utf8Path,
        params: &RunParams,
    ) -> Result<(), DiffExprError> {
        let invocation = ToolInvocation::new(
            self.settings.tools.cuffdiff.clone(),
            command::cuffdiff_args(
                self.settings.num_threads,
                diff_dir,
                merged,
                &inputs.conditions,
                &params.advanced(),
            ),
        )
        .in_dir(diff_dir);
        self.runner.run(&invocation)?;
        Ok(())
    }

    fn save_results(
        &self,
        table: &DiffExprTable,
        genome_ref: &ObjectRef,
        destination_ref: String,
        layout: &ScratchLayout,
    ) -> Result<ObjectRef, DiffExprError> {
        let comparisons_dir = layout.unique_dir("diffexpr_")?;
        let diffexpr_data = diff_output::write_comparison_files(table, &comparisons_dir)?;
        let params = SaveMatrixSetParams {
            destination_ref,
            genome_ref: genome_ref.clone(),
            tool_used: TOOL_NAME.to_string(),
            tool_version: self.settings.tool_version.clone(),
            diffexpr_data,
        };
        self.platform.save_matrix_set(&params)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
