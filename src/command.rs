use camino::Utf8Path;

use crate::config::AdvancedOptions;
use crate::domain::ConditionGroup;

pub const MERGED_ANNOTATION: &str = "merged.gtf";
pub const GENE_DIFF_FILE: &str = "gene_exp.diff";

pub fn cuffmerge_args(
    threads: usize,
    output_dir: &Utf8Path,
    reference_annotation: &Utf8Path,
    manifest: &Utf8Path,
) -> Vec<String> {
    vec![
        "-p".to_string(),
        threads.to_string(),
        "-o".to_string(),
        output_dir.to_string(),
        "-g".to_string(),
        reference_annotation.to_string(),
        manifest.to_string(),
    ]
}

pub fn cuffdiff_args(
    threads: usize,
    output_dir: &Utf8Path,
    merged_annotation: &Utf8Path,
    conditions: &[ConditionGroup],
    options: &AdvancedOptions,
) -> Vec<String> {
    let mut args_vec: Vec<String> = Vec::new();
    args_vec.push("-p".to_string());
    args_vec.push(threads.to_string());

    if options.time_series {
        args_vec.push("-T".to_string());
    }
    if let Some(count) = options.min_alignment_count {
        args_vec.push("-c".to_string());
        args_vec.push(count.to_string());
    }
    if options.multi_read_correct {
        args_vec.push("--multi-read-correct".to_string());
    }
    if let Some(library_type) = &options.library_type {
        args_vec.push("--library-type".to_string());
        args_vec.push(library_type.clone());
    }
    if let Some(method) = &options.library_norm_method {
        args_vec.push("--library-norm-method".to_string());
        args_vec.push(method.clone());
    }

    let labels = conditions
        .iter()
        .map(|group| group.label.as_str())
        .collect::<Vec<_>>()
        .join(",");
    args_vec.push("-o".to_string());
    args_vec.push(output_dir.to_string());
    args_vec.push("-L".to_string());
    args_vec.push(labels);
    args_vec.push(merged_annotation.to_string());
    args_vec.extend(conditions.iter().map(ConditionGroup::joined));
    args_vec
}
