use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use serde_json::{Value, json};

use kira_diffexpr::app::{App, ProgressEvent, ProgressSink, RunSettings};
use kira_diffexpr::config::{RunParams, ToolPaths};
use kira_diffexpr::domain::{ObjectInfo, ObjectRef, StoredObject, WorkspaceName};
use kira_diffexpr::error::DiffExprError;
use kira_diffexpr::platform::{
    DataDownloads, ObjectStore, ReportInfo, ReportParams, ReportService, ResultStore,
    SaveMatrixSetParams,
};
use kira_diffexpr::runner::{ToolInvocation, ToolOutput, ToolRunner};

const DIFF_HEADER: &str = "test_id\tgene_id\tgene\tlocus\tsample_1\tsample_2\tstatus\tvalue_1\tvalue_2\tlog2(fold_change)\ttest_stat\tp_value\tq_value\tsignificant";

#[derive(Default)]
struct PlatformLog {
    saved: Mutex<Vec<SaveMatrixSetParams>>,
    reports: Mutex<Vec<ReportParams>>,
}

struct MockPlatform {
    root: PathBuf,
    objects: BTreeMap<String, StoredObject>,
    log: Arc<PlatformLog>,
}

impl MockPlatform {
    fn new(root: &Path) -> Self {
        let mut platform = Self {
            root: root.to_path_buf(),
            objects: BTreeMap::new(),
            log: Arc::new(PlatformLog::default()),
        };
        platform.insert(
            "1/30/1",
            "de_set",
            "KBaseSets.DifferentialExpressionMatrixSet-1.0",
            json!({"items": [{"ref": "1/31/1"}]}),
        );
        platform.insert(
            "1/31/1",
            "de_set-WT-MU",
            "KBaseFeatureValues.DifferentialExpressionMatrix-1.1",
            json!({"condition_mapping": {"WT": "MU"}}),
        );
        platform
    }

    fn insert(&mut self, reference: &str, name: &str, type_tag: &str, data: Value) {
        self.objects.insert(
            reference.to_string(),
            StoredObject {
                data,
                info: ObjectInfo {
                    name: name.to_string(),
                    type_tag: type_tag.to_string(),
                },
            },
        );
    }

    fn with_rnaseq_set(mut self) -> Self {
        let samples = [
            ("1/10/1", "1/11/1", "WT"),
            ("1/10/2", "1/11/2", "MU"),
            ("1/10/3", "1/11/3", "WT"),
            ("1/10/4", "1/11/4", "MU"),
        ];
        let mapped: Vec<Value> = samples
            .iter()
            .map(|(alignment, expression, _)| {
                let mut mapping = serde_json::Map::new();
                mapping.insert(alignment.to_string(), json!(expression));
                Value::Object(mapping)
            })
            .collect();
        self.insert(
            "1/5/1",
            "expression_set",
            "KBaseRNASeq.RNASeqExpressionSet-3.0",
            json!({"genome_id": "1/2/1", "mapped_expression_ids": mapped}),
        );
        for (alignment, _, condition) in samples {
            self.insert(
                alignment,
                "alignment",
                "KBaseRNASeq.RNASeqAlignment-4.0",
                json!({"condition": condition}),
            );
        }
        self
    }

    fn dir_for(&self, prefix: &str, reference: &ObjectRef) -> PathBuf {
        self.root
            .join(format!("{prefix}_{}", reference.as_str().replace('/', "_")))
    }
}

impl ObjectStore for MockPlatform {
    fn get_object(&self, reference: &ObjectRef) -> Result<StoredObject, DiffExprError> {
        self.objects
            .get(reference.as_str())
            .cloned()
            .ok_or_else(|| DiffExprError::ServiceCall {
                method: "Workspace.get_objects2".to_string(),
                message: format!("object {reference} not found"),
            })
    }

    fn workspace_id(&self, name: &str) -> Result<i64, DiffExprError> {
        if name == "missing_ws" {
            return Err(DiffExprError::ServiceCall {
                method: "DataFileUtil.ws_name_to_id".to_string(),
                message: "No workspace with name missing_ws exists. Traceback follows".to_string(),
            });
        }
        if name == "offline_ws" {
            return Err(DiffExprError::ServiceHttp(
                "error sending request for url (http://callback.example:9999/): connection refused"
                    .to_string(),
            ));
        }
        Ok(1)
    }
}

impl DataDownloads for MockPlatform {
    fn genome_annotation(
        &self,
        _genome_ref: &ObjectRef,
        target_dir: &Path,
    ) -> Result<PathBuf, DiffExprError> {
        let path = target_dir.join("genome.gtf");
        fs::write(&path, "chr1\tref\texon\t1\t100\t.\t+\t.\tgene_id \"g1\";\n").unwrap();
        Ok(path)
    }

    fn download_expression(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError> {
        let dir = self.dir_for("expression", reference);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("transcripts.gtf"), "chr1\tCufflinks\ttranscript\n").unwrap();
        Ok(dir)
    }

    fn download_alignment(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError> {
        let dir = self.dir_for("alignment", reference);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("accepted_hits.bam"), b"BAM\x01data").unwrap();
        fs::write(dir.join("unmapped.bam"), b"BAM\x01").unwrap();
        Ok(dir)
    }
}

impl ResultStore for MockPlatform {
    fn save_matrix_set(&self, params: &SaveMatrixSetParams) -> Result<ObjectRef, DiffExprError> {
        self.log.saved.lock().unwrap().push(params.clone());
        "1/30/1".parse()
    }
}

impl ReportService for MockPlatform {
    fn upload_directory(&self, dir: &Path) -> Result<String, DiffExprError> {
        assert!(dir.join("report.html").is_file());
        Ok("shock-1".to_string())
    }

    fn create_report(&self, params: &ReportParams) -> Result<ReportInfo, DiffExprError> {
        self.log.reports.lock().unwrap().push(params.clone());
        Ok(ReportInfo {
            name: params.report_object_name.clone(),
            reference: "1/40/1".parse()?,
        })
    }
}

#[derive(Clone, Default)]
struct MockTools {
    calls: Arc<Mutex<Vec<ToolInvocation>>>,
    fail_diff: bool,
}

impl ToolRunner for MockTools {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, DiffExprError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let dir = invocation.working_dir.clone().unwrap();
        match invocation.program.as_str() {
            "cuffmerge" => {
                fs::write(dir.join("merged.gtf"), "merged\n").unwrap();
            }
            "cuffdiff" if self.fail_diff => {
                return Err(DiffExprError::ToolExecution {
                    command: invocation.command_line(),
                    cause: "exit status 2".to_string(),
                });
            }
            "cuffdiff" => {
                let rows = [
                    "XLOC_000001\tg1\tgeneA\tchr1:1-100\tWT\tMU\tOK\t10\t20\t1\t-2.1\t0.0005\t0.002\tyes",
                    "XLOC_000002\tg2\tgeneB\tchr1:200-300\tWT\tMU\tNOTEST\t0\t0\t0\t0\t1\t1\tno",
                ];
                fs::write(
                    dir.join("gene_exp.diff"),
                    format!("{DIFF_HEADER}\n{}\n", rows.join("\n")),
                )
                .unwrap();
            }
            other => panic!("unexpected program {other}"),
        }
        Ok(ToolOutput::default())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn settings(scratch: &Path) -> RunSettings {
    RunSettings {
        scratch: scratch.to_path_buf(),
        tools: ToolPaths {
            cuffmerge: "cuffmerge".to_string(),
            cuffdiff: "cuffdiff".to_string(),
        },
        num_threads: 2,
        tool_version: "2.2.1".to_string(),
    }
}

fn params(workspace: &str) -> RunParams {
    RunParams {
        expressionset_ref: Some("1/5/1".to_string()),
        workspace_name: Some(WorkspaceName::Name(workspace.to_string())),
        output_obj_name: Some("de_out".to_string()),
        ..RunParams::default()
    }
}

#[test]
fn full_run_saves_matrix_set_and_report() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new(downloads.path()).with_rnaseq_set();
    let log = Arc::clone(&platform.log);
    let tools = MockTools::default();
    let calls = Arc::clone(&tools.calls);
    let sink = RecordingSink::default();

    let app = App::new(platform, tools, settings(scratch.path()));
    let result = app.run(&params("my_ws"), &sink).unwrap();

    assert_eq!(result.diff_expr_matrix_set_ref.as_str(), "1/30/1");
    assert_eq!(result.report_ref.as_str(), "1/40/1");
    assert!(result.report_name.starts_with("cuffdiff_report_"));
    assert!(Path::new(&result.result_directory).join("gene_exp.diff").is_file());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "cuffmerge");
    assert_eq!(&calls[0].args[..2], ["-p", "2"]);
    assert!(calls[0].args.last().unwrap().ends_with("assembly_gtf.txt"));

    let diff = &calls[1];
    assert_eq!(diff.program, "cuffdiff");
    let labels_at = diff.args.iter().position(|arg| arg == "-L").unwrap();
    assert_eq!(diff.args[labels_at + 1], "WT,MU");
    assert!(diff.args[labels_at + 2].ends_with("merged.gtf"));
    let groups = &diff.args[labels_at + 3..];
    assert_eq!(groups.len(), 2);
    for (group, label) in groups.iter().zip(["WT", "MU"]) {
        let replicates: Vec<&str> = group.split(',').collect();
        assert_eq!(replicates.len(), 2);
        for replicate in replicates {
            let path = Path::new(replicate);
            assert!(path.ends_with("accepted_hits.bam"));
            let dir_name = path.parent().unwrap().file_name().unwrap().to_string_lossy();
            assert!(dir_name.starts_with(&format!("{label}_alignment_")));
        }
    }

    let saved = log.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].destination_ref, "my_ws/de_out");
    assert_eq!(saved[0].genome_ref.as_str(), "1/2/1");
    assert_eq!(saved[0].tool_used, "cuffdiff");
    assert_eq!(saved[0].tool_version, "2.2.1");
    assert_eq!(saved[0].diffexpr_data.len(), 1);
    let entry = &saved[0].diffexpr_data[0];
    assert_eq!(entry.condition_mapping.get("WT").map(String::as_str), Some("MU"));
    assert!(entry.diffexpr_filepath.ends_with("WT~~MU.tsv"));
    let written = fs::read_to_string(&entry.diffexpr_filepath).unwrap();
    assert_eq!(written.lines().count(), 3);

    let reports = log.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.workspace_name, "my_ws");
    assert_eq!(report.html_window_height, 333);
    assert_eq!(report.file_links[0].name, "cuffdiff_result.zip");
    assert!(Path::new(&report.file_links[0].path).is_file());
    assert_eq!(report.html_links[0].shock_id, "shock-1");
    assert_eq!(report.objects_created.len(), 2);
    assert_eq!(report.report_object_name, result.report_name);

    let messages = sink.messages.lock().unwrap();
    for phase in ["Validate", "Resolve", "Merge", "Diff", "Parse", "Store", "Report"] {
        let tag = format!("phase={phase};");
        assert!(messages.iter().any(|m| m.starts_with(&tag)), "missing {phase}");
    }
}

#[test]
fn diff_failure_stops_before_saving() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new(downloads.path()).with_rnaseq_set();
    let log = Arc::clone(&platform.log);
    let tools = MockTools {
        fail_diff: true,
        ..MockTools::default()
    };

    let app = App::new(platform, tools, settings(scratch.path()));
    let err = app.run(&params("my_ws"), &RecordingSink::default()).unwrap_err();
    assert_matches!(err, DiffExprError::ToolExecution { ref command, .. } if command.starts_with("cuffdiff -p 2"));
    assert!(err.to_string().starts_with("error executing cuffdiff"));
    assert!(log.saved.lock().unwrap().is_empty());
    assert!(log.reports.lock().unwrap().is_empty());
}

#[test]
fn missing_parameter_fails_before_any_tool_runs() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new(downloads.path()).with_rnaseq_set();
    let tools = MockTools::default();
    let calls = Arc::clone(&tools.calls);

    let mut run_params = params("my_ws");
    run_params.output_obj_name = None;
    let app = App::new(platform, tools, settings(scratch.path()));
    let err = app.run(&run_params, &RecordingSink::default()).unwrap_err();
    assert_matches!(err, DiffExprError::Validation(ref message) if message == "\"output_obj_name\" parameter is required, but missing");
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn unknown_workspace_is_a_validation_error() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new(downloads.path()).with_rnaseq_set();

    let app = App::new(platform, MockTools::default(), settings(scratch.path()));
    let err = app
        .run(&params("missing_ws"), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, DiffExprError::Validation(ref message) if message == "No workspace with name missing_ws exists");
}

#[test]
fn workspace_transport_failure_is_not_a_validation_error() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new(downloads.path()).with_rnaseq_set();
    let tools = MockTools::default();
    let calls = Arc::clone(&tools.calls);

    let app = App::new(platform, tools, settings(scratch.path()));
    let err = app
        .run(&params("offline_ws"), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(
        err,
        DiffExprError::ServiceHttp(ref message)
            if message == "error sending request for url (http://callback.example:9999/): connection refused"
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn matrix_without_condition_mapping_fails_report() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut platform = MockPlatform::new(downloads.path()).with_rnaseq_set();
    platform.insert(
        "1/31/1",
        "de_set-WT-MU",
        "KBaseFeatureValues.DifferentialExpressionMatrix-1.1",
        json!({"condition_mapping": {}}),
    );
    let log = Arc::clone(&platform.log);

    let app = App::new(platform, MockTools::default(), settings(scratch.path()));
    let err = app.run(&params("my_ws"), &RecordingSink::default()).unwrap_err();
    assert_matches!(err, DiffExprError::MalformedResponse(ref message) if message.contains("condition_mapping"));
    assert!(log.reports.lock().unwrap().is_empty());
}

#[test]
fn unsupported_set_type_is_rejected() {
    let downloads = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut platform = MockPlatform::new(downloads.path());
    platform.insert(
        "1/5/1",
        "reads",
        "KBaseSets.ReadsSet-1.0",
        json!({"items": []}),
    );
    let tools = MockTools::default();
    let calls = Arc::clone(&tools.calls);

    let app = App::new(platform, tools, settings(scratch.path()));
    let err = app.run(&params("my_ws"), &RecordingSink::default()).unwrap_err();
    assert_matches!(err, DiffExprError::UnsupportedShape { ref type_tag, .. } if type_tag == "KBaseSets.ReadsSet-1.0");
    assert!(calls.lock().unwrap().is_empty());
}
