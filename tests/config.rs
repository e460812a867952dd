use std::fs;

use assert_matches::assert_matches;

use kira_diffexpr::config::{Config, ConfigLoader, RunParams};
use kira_diffexpr::domain::WorkspaceName;
use kira_diffexpr::error::DiffExprError;

#[test]
fn loads_config_file_with_tool_overrides() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-de.json");
    fs::write(
        &path,
        r#"{
            "scratch": "/tmp/kira-de-scratch",
            "workspace_url": "https://ws.example/services/ws",
            "callback_url": "http://callback:9999",
            "tools": {"cuffdiff": "/opt/cufflinks/cuffdiff"},
            "num_threads": 3,
            "timeout_secs": 60
        }"#,
    )
    .unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let config: Config = serde_json::from_str(&content).unwrap();
    let resolved = ConfigLoader::resolve_config(config, |_| None).unwrap();
    assert_eq!(resolved.num_threads, 3);
    assert_eq!(resolved.tools.cuffdiff, "/opt/cufflinks/cuffdiff");
    assert_eq!(resolved.tools.cuffmerge, "cuffmerge");
    assert_eq!(resolved.callback_url, "http://callback:9999");
    assert_eq!(resolved.tool_version, "unknown");
    assert_eq!(resolved.timeout.as_secs(), 60);
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(DiffExprError::ConfigRead(_))
    );
}

#[test]
fn zero_threads_rejected() {
    let config = Config {
        workspace_url: Some("https://ws.example".to_string()),
        callback_url: Some("http://cb".to_string()),
        num_threads: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, |_| None),
        Err(DiffExprError::ConfigParse(_))
    );
}

#[test]
fn run_params_accept_numeric_workspace() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("params.json");
    fs::write(
        &path,
        r#"{"expressionset_ref": "12/5/1", "workspace_name": 12, "output_obj_name": "de"}"#,
    )
    .unwrap();

    let params = RunParams::load(path.to_str().unwrap()).unwrap();
    let required = params.required().unwrap();
    assert_eq!(required.workspace_name, WorkspaceName::Id(12));
    assert_eq!(required.expressionset_ref.as_str(), "12/5/1");
}

#[test]
fn each_required_parameter_is_named() {
    for (json, missing) in [
        (r#"{"workspace_name": "w", "output_obj_name": "o"}"#, "expressionset_ref"),
        (r#"{"expressionset_ref": "1/2/3", "workspace_name": "w"}"#, "output_obj_name"),
        (r#"{"expressionset_ref": "1/2/3", "output_obj_name": "o"}"#, "workspace_name"),
    ] {
        let params: RunParams = serde_json::from_str(json).unwrap();
        let expected = format!("\"{missing}\" parameter is required, but missing");
        assert_matches!(params.required(), Err(DiffExprError::Validation(message)) if message == expected);
    }
}
