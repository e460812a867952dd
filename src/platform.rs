use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ResolvedConfig;
use crate::domain::{ObjectInfo, ObjectRef, StoredObject};
use crate::error::DiffExprError;
use crate::rpc::RpcClient;

pub trait ObjectStore {
    fn get_object(&self, reference: &ObjectRef) -> Result<StoredObject, DiffExprError>;
    fn workspace_id(&self, name: &str) -> Result<i64, DiffExprError>;
}

pub trait DataDownloads {
    fn genome_annotation(
        &self,
        genome_ref: &ObjectRef,
        target_dir: &Path,
    ) -> Result<PathBuf, DiffExprError>;
    fn download_expression(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError>;
    fn download_alignment(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError>;
}

pub trait ResultStore {
    fn save_matrix_set(&self, params: &SaveMatrixSetParams) -> Result<ObjectRef, DiffExprError>;
}

pub trait ReportService {
    fn upload_directory(&self, dir: &Path) -> Result<String, DiffExprError>;
    fn create_report(&self, params: &ReportParams) -> Result<ReportInfo, DiffExprError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffExprDataEntry {
    pub condition_mapping: BTreeMap<String, String>,
    pub diffexpr_filepath: String,
    // Field name as spelled by the platform.
    pub delimter: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveMatrixSetParams {
    pub destination_ref: String,
    pub genome_ref: ObjectRef,
    pub tool_used: String,
    pub tool_version: String,
    pub diffexpr_data: Vec<DiffExprDataEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileLink {
    pub path: String,
    pub name: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HtmlLink {
    pub shock_id: String,
    pub name: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedObject {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportParams {
    pub message: String,
    pub workspace_name: String,
    pub file_links: Vec<FileLink>,
    pub objects_created: Vec<CreatedObject>,
    pub html_links: Vec<HtmlLink>,
    pub direct_html_link_index: usize,
    pub html_window_height: u32,
    pub report_object_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
}

#[derive(Deserialize)]
struct ObjectsResponse {
    data: Vec<ObjectEnvelope>,
}

#[derive(Deserialize)]
struct ObjectEnvelope {
    data: Value,
    info: Value,
}

#[derive(Deserialize)]
struct DestinationDir {
    destination_dir: PathBuf,
}

#[derive(Deserialize)]
struct FilePath {
    file_path: PathBuf,
}

#[derive(Deserialize)]
struct ShockUpload {
    shock_id: String,
}

#[derive(Deserialize)]
struct SavedMatrixSet {
    #[serde(rename = "diffExprMatrixSet_ref")]
    diff_expr_matrix_set_ref: ObjectRef,
}

pub struct PlatformClient {
    workspace: RpcClient,
    callback: RpcClient,
}

impl PlatformClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, DiffExprError> {
        let token = config.auth_token.as_deref();
        Ok(Self {
            workspace: RpcClient::new(&config.workspace_url, token, config.timeout)?,
            callback: RpcClient::new(&config.callback_url, token, config.timeout)?,
        })
    }
}

impl ObjectStore for PlatformClient {
    fn get_object(&self, reference: &ObjectRef) -> Result<StoredObject, DiffExprError> {
        let response: ObjectsResponse = self.workspace.call(
            "Workspace.get_objects2",
            &json!({"objects": [{"ref": reference}]}),
        )?;
        let envelope = response.data.into_iter().next().ok_or_else(|| {
            DiffExprError::MalformedResponse(format!("no object returned for {reference}"))
        })?;
        Ok(StoredObject {
            info: ObjectInfo::from_tuple(&envelope.info)?,
            data: envelope.data,
        })
    }

    fn workspace_id(&self, name: &str) -> Result<i64, DiffExprError> {
        self.callback.call("DataFileUtil.ws_name_to_id", name)
    }
}

impl DataDownloads for PlatformClient {
    fn genome_annotation(
        &self,
        genome_ref: &ObjectRef,
        target_dir: &Path,
    ) -> Result<PathBuf, DiffExprError> {
        let response: FilePath = self.callback.call(
            "GenomeFileUtil.genome_to_gff",
            &json!({
                "genome_ref": genome_ref,
                "is_gtf": 1,
                "target_dir": target_dir,
            }),
        )?;
        Ok(response.file_path)
    }

    fn download_expression(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError> {
        let response: DestinationDir = self.callback.call(
            "ExpressionUtils.download_expression",
            &json!({"source_ref": reference}),
        )?;
        Ok(response.destination_dir)
    }

    fn download_alignment(&self, reference: &ObjectRef) -> Result<PathBuf, DiffExprError> {
        let response: DestinationDir = self.callback.call(
            "ReadsAlignmentUtils.download_alignment",
            &json!({"source_ref": reference}),
        )?;
        Ok(response.destination_dir)
    }
}

impl ResultStore for PlatformClient {
    fn save_matrix_set(&self, params: &SaveMatrixSetParams) -> Result<ObjectRef, DiffExprError> {
        let response: SavedMatrixSet = self.callback.call(
            "DifferentialExpressionUtils.save_differential_expression_matrix_set",
            params,
        )?;
        Ok(response.diff_expr_matrix_set_ref)
    }
}

impl ReportService for PlatformClient {
    fn upload_directory(&self, dir: &Path) -> Result<String, DiffExprError> {
        let response: ShockUpload = self.callback.call(
            "DataFileUtil.file_to_shock",
            &json!({"file_path": dir, "pack": "zip"}),
        )?;
        Ok(response.shock_id)
    }

    fn create_report(&self, params: &ReportParams) -> Result<ReportInfo, DiffExprError> {
        self.callback
            .call("KBaseReport.create_extended_report", params)
    }
}
