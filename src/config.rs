use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Flag, ObjectRef, WorkspaceName};
use crate::error::DiffExprError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-de.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scratch: Option<PathBuf>,
    #[serde(default)]
    pub workspace_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub tools: ToolsEntry,
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub tool_version: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsEntry {
    #[serde(default)]
    pub cuffmerge: Option<String>,
    #[serde(default)]
    pub cuffdiff: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub cuffmerge: String,
    pub cuffdiff: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub scratch: PathBuf,
    pub workspace_url: String,
    pub callback_url: String,
    pub auth_token: Option<String>,
    pub tools: ToolPaths,
    pub num_threads: usize,
    pub tool_version: String,
    pub timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DiffExprError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(DiffExprError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| DiffExprError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| DiffExprError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, |key| std::env::var(key).ok())
    }

    // Applies defaults and environment overrides (`SDK_CALLBACK_URL`,
    // `KB_AUTH_TOKEN`, `VERSION`) on top of the file contents.
    pub fn resolve_config<F>(config: Config, env: F) -> Result<ResolvedConfig, DiffExprError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let workspace_url = config
            .workspace_url
            .ok_or_else(|| DiffExprError::ConfigParse("workspace_url is required".to_string()))?;
        let callback_url = non_empty("SDK_CALLBACK_URL")
            .or(config.callback_url)
            .ok_or_else(|| {
                DiffExprError::ConfigParse(
                    "callback_url is required (or set SDK_CALLBACK_URL)".to_string(),
                )
            })?;
        let auth_token = non_empty("KB_AUTH_TOKEN").or(config.auth_token);
        let tool_version = non_empty("VERSION")
            .or(config.tool_version)
            .unwrap_or_else(|| "unknown".to_string());

        let num_threads = match config.num_threads {
            Some(0) => {
                return Err(DiffExprError::ConfigParse(
                    "num_threads must be positive".to_string(),
                ));
            }
            Some(value) => value,
            None => default_threads(),
        };

        Ok(ResolvedConfig {
            scratch: config.scratch.unwrap_or_else(std::env::temp_dir),
            workspace_url,
            callback_url,
            auth_token,
            tools: ToolPaths {
                cuffmerge: config.tools.cuffmerge.unwrap_or_else(|| "cuffmerge".to_string()),
                cuffdiff: config.tools.cuffdiff.unwrap_or_else(|| "cuffdiff".to_string()),
            },
            num_threads,
            tool_version,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunParams {
    #[serde(default)]
    pub expressionset_ref: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<WorkspaceName>,
    #[serde(default)]
    pub output_obj_name: Option<String>,
    #[serde(default)]
    pub time_series: Option<Flag>,
    #[serde(default)]
    pub min_alignment_count: Option<i64>,
    #[serde(default)]
    pub multi_read_correct: Option<Flag>,
    #[serde(default)]
    pub library_type: Option<String>,
    #[serde(default)]
    pub library_norm_method: Option<String>,
}

impl RunParams {
    pub fn load(path: &str) -> Result<Self, DiffExprError> {
        let content = fs::read_to_string(path)
            .map_err(|_| DiffExprError::ConfigRead(PathBuf::from(path)))?;
        serde_json::from_str(&content).map_err(|err| DiffExprError::ConfigParse(err.to_string()))
    }

    pub fn required(&self) -> Result<RequiredParams, DiffExprError> {
        let expressionset_ref = self
            .expressionset_ref
            .as_deref()
            .ok_or_else(|| missing_param("expressionset_ref"))?
            .parse()?;
        let output_obj_name = self
            .output_obj_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| missing_param("output_obj_name"))?;
        let workspace_name = self
            .workspace_name
            .clone()
            .ok_or_else(|| missing_param("workspace_name"))?;
        Ok(RequiredParams {
            expressionset_ref,
            workspace_name,
            output_obj_name,
        })
    }

    pub fn advanced(&self) -> AdvancedOptions {
        AdvancedOptions {
            time_series: self.time_series.is_some_and(Flag::is_set),
            min_alignment_count: self.min_alignment_count,
            multi_read_correct: self.multi_read_correct.is_some_and(Flag::is_set),
            library_type: self.library_type.clone(),
            library_norm_method: self.library_norm_method.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequiredParams {
    pub expressionset_ref: ObjectRef,
    pub workspace_name: WorkspaceName,
    pub output_obj_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvancedOptions {
    pub time_series: bool,
    pub min_alignment_count: Option<i64>,
    pub multi_read_correct: bool,
    pub library_type: Option<String>,
    pub library_norm_method: Option<String>,
}

fn missing_param(name: &str) -> DiffExprError {
    DiffExprError::Validation(format!("\"{name}\" parameter is required, but missing"))
}
