use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DiffExprError {
    #[error("{0}")]
    Validation(String),

    #[error("unsupported expression set type {type_tag}: expected {expected}")]
    UnsupportedShape { type_tag: String, expected: String },

    #[error("{0}")]
    Materialization(String),

    #[error("error executing {command}: {cause}")]
    ToolExecution { command: String, cause: String },

    #[error("malformed differential expression output at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("missing config file kira-de.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("platform request failed: {0}")]
    ServiceHttp(String),

    #[error("platform returned status {status}: {message}")]
    ServiceStatus { status: u16, message: String },

    #[error("{method} failed: {message}")]
    ServiceCall { method: String, message: String },

    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),

    #[error("archive error: {0}")]
    Archive(String),
}
