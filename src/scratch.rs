use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::DiffExprError;

const RUN_PREFIX: &str = "cuffdiff_run_";

#[derive(Debug, Clone)]
pub struct ScratchLayout {
    root: Utf8PathBuf,
}

impl ScratchLayout {
    pub fn create(scratch: &Utf8Path) -> Result<Self, DiffExprError> {
        fs::create_dir_all(scratch.as_std_path())
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        let root = make_unique_dir(scratch, RUN_PREFIX)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        self.root
            .file_name()
            .and_then(|name| name.strip_prefix(RUN_PREFIX))
            .unwrap_or_else(|| self.root.as_str())
    }

    pub fn unique_dir(&self, prefix: &str) -> Result<Utf8PathBuf, DiffExprError> {
        make_unique_dir(&self.root, prefix)
    }
}

fn make_unique_dir(parent: &Utf8Path, prefix: &str) -> Result<Utf8PathBuf, DiffExprError> {
    let dir = Builder::new()
        .prefix(prefix)
        .tempdir_in(parent.as_std_path())
        .map_err(|err| DiffExprError::Filesystem(err.to_string()))?
        .keep();
    Utf8PathBuf::from_path_buf(dir)
        .map_err(|path| DiffExprError::Filesystem(format!("non-utf8 scratch path: {}", path.display())))
}
