use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::DiffExprError;

pub const MANIFEST_FILE: &str = "assembly_gtf.txt";

pub struct ManifestWriter {
    path: Utf8PathBuf,
    out: BufWriter<File>,
    entries: Vec<Utf8PathBuf>,
}

impl ManifestWriter {
    pub fn create(path: &Utf8Path) -> Result<Self, DiffExprError> {
        let file = File::create(path.as_std_path()).map_err(|err| {
            DiffExprError::Filesystem(format!("create manifest {path}: {err}"))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            entries: Vec::new(),
        })
    }

    pub fn push(&mut self, annotation: &Utf8Path) -> Result<(), DiffExprError> {
        writeln!(self.out, "{annotation}")
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        self.entries.push(annotation.to_path_buf());
        Ok(())
    }

    pub fn finish(mut self) -> Result<AssemblyManifest, DiffExprError> {
        self.out
            .flush()
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        Ok(AssemblyManifest {
            path: self.path,
            entries: self.entries,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyManifest {
    path: Utf8PathBuf,
    entries: Vec<Utf8PathBuf>,
}

impl AssemblyManifest {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn entries(&self) -> &[Utf8PathBuf] {
        &self.entries
    }
}
