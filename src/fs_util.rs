use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::DiffExprError;

pub fn zip_dir_flat<F>(source_dir: &Path, zip_path: &Path, include: F) -> Result<usize, DiffExprError>
where
    F: Fn(&Path) -> bool,
{
    let file = fs::File::create(zip_path)
        .map_err(|err| DiffExprError::Archive(format!("create {}: {err}", zip_path.display())))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut written = 0usize;
    for path in walk_files(source_dir)? {
        if path == zip_path || !include(&path) {
            continue;
        }
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            continue;
        };
        writer
            .start_file(name, options)
            .map_err(|err| DiffExprError::Archive(err.to_string()))?;
        let mut input =
            fs::File::open(&path).map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        io::copy(&mut input, &mut writer)
            .map_err(|err| DiffExprError::Archive(err.to_string()))?;
        written += 1;
    }
    writer
        .finish()
        .map_err(|err| DiffExprError::Archive(err.to_string()))?;
    Ok(written)
}

pub fn validate_zip(zip_path: &Path) -> Result<(), DiffExprError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| DiffExprError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| DiffExprError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DiffExprError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| DiffExprError::Archive(err.to_string()))?;
    }
    Ok(())
}

pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, DiffExprError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
