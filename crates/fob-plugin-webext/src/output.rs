//! Writing the finished extension to disk.
//!
//! Every output name is validated against the out dir before anything is
//! written: names are cleaned with `path_clean` and must stay under the
//! directory. Files are written to `.tmp` siblings first and renamed once all
//! writes succeed, so a failed build never leaves a half-written extension.

use crate::error::{Result, WebextError};
use path_clean::PathClean;
use rolldown_common::Output;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One file written to the out dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Path relative to the out dir, forward slashes.
    pub file_name: String,
    pub size: usize,
}

/// Write every chunk and asset of `outputs` under `dir`.
pub fn write_outputs(outputs: &[Output], dir: &Path) -> Result<Vec<WrittenFile>> {
    let dir = dir.clean();
    fs::create_dir_all(&dir).map_err(|e| WebextError::io(&dir, e))?;

    let mut operations = Vec::with_capacity(outputs.len());
    for output in outputs {
        let (file_name, content): (&str, &[u8]) = match output {
            Output::Chunk(chunk) => (chunk.filename.as_str(), chunk.code.as_bytes()),
            Output::Asset(asset) => (asset.filename.as_str(), asset.source.as_bytes()),
        };
        let target = validate_output_path(&dir, file_name)?;
        operations.push((target, file_name, content));
    }

    write_files_atomic(&operations)?;

    Ok(operations
        .iter()
        .map(|(_, file_name, content)| WrittenFile {
            file_name: file_name.replace('\\', "/"),
            size: content.len(),
        })
        .collect())
}

/// Remove everything inside `dir`, keeping the directory itself.
pub fn empty_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir).map_err(|e| WebextError::io(dir, e));
    }
    for entry in fs::read_dir(dir).map_err(|e| WebextError::io(dir, e))? {
        let path = entry.map_err(|e| WebextError::io(dir, e))?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| WebextError::io(&path, e))?;
    }
    Ok(())
}

/// Join `file_name` onto `base_dir`, refusing anything that escapes it.
pub fn validate_output_path(base_dir: &Path, file_name: &str) -> Result<PathBuf> {
    if file_name.contains('\0') {
        return Err(WebextError::PathTraversal(format!(
            "output name contains a null byte: {file_name:?}"
        )));
    }

    let full_path = base_dir.join(Path::new(file_name).clean()).clean();
    if !full_path.starts_with(base_dir) || full_path == base_dir {
        return Err(WebextError::PathTraversal(format!(
            "'{file_name}' escapes output directory '{}'",
            base_dir.display()
        )));
    }
    Ok(full_path)
}

fn write_files_atomic(operations: &[(PathBuf, &str, &[u8])]) -> Result<()> {
    let mut temp_files: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(operations.len());

    for (target, _, content) in operations {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                cleanup_temp_files(&temp_files);
                return Err(WebextError::io(parent, e));
            }
        }

        let mut temp = target.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        if let Err(e) = fs::write(&temp, content) {
            cleanup_temp_files(&temp_files);
            return Err(WebextError::io(&temp, e));
        }
        temp_files.push((temp, target.clone()));
    }

    for (temp, target) in &temp_files {
        if let Err(e) = fs::rename(temp, target) {
            cleanup_temp_files(&temp_files);
            return Err(WebextError::io(target, e));
        }
    }
    Ok(())
}

fn cleanup_temp_files(temp_files: &[(PathBuf, PathBuf)]) {
    for (temp, _) in temp_files {
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                warn!(file = %temp.display(), error = %e, "failed to clean up temporary file");
            }
        }
    }
}
