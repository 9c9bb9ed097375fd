//! Filesystem operations
//!
//! Thin wrappers that turn `std::io` failures into [`FilesystemError`]s
//! carrying the offending path.

use std::io::Write;
use std::path::{Component, Path};

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory tree; returns whether anything was removed
pub fn remove_dir_all(path: &Path) -> Result<bool, FilesystemError> {
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    Ok(true)
}

/// Write content to a file, creating parent directories
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Append content to a file, creating it and its parent directories
pub fn append_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    let write_error = |e: std::io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_error)?;
    file.write_all(content.as_bytes()).map_err(write_error)
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Whether `path` is relative, names at least one entry and never climbs
/// out of the directory it is joined to
pub fn is_contained_relative(path: &Path) -> bool {
    let mut named = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            _ => return false,
        }
    }
    named
}
