//! Clean logic
//!
//! Removes the per-unit working directories and build logs. The install
//! prefix is never touched.

use std::path::Path;

use crate::core::manifest::BuildConfig;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of clean operation
#[derive(Debug, Default)]
pub struct CleanResult {
    /// Directories that were removed
    pub removed: Vec<String>,
    /// Directories that didn't exist (skipped)
    pub skipped: Vec<String>,
}

fn clean_directories(build: &BuildConfig) -> [&str; 2] {
    [build.work_dir.as_str(), build.log_dir.as_str()]
}

/// Remove the work and log directories of a project
pub fn clean_project(project_path: &Path, build: &BuildConfig) -> Result<CleanResult, FilesystemError> {
    let mut result = CleanResult::default();

    for dir_name in clean_directories(build) {
        if !filesystem::is_contained_relative(Path::new(dir_name)) {
            return Err(FilesystemError::RemoveDir {
                path: project_path.join(dir_name),
                error: "refusing to remove a directory that is not inside the project".to_string(),
            });
        }
    }

    for dir_name in clean_directories(build) {
        if filesystem::remove_dir_all(&project_path.join(dir_name))? {
            tracing::info!("Removed {dir_name}");
            result.removed.push(dir_name.to_string());
        } else {
            result.skipped.push(dir_name.to_string());
        }
    }

    Ok(result)
}

/// Check if a project has any build artifacts
pub fn has_build_artifacts(project_path: &Path, build: &BuildConfig) -> bool {
    clean_directories(build)
        .iter()
        .any(|dir| project_path.join(dir).exists())
}
