//! Source stager
//!
//! Unpacks a pristine upstream archive into a unit's working directory and
//! prunes subtrees the build does not need. Staging is destructive: whatever
//! already lives in the working directory is removed first.

use std::path::{Path, PathBuf};

use crate::core::package::PackageUnit;
use crate::error::StageError;
use crate::infra::archive;
use crate::infra::filesystem::is_contained_relative;
use crate::infra::process::CommandExecutor;

/// Result of staging one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    /// Working directory the archive was unpacked into
    pub work_dir: PathBuf,
    /// Top-level source directory inside `work_dir`
    pub source_root: PathBuf,
    /// Whether an existing working directory was destroyed
    pub replaced_existing: bool,
    /// Subpaths removed after extraction
    pub pruned: Vec<PathBuf>,
}

/// Stage a unit's archive into `work_dir`
pub fn stage_unit(
    unit: &PackageUnit,
    work_dir: &Path,
    executor: &dyn CommandExecutor,
) -> Result<StagedSource, StageError> {
    stage_source(
        unit.archive(),
        work_dir,
        unit.source_dir(),
        unit.prune(),
        unit.sha256(),
        executor,
    )
}

/// Extract `archive` into a fresh `work_dir` and return the source root.
///
/// The archive (and its checksum when given) is checked before the working
/// directory is touched, so a missing archive never destroys a previous
/// staging.
pub fn stage_source(
    archive_path: &Path,
    work_dir: &Path,
    expected_dir: Option<&str>,
    prune: &[PathBuf],
    sha256: Option<&str>,
    executor: &dyn CommandExecutor,
) -> Result<StagedSource, StageError> {
    if !archive_path.is_file() {
        return Err(StageError::ArchiveNotFound {
            path: archive_path.to_path_buf(),
        });
    }
    if archive::ArchiveFormat::detect(archive_path).is_none() {
        return Err(StageError::UnsupportedFormat {
            path: archive_path.to_path_buf(),
        });
    }
    if let Some(dir) = expected_dir {
        if !is_contained_relative(Path::new(dir)) {
            return Err(StageError::InvalidSourceDir {
                dir: dir.to_string(),
            });
        }
    }
    if let Some(expected) = sha256 {
        archive::verify_sha256(archive_path, expected)?;
    }

    let work_dir_error = |e: std::io::Error| StageError::WorkDir {
        path: work_dir.to_path_buf(),
        error: e.to_string(),
    };

    let replaced_existing = work_dir.exists();
    if replaced_existing {
        tracing::warn!(
            "Removing existing working directory {} before staging",
            work_dir.display()
        );
        std::fs::remove_dir_all(work_dir).map_err(work_dir_error)?;
    }
    std::fs::create_dir_all(work_dir).map_err(work_dir_error)?;

    archive::extract(archive_path, work_dir, executor)?;

    let source_root = find_source_root(archive_path, work_dir, expected_dir)?;
    let pruned = prune_paths(&source_root, prune)?;

    tracing::info!("Staged {} into {}", archive_path.display(), source_root.display());

    Ok(StagedSource {
        work_dir: work_dir.to_path_buf(),
        source_root,
        replaced_existing,
        pruned,
    })
}

fn find_source_root(
    archive_path: &Path,
    work_dir: &Path,
    expected_dir: Option<&str>,
) -> Result<PathBuf, StageError> {
    let missing = || StageError::NoTopLevelDir {
        archive: archive_path.to_path_buf(),
        expected: expected_dir.map(String::from),
    };

    if let Some(expected) = expected_dir {
        let root = work_dir.join(expected);
        return if root.is_dir() { Ok(root) } else { Err(missing()) };
    }

    let entries: Vec<PathBuf> = std::fs::read_dir(work_dir)
        .map_err(|e| StageError::WorkDir {
            path: work_dir.to_path_buf(),
            error: e.to_string(),
        })?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Err(missing()),
    }
}

fn prune_paths(source_root: &Path, prune: &[PathBuf]) -> Result<Vec<PathBuf>, StageError> {
    let mut pruned = Vec::new();
    for sub in prune {
        if !is_contained_relative(sub) {
            return Err(StageError::Prune {
                path: sub.clone(),
                error: "path must stay inside the source tree".to_string(),
            });
        }

        let target = source_root.join(sub);
        let result = if target.is_dir() {
            std::fs::remove_dir_all(&target)
        } else if target.exists() {
            std::fs::remove_file(&target)
        } else {
            tracing::debug!("Nothing to prune at {}", target.display());
            continue;
        };
        result.map_err(|e| StageError::Prune {
            path: target.clone(),
            error: e.to_string(),
        })?;
        pruned.push(sub.clone());
    }
    Ok(pruned)
}
