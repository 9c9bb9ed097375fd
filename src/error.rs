//! Error types for spkg
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::unit::Step;

/// Manifest (spkg.toml) errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found at '{path}'. Create an spkg.toml listing the packages to build.")]
    NotFound { path: PathBuf },

    /// Manifest could not be read
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Manifest is not valid TOML or does not match the schema
    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    /// Manifest parsed but failed validation
    #[error("Invalid manifest:\n  {}", problems.join("\n  "))]
    Invalid { problems: Vec<String> },
}

/// Failures detected before a unit touches the filesystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// Installation prefix is not defined
    #[error("Installation prefix is not set (use --prefix, SPKG_LOCAL or [environment].prefix)")]
    MissingPrefix,

    /// Installation prefix is not an absolute path
    #[error("Installation prefix '{path}' must be an absolute path")]
    RelativePrefix { path: PathBuf },

    /// Environment value could not be interpreted
    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: String,
        value: String,
        reason: String,
    },

    /// Template refers to a placeholder that is not defined
    #[error("Package '{package}' uses unknown placeholder '${{{placeholder}}}'")]
    UnknownPlaceholder { package: String, placeholder: String },
}

/// Source staging errors
#[derive(Error, Debug)]
pub enum StageError {
    /// Archive does not exist
    #[error("Source archive not found: {path}")]
    ArchiveNotFound { path: PathBuf },

    /// Archive exists but cannot be read
    #[error("Source archive '{path}' is unreadable: {error}")]
    UnreadableArchive { path: PathBuf, error: String },

    /// Archive extension is not recognized
    #[error("Unsupported archive format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Archive checksum does not match
    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Extraction failed part way
    #[error("Failed to extract '{path}': {error}")]
    Extraction { path: PathBuf, error: String },

    /// Extraction did not produce the expected source directory
    #[error("Archive '{archive}' did not produce {}", expected.as_deref().map_or_else(|| "a single top-level directory".to_string(), |d| format!("top-level directory '{d}'")))]
    NoTopLevelDir {
        archive: PathBuf,
        expected: Option<String>,
    },

    /// Expected source directory would leave the working directory
    #[error("Source directory '{dir}' must be relative and stay inside the working directory")]
    InvalidSourceDir { dir: String },

    /// Working directory could not be prepared
    #[error("Failed to prepare working directory '{path}': {error}")]
    WorkDir { path: PathBuf, error: String },

    /// A configured subpath could not be pruned
    #[error("Failed to prune '{path}': {error}")]
    Prune { path: PathBuf, error: String },
}

/// Patch application errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Patch exists but did not apply
    #[error("Patch '{patch_name}' failed to apply (exit code {})", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Failed {
        patch_name: String,
        exit_code: Option<i32>,
    },

    /// Patch tool could not be started
    #[error("Failed to run patch tool for '{patch_name}': {error}")]
    Spawn { patch_name: String, error: String },
}

/// Terminal failure of one build unit
#[derive(Error, Debug)]
pub enum UnitError {
    /// Precondition failed before any mutation
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Source staging failed
    #[error("Staging failed: {0}")]
    Stage(#[from] StageError),

    /// Patch application failed
    #[error("{0}")]
    Patch(#[from] PatchError),

    /// External step exited unsuccessfully
    #[error("{step} step failed (exit code {})", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    StepFailed { step: Step, exit_code: Option<i32> },

    /// External step could not be started
    #[error("{step} step could not be started: {error}")]
    Spawn { step: Step, error: String },

    /// External step was terminated by cancellation
    #[error("{step} step was cancelled")]
    Cancelled { step: Step },
}

impl UnitError {
    /// Step at which the unit failed
    pub fn step(&self) -> Step {
        match self {
            Self::Precondition(_) => Step::Precondition,
            Self::Stage(_) => Step::Stage,
            Self::Patch(_) => Step::Patch,
            Self::StepFailed { step, .. } | Self::Spawn { step, .. } | Self::Cancelled { step } => {
                *step
            }
        }
    }

    /// Exit code of the failing external command, if one ran
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Patch(PatchError::Failed { exit_code, .. })
            | Self::StepFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Top-level spkg error type
#[derive(Error, Debug)]
pub enum SpkgError {
    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Package not present in the manifest
    #[error("Package '{name}' not found in manifest")]
    UnknownPackage { name: String },
}
