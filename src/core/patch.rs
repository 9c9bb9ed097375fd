//! Patch applier
//!
//! Applies a unit's ordered patch list to the staged source tree. Missing
//! patch files are skipped; the first patch that fails to apply stops the
//! sequence. Patches already applied are not reverted.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::defaults::PATCH_STRIP_LEVEL;
use crate::error::PatchError;
use crate::infra::process::{CommandExecutor, StepCommand, StepOutput};

/// What happened to a single patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PatchOutcome {
    /// Not a readable file; nothing was attempted
    Skipped,
    /// Applied cleanly
    Applied,
    /// The patch tool rejected it
    Failed { exit_code: Option<i32> },
}

/// Record of one entry in the patch list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRecord {
    pub patch: PathBuf,
    #[serde(flatten)]
    pub outcome: PatchOutcome,
}

/// Result of a patch sequence: the records gathered so far and the
/// failure that stopped it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRun {
    pub records: Vec<PatchRecord>,
    pub output: String,
    pub error: Option<PatchError>,
}

impl PatchRun {
    pub fn applied(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == PatchOutcome::Applied)
            .count()
    }

    /// Convert into a `Result`, discarding the records on failure
    pub fn into_result(self) -> Result<Vec<PatchRecord>, PatchError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.records),
        }
    }
}

/// Applies patches with the system `patch` tool
pub struct PatchApplier<'a> {
    executor: &'a dyn CommandExecutor,
    strip: u32,
}

impl<'a> PatchApplier<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self {
            executor,
            strip: PATCH_STRIP_LEVEL,
        }
    }

    /// Override the path strip level (`-pN`)
    #[must_use]
    pub fn with_strip(mut self, strip: u32) -> Self {
        self.strip = strip;
        self
    }

    fn command(&self, patch: &Path, source_root: &Path) -> StepCommand {
        StepCommand::new("patch", source_root).with_args([
            format!("-p{}", self.strip),
            "--batch".to_string(),
            "--forward".to_string(),
            "-i".to_string(),
            patch.display().to_string(),
        ])
    }

    /// Apply `patches` in order inside `source_root`
    pub fn apply(&self, patches: &[PathBuf], source_root: &Path) -> PatchRun {
        let mut run = PatchRun {
            records: Vec::with_capacity(patches.len()),
            output: String::new(),
            error: None,
        };

        for patch in patches {
            let patch_name = patch
                .file_name()
                .map_or_else(|| patch.display().to_string(), |n| n.to_string_lossy().into_owned());

            if !is_readable_file(patch) {
                tracing::debug!("Skipping missing patch {}", patch.display());
                run.records.push(PatchRecord {
                    patch: patch.clone(),
                    outcome: PatchOutcome::Skipped,
                });
                continue;
            }

            tracing::info!("Applying {patch_name}");
            let output = match self.executor.execute(&self.command(patch, source_root)) {
                Ok(output) => output,
                Err(e) => {
                    run.error = Some(PatchError::Spawn {
                        patch_name,
                        error: e.to_string(),
                    });
                    break;
                }
            };
            append_output(&mut run.output, &output);

            if output.success() {
                run.records.push(PatchRecord {
                    patch: patch.clone(),
                    outcome: PatchOutcome::Applied,
                });
            } else {
                tracing::error!("Patch {patch_name} failed to apply");
                run.records.push(PatchRecord {
                    patch: patch.clone(),
                    outcome: PatchOutcome::Failed {
                        exit_code: output.exit_code,
                    },
                });
                run.error = Some(PatchError::Failed {
                    patch_name,
                    exit_code: output.exit_code,
                });
                break;
            }
        }

        run
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

fn append_output(buffer: &mut String, output: &StepOutput) {
    buffer.push_str(&output.output);
    if !output.output.is_empty() && !output.output.ends_with('\n') {
        buffer.push('\n');
    }
}
