//! CLI implementation for `spkg clean` command
//!
//! Removes the work and log directories named in the manifest.

use std::path::Path;

use anyhow::{Context, Result};

use super::load_manifest;
use crate::cli::output::OutputConfig;
use crate::core::clean::{clean_project, has_build_artifacts};

/// Execute the clean command
pub fn execute(path: &Path, output: &OutputConfig) -> Result<i32> {
    let manifest = load_manifest(path)?;
    manifest.validate()?;

    if !has_build_artifacts(path, &manifest.build) {
        output.success("Nothing to clean");
        return Ok(0);
    }

    let result =
        clean_project(path, &manifest.build).with_context(|| "Failed to clean build artifacts")?;

    output.success("Cleaned build artifacts:");
    for dir in &result.removed {
        output.say(&format!("  Removed {dir}/"));
    }

    Ok(0)
}
