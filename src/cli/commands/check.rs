//! Check command implementation
//!
//! Implements `spkg check` to validate configuration without building.

use anyhow::{bail, Result};
use std::path::Path;

use super::{load_manifest, EnvArgs};
use crate::cli::output::{create_spinner, status, OutputConfig};
use crate::core::check;

/// Execute the check command
pub fn execute(project_dir: &Path, env_args: &EnvArgs, output: &OutputConfig) -> Result<i32> {
    let manifest = load_manifest(project_dir)?;
    let env = env_args.resolve(&manifest)?;

    tracing::info!("Checking project: {}", manifest.project.name);

    let spinner = output
        .show_progress()
        .then(|| create_spinner("Checking packages..."));
    let result = check::check(project_dir, &manifest, &env);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    output.say(&format!("Project: {}", manifest.project.name));
    output.say(&format!("  Platform: {}", env.platform_name));
    output.say(&format!(
        "  Prefix: {}",
        env.install_prefix
            .as_ref()
            .map_or_else(|| "(unset)".to_string(), |p| p.display().to_string())
    ));
    output.say(&format!("  Debug: {}, 64-bit: {}, jobs: {}", env.debug, env.force64, env.jobs));

    output.say("\nPackages (build order):");
    if result.packages.is_empty() {
        output.say("  (none)");
    }
    for package in &result.packages {
        let mark = if package.archive_present && package.checksum_ok != Some(false) {
            status::SUCCESS
        } else {
            status::ERROR
        };
        let installed = if package.installed { ", installed" } else { "" };
        output.say(&format!(
            "  {mark} {} ({} patches{installed})",
            package.id, package.patches
        ));
    }

    output.say("\nTools:");
    for tool in &result.tools {
        let mark = match (tool.found, tool.required) {
            (true, _) => status::SUCCESS,
            (false, true) => status::ERROR,
            (false, false) => status::WARNING,
        };
        output.say(&format!("  {mark} {}", tool.name));
    }

    for warning in &result.warnings {
        output.warn(warning);
    }

    if result.is_valid() {
        output.say("");
        output.success("Check passed - ready to build");
        Ok(0)
    } else {
        for error in &result.errors {
            eprintln!("  {} {error}", status::ERROR);
        }
        bail!("Check failed - please fix the issues above before building");
    }
}
