//! List command implementation
//!
//! Implements `spkg list`: the packages in build order with their installed
//! state.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::{load_manifest, EnvArgs};
use crate::cli::output::{status, OutputConfig};
use crate::core::installed;
use crate::core::package::resolve_units;

#[derive(Serialize)]
struct ListEntry {
    name: String,
    version: String,
    patches: usize,
    installed: bool,
}

/// Execute the list command
pub fn execute(project_dir: &Path, env_args: &EnvArgs, output: &OutputConfig) -> Result<i32> {
    let manifest = load_manifest(project_dir)?;
    let env = env_args.resolve(&manifest)?;
    let units = resolve_units(project_dir, &manifest, &[])?;

    let entries: Vec<ListEntry> = units
        .iter()
        .map(|unit| ListEntry {
            name: unit.name().to_string(),
            version: unit.version().to_string(),
            patches: unit.patches().len(),
            installed: env
                .install_prefix
                .as_deref()
                .is_some_and(|prefix| installed::is_installed(prefix, unit)),
        })
        .collect();

    if output.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    if entries.is_empty() {
        output.say("No packages in spkg.toml");
    }
    for (index, entry) in entries.iter().enumerate() {
        let mark = if entry.installed { status::SUCCESS } else { " " };
        output.say(&format!(
            "{:>3}. {mark} {}-{} ({} patches)",
            index + 1,
            entry.name,
            entry.version,
            entry.patches
        ));
    }

    Ok(0)
}
