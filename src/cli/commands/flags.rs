//! Flags command implementation
//!
//! Implements `spkg flags <package>`: prints what the platform configurator
//! derives for one package and the fully expanded step commands.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::{configurator_for, load_manifest, EnvArgs};
use crate::cli::output::OutputConfig;
use crate::core::package::{resolve_units, UnitCommands};
use crate::core::platform::FlagSet;
use crate::error::SpkgError;

#[derive(Serialize)]
struct FlagsReport<'a> {
    package: String,
    platform: &'a str,
    flags: &'a FlagSet,
    configure: &'a [String],
    build: &'a [String],
    install: &'a [String],
}

/// Execute the flags command
pub fn execute(
    project_dir: &Path,
    package: &str,
    env_args: &EnvArgs,
    output: &OutputConfig,
) -> Result<i32> {
    let manifest = load_manifest(project_dir)?;
    let env = env_args.resolve(&manifest)?;
    let unit = resolve_units(project_dir, &manifest, &[package.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| SpkgError::UnknownPackage {
            name: package.to_string(),
        })?;

    let flags = configurator_for(&manifest).derive(&env, &unit);
    let commands: UnitCommands = unit
        .resolve_commands(&env, &flags)
        .with_context(|| format!("Cannot expand commands for {}", unit.id()))?;

    if output.json {
        let report = FlagsReport {
            package: unit.id(),
            platform: &env.platform_name,
            flags: &flags,
            configure: &commands.configure,
            build: &commands.build,
            install: &commands.install,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    output.say(&format!("{} on {}", unit.id(), env.platform_name));
    for (name, value) in flags.to_env_map() {
        output.say(&format!("  {name}={value}"));
    }
    for (step, argv) in [
        ("configure", &commands.configure),
        ("build", &commands.build),
        ("install", &commands.install),
    ] {
        let line = if argv.is_empty() {
            "(disabled)".to_string()
        } else {
            argv.join(" ")
        };
        output.say(&format!("  {step}: {line}"));
    }

    Ok(0)
}
