//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod clean;
pub mod flags;
pub mod list;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::cli::output::OutputConfig;
use crate::core::build_env::{BuildEnvironment, EnvironmentOverrides};
use crate::core::manifest::Manifest;
use crate::core::platform::{PlatformConfigurator, PlatformRule};

/// Build environment overrides shared by several commands
#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    /// Build with debug symbols and no optimization
    #[arg(long)]
    pub debug: bool,

    /// Build 64-bit objects
    #[arg(long)]
    pub force64: bool,

    /// Installation prefix shared by all packages
    #[arg(long, value_name = "DIR")]
    pub prefix: Option<PathBuf>,

    /// Platform name (uname style, e.g. Linux or Darwin)
    #[arg(long)]
    pub platform: Option<String>,

    /// Number of parallel jobs for build steps
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl EnvArgs {
    fn overrides(&self) -> EnvironmentOverrides {
        EnvironmentOverrides {
            debug: self.debug.then_some(true),
            force64: self.force64.then_some(true),
            prefix: self.prefix.clone(),
            platform: self.platform.clone(),
            jobs: self.jobs,
        }
    }

    /// Resolve command line > process environment > manifest > defaults
    pub fn resolve(&self, manifest: &Manifest) -> Result<BuildEnvironment> {
        let process = EnvironmentOverrides::from_process_env()
            .context("Invalid build environment variable")?;
        Ok(BuildEnvironment::resolve([
            self.overrides(),
            process,
            EnvironmentOverrides::from_config(&manifest.environment),
        ]))
    }
}

/// Built-in platform rules followed by the manifest's `[[platform]]` entries
pub fn configurator_for(manifest: &Manifest) -> PlatformConfigurator {
    PlatformConfigurator::default().with_rules(manifest.platforms.iter().map(PlatformRule::from))
}

/// Load the project manifest
pub fn load_manifest(project_dir: &Path) -> Result<Manifest> {
    let manifest = Manifest::load(project_dir)?;
    tracing::debug!("Loaded project: {}", manifest.project.name);
    Ok(manifest)
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage, patch, configure, build and install packages in order
    Build(build::BuildArgs),

    /// Validate configuration without building
    Check {
        #[command(flatten)]
        env: EnvArgs,
    },

    /// Show the flags and configure command derived for a package
    Flags {
        /// Package name
        package: String,

        #[command(flatten)]
        env: EnvArgs,
    },

    /// List packages in build order
    List {
        #[command(flatten)]
        env: EnvArgs,
    },

    /// Remove working directories and build logs
    Clean,
}

impl Commands {
    /// Execute the command; returns the process exit code
    pub fn run(self, project_dir: &Path, output: &OutputConfig) -> Result<i32> {
        match self {
            Self::Build(args) => build::execute(project_dir, &args, output),
            Self::Check { env } => check::execute(project_dir, &env, output),
            Self::Flags { package, env } => flags::execute(project_dir, &package, &env, output),
            Self::List { env } => list::execute(project_dir, &env, output),
            Self::Clean => clean::execute(project_dir, output),
        }
    }
}
