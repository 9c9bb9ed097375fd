//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use commands::Commands;
use output::OutputConfig;

/// spkg - build an ordered list of source packages into one prefix
///
/// Stages, patches, configures, builds and installs every package listed in
/// spkg.toml, in order.
#[derive(Parser, Debug)]
#[command(name = "spkg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Project directory containing spkg.toml (defaults to the current directory)
    #[arg(short = 'C', long = "directory", global = true, env = "SPKG_PROJECT_DIR")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Output settings derived from the global flags
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig::new(self.quiet, self.json, self.verbose)
    }

    /// Execute the CLI command; returns the process exit code
    pub fn run(self) -> Result<i32> {
        let output = self.output_config();
        if let Some(cmd) = self.command {
            // Step commands run in other directories, so the project path
            // must be absolute.
            let current_dir = std::env::current_dir()?;
            let project_dir = match self.directory {
                Some(dir) => current_dir.join(dir),
                None => current_dir,
            };
            cmd.run(&project_dir, &output)
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(0)
        }
    }
}
