//! Output formatting and progress indicators
//!
//! This module provides utilities for displaying progress bars,
//! status-prefixed messages and errors to the user.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar for package units
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} packages ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// How much to print, and in which form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Default `tracing` directive when `RUST_LOG` does not say otherwise
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                _ => "debug",
            }
        }
    }

    /// Whether human-readable text should be printed
    pub fn human(&self) -> bool {
        !self.quiet && !self.json
    }

    /// Progress bars are shown only for plain interactive output
    pub fn show_progress(&self) -> bool {
        self.human() && self.verbose == 0
    }

    /// Print a line of human-readable output
    pub fn say(&self, message: &str) {
        if self.human() {
            println!("{message}");
        }
    }

    pub fn success(&self, message: &str) {
        self.say(&format!("{} {message}", status::SUCCESS));
    }

    pub fn info(&self, message: &str) {
        self.say(&format!("{} {message}", status::INFO));
    }

    /// Warnings go to stderr and survive `--json`
    pub fn warn(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {message}", status::WARNING);
        }
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}
