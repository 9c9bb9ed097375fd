//! Build command implementation
//!
//! Implements `spkg build`: resolves the environment, runs the orchestrator
//! over the selected packages and prints the report.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::ProgressBar;
use std::path::Path;

use super::{configurator_for, load_manifest, EnvArgs};
use crate::cli::output::{create_build_bar, status, OutputConfig};
use crate::core::builder::{BuildObserver, BuildOrchestrator, FailurePolicy};
use crate::core::package::{resolve_units, PackageUnit};
use crate::core::report::{OrchestrationReport, UnitResult};
use crate::infra::process::SystemExecutor;

/// Build options
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Build only the named package (repeatable; manifest order is kept)
    #[arg(short, long, value_name = "NAME")]
    pub package: Vec<String>,

    /// Keep going after a package fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Keep working directories of successful packages
    #[arg(long)]
    pub keep_workdir: bool,

    /// Rebuild packages that are already installed
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub env: EnvArgs,
}

/// Progress reporting through an indicatif bar
struct ProgressObserver<'a> {
    output: &'a OutputConfig,
    bar: Option<ProgressBar>,
}

impl ProgressObserver<'_> {
    fn print(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => self.output.say(line),
        }
    }
}

impl BuildObserver for ProgressObserver<'_> {
    fn unit_started(&self, index: usize, total: usize, unit: &PackageUnit) {
        match &self.bar {
            Some(bar) => bar.set_message(unit.id()),
            None => self
                .output
                .say(&format!("[{}/{total}] Building {}", index + 1, unit.id())),
        }
    }

    fn replacing_work_dir(&self, unit: &PackageUnit, work_dir: &Path) {
        let message = format!(
            "Replacing existing working directory for {}: {}",
            unit.id(),
            work_dir.display()
        );
        match &self.bar {
            Some(bar) => bar.println(format!("{} {message}", status::WARNING)),
            None => self.output.warn(&message),
        }
    }

    fn unit_finished(&self, _index: usize, _total: usize, result: &UnitResult) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        self.print(&unit_line(result));
    }
}

fn unit_line(result: &UnitResult) -> String {
    let id = format!("{}-{}", result.name(), result.version());
    if result.was_already_installed() {
        format!("{} {id} (already installed)", status::SUCCESS)
    } else if result.is_success() {
        format!("{} {id}", status::SUCCESS)
    } else {
        let code = result
            .exit_code()
            .map_or_else(String::new, |c| format!(", exit code {c}"));
        format!("{} {id}: {}{code}", status::ERROR, result.status())
    }
}

/// Execute the build command
pub fn execute(project_dir: &Path, args: &BuildArgs, output: &OutputConfig) -> Result<i32> {
    let manifest = load_manifest(project_dir)?;
    let units = resolve_units(project_dir, &manifest, &args.package)?;
    let env = args.env.resolve(&manifest)?;

    let policy =
        FailurePolicy::from_continue_flag(args.continue_on_error || manifest.build.continue_on_error);
    let orchestrator = BuildOrchestrator::new(env, project_dir.join(&manifest.build.work_dir))
        .with_units(units)
        .with_configurator(configurator_for(&manifest))
        .with_policy(policy)
        .with_log_dir(project_dir.join(&manifest.build.log_dir))
        .with_keep_workdir(args.keep_workdir || manifest.build.keep_workdir)
        .with_force(args.force);

    tracing::info!(
        "Building project {} ({} packages, {} jobs)",
        manifest.project.name,
        orchestrator.units().len(),
        orchestrator.env().jobs
    );

    let existing = orchestrator.existing_work_dirs();
    if !existing.is_empty() {
        output.warn(&format!(
            "{} existing working director{} will be destroyed and re-staged",
            existing.len(),
            if existing.len() == 1 { "y" } else { "ies" }
        ));
    }

    let observer = ProgressObserver {
        output,
        bar: output
            .show_progress()
            .then(|| create_build_bar(orchestrator.units().len() as u64))
            .filter(|bar| !bar.is_hidden()),
    };
    let executor = SystemExecutor::new();
    let report = orchestrator.run(&executor, &observer);
    if let Some(bar) = &observer.bar {
        bar.finish_and_clear();
    }

    if output.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print_summary(&report, output);
    }

    Ok(report.exit_code())
}

fn print_summary(report: &OrchestrationReport, output: &OutputConfig) {
    if report.is_success() {
        output.success(&format!(
            "Build complete: {} packages installed",
            report.succeeded()
        ));
        return;
    }

    for failure in report.failures() {
        let step = failure
            .failed_step()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        eprintln!(
            "{} {}-{} failed at {step}: {}",
            status::ERROR,
            failure.name(),
            failure.version(),
            failure.message().unwrap_or("no details")
        );
        if output.human() && !failure.diagnostics().is_empty() {
            for line in failure.diagnostics().lines() {
                eprintln!("    {line}");
            }
        }
        if let Some(log) = failure.log_file() {
            eprintln!("  Log: {}", log.display());
        }
        if let Some(dir) = failure.work_dir() {
            eprintln!("  Working directory kept at {}", dir.display());
        }
    }

    if report.was_cancelled() {
        eprintln!("{} Build cancelled", status::ERROR);
    }
    if report.stopped_early() {
        eprintln!(
            "{} Not attempted: {}",
            status::WARNING,
            report.not_attempted().join(", ")
        );
    }
    eprintln!(
        "{} Build failed: {} of {} attempted packages succeeded",
        status::ERROR,
        report.succeeded(),
        report.units().len()
    );
}
