//! Build orchestration logic
//!
//! Runs package units one after another in manifest order. Later units may
//! link against what earlier units installed into the shared prefix, so the
//! default policy stops at the first failure.

use std::path::{Path, PathBuf};

use crate::core::build_env::BuildEnvironment;
use crate::core::installed;
use crate::core::package::PackageUnit;
use crate::core::platform::PlatformConfigurator;
use crate::core::report::{OrchestrationReport, UnitResult};
use crate::core::unit::UnitRunner;
use crate::infra::process::CommandExecutor;

/// What to do after a unit fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run at the first failed unit
    #[default]
    StopOnFirstFailure,
    /// Attempt every unit and report all failures
    ContinueOnError,
}

impl FailurePolicy {
    pub fn from_continue_flag(continue_on_error: bool) -> Self {
        if continue_on_error {
            Self::ContinueOnError
        } else {
            Self::StopOnFirstFailure
        }
    }
}

/// Receives progress notifications during a run
pub trait BuildObserver {
    /// A unit is about to start
    fn unit_started(&self, _index: usize, _total: usize, _unit: &PackageUnit) {}

    /// A unit is about to be re-staged over an existing working directory
    fn replacing_work_dir(&self, _unit: &PackageUnit, _work_dir: &Path) {}

    /// A unit reached a terminal state
    fn unit_finished(&self, _index: usize, _total: usize, _result: &UnitResult) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// Build orchestrator state
#[derive(Debug)]
pub struct BuildOrchestrator {
    /// Units to build, in dependency order
    units: Vec<PackageUnit>,
    env: BuildEnvironment,
    configurator: PlatformConfigurator,
    policy: FailurePolicy,
    work_root: PathBuf,
    log_dir: Option<PathBuf>,
    keep_workdir: bool,
    force: bool,
}

impl BuildOrchestrator {
    /// Create a new build orchestrator over a resolved environment
    pub fn new(env: BuildEnvironment, work_root: impl Into<PathBuf>) -> Self {
        Self {
            units: Vec::new(),
            env,
            configurator: PlatformConfigurator::default(),
            policy: FailurePolicy::default(),
            work_root: work_root.into(),
            log_dir: None,
            keep_workdir: false,
            force: false,
        }
    }

    /// Set the units to build
    #[must_use]
    pub fn with_units(mut self, units: Vec<PackageUnit>) -> Self {
        self.units = units;
        self
    }

    #[must_use]
    pub fn with_configurator(mut self, configurator: PlatformConfigurator) -> Self {
        self.configurator = configurator;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    #[must_use]
    pub fn with_keep_workdir(mut self, keep: bool) -> Self {
        self.keep_workdir = keep;
        self
    }

    /// Rebuild units even when their installed stamp is present
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Get the build order
    pub fn units(&self) -> &[PackageUnit] {
        &self.units
    }

    pub fn env(&self) -> &BuildEnvironment {
        &self.env
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Working directories that a run would destroy and recreate
    pub fn existing_work_dirs(&self) -> Vec<PathBuf> {
        self.units
            .iter()
            .map(|u| self.work_root.join(u.id()))
            .filter(|dir| dir.exists())
            .collect()
    }

    /// Run every unit and produce the report
    pub fn run(
        &self,
        executor: &dyn CommandExecutor,
        observer: &dyn BuildObserver,
    ) -> OrchestrationReport {
        let mut runner = UnitRunner::new(&self.env, &self.configurator, executor, &self.work_root)
            .with_keep_workdir(self.keep_workdir);
        if let Some(log_dir) = &self.log_dir {
            runner = runner.with_log_dir(log_dir);
        }

        let total = self.units.len();
        let mut report = OrchestrationReport::new();
        tracing::info!("Building {total} packages ({:?})", self.policy);

        for (index, unit) in self.units.iter().enumerate() {
            if executor.is_cancelled() {
                tracing::warn!("Run cancelled before {}", unit.id());
                report.mark_cancelled();
                report.mark_not_attempted(self.remaining(index));
                break;
            }

            observer.unit_started(index, total, unit);

            let result = if !self.force && self.is_installed(unit) {
                tracing::info!("{} is already installed", unit.id());
                UnitResult::already_installed(unit)
            } else {
                let work_dir = runner.work_dir_for(unit);
                if work_dir.exists() {
                    observer.replacing_work_dir(unit, &work_dir);
                }
                runner.run(unit)
            };

            observer.unit_finished(index, total, &result);
            let failed = !result.is_success();
            report.push(result);

            if executor.is_cancelled() {
                report.mark_cancelled();
                report.mark_not_attempted(self.remaining(index + 1));
                break;
            }
            if failed && self.policy == FailurePolicy::StopOnFirstFailure {
                tracing::warn!("Stopping after failure of {}", unit.id());
                report.mark_not_attempted(self.remaining(index + 1));
                break;
            }
        }

        report
    }

    fn is_installed(&self, unit: &PackageUnit) -> bool {
        self.env
            .install_prefix
            .as_deref()
            .is_some_and(|prefix| installed::is_installed(prefix, unit))
    }

    fn remaining(&self, from: usize) -> Vec<String> {
        self.units.iter().skip(from).map(PackageUnit::id).collect()
    }
}
