//! Build unit runner
//!
//! Drives one [`PackageUnit`] through
//! `Pending → Staged → Patched → Configured → Built → Installed`.
//! The first step that fails moves the unit to `Failed(step)` and nothing
//! after it runs. There is no retry inside a unit.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::defaults::DIAGNOSTIC_TAIL_LINES;
use crate::core::build_env::BuildEnvironment;
use crate::core::installed::{self, InstalledStamp};
use crate::core::package::{PackageUnit, UnitCommands};
use crate::core::patch::{PatchApplier, PatchRecord};
use crate::core::platform::{FlagSet, PlatformConfigurator};
use crate::core::report::UnitResult;
use crate::core::stage;
use crate::error::UnitError;
use crate::infra::filesystem;
use crate::infra::process::{tail_lines, CommandExecutor, StepCommand};

/// Steps of a unit, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Precondition,
    Stage,
    Patch,
    Configure,
    Build,
    Install,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Precondition => "precondition",
            Self::Stage => "stage",
            Self::Patch => "patch",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Staged,
    Patched,
    Configured,
    Built,
    Installed,
    Failed(Step),
}

impl UnitState {
    /// State reached when the next step succeeds
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Staged),
            Self::Staged => Some(Self::Patched),
            Self::Patched => Some(Self::Configured),
            Self::Configured => Some(Self::Built),
            Self::Built => Some(Self::Installed),
            Self::Installed | Self::Failed(_) => None,
        }
    }

    /// Step that leads out of this state
    pub fn pending_step(self) -> Option<Step> {
        match self {
            Self::Pending => Some(Step::Stage),
            Self::Staged => Some(Step::Patch),
            Self::Patched => Some(Step::Configure),
            Self::Configured => Some(Step::Build),
            Self::Built => Some(Step::Install),
            Self::Installed | Self::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed(_))
    }

    /// Whether `to` is a legal transition from this state
    pub fn can_transition(self, to: Self) -> bool {
        match to {
            Self::Failed(_) => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }
}

/// Tracks one unit's state and its captured output
struct Tracker {
    unit_id: String,
    state: UnitState,
    log_file: Option<PathBuf>,
    last_output: String,
    patches: Vec<PatchRecord>,
}

impl Tracker {
    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            tracing::debug!("{}: {:?} -> {:?}", self.unit_id, self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, step: Step) {
        debug_assert!(self.state.can_transition(UnitState::Failed(step)));
        self.state = UnitState::Failed(step);
    }

    /// Append a step's output to the unit log and keep it for diagnostics
    fn record(&mut self, header: &str, output: &str) {
        self.last_output = output.to_string();
        let Some(log_file) = &self.log_file else {
            return;
        };
        let mut entry = format!("==> {header}\n{output}");
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        if let Err(e) = filesystem::append_file(log_file, &entry) {
            tracing::warn!("Could not write build log: {e}");
        }
    }
}

/// Runs single units against a shared environment
pub struct UnitRunner<'a> {
    env: &'a BuildEnvironment,
    configurator: &'a PlatformConfigurator,
    executor: &'a dyn CommandExecutor,
    work_root: PathBuf,
    log_dir: Option<PathBuf>,
    keep_workdir: bool,
}

impl<'a> UnitRunner<'a> {
    /// Create a runner whose units stage under `work_root/<name>-<version>`
    pub fn new(
        env: &'a BuildEnvironment,
        configurator: &'a PlatformConfigurator,
        executor: &'a dyn CommandExecutor,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            env,
            configurator,
            executor,
            work_root: work_root.into(),
            log_dir: None,
            keep_workdir: false,
        }
    }

    /// Write per-unit logs into `log_dir`
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Keep working directories of successful units
    #[must_use]
    pub fn with_keep_workdir(mut self, keep: bool) -> Self {
        self.keep_workdir = keep;
        self
    }

    /// Working directory of a unit
    pub fn work_dir_for(&self, unit: &PackageUnit) -> PathBuf {
        self.work_root.join(unit.id())
    }

    /// Log file of a unit, when logging is enabled
    pub fn log_file_for(&self, unit: &PackageUnit) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", unit.id())))
    }

    /// Run a unit to a terminal state
    pub fn run(&self, unit: &PackageUnit) -> UnitResult {
        let work_dir = self.work_dir_for(unit);
        let mut tracker = Tracker {
            unit_id: unit.id(),
            state: UnitState::Pending,
            log_file: None,
            last_output: String::new(),
            patches: Vec::new(),
        };

        tracing::info!("Building {}", unit.id());

        match self.execute(unit, &work_dir, &mut tracker) {
            Ok(()) => {
                tracing::info!("Installed {}", unit.id());
                if !self.keep_workdir {
                    if let Err(e) = filesystem::remove_dir_all(&work_dir) {
                        tracing::warn!("Could not release working directory: {e}");
                    }
                }
                let result = UnitResult::success(unit, tracker.patches);
                match tracker.log_file.filter(|log| log.exists()) {
                    Some(log) => result.with_log_file(log),
                    None => result,
                }
            }
            Err(error) => {
                tracker.fail(error.step());
                tracing::error!("{} failed: {error}", unit.id());

                let diagnostics = if tracker.last_output.is_empty() {
                    String::new()
                } else {
                    tail_lines(&tracker.last_output, DIAGNOSTIC_TAIL_LINES)
                };
                let mut result =
                    UnitResult::failure(unit, &error, diagnostics, tracker.patches.clone());
                if let Some(log) = tracker.log_file.take().filter(|log| log.exists()) {
                    result = result.with_log_file(log);
                }
                if work_dir.exists() {
                    result = result.with_work_dir(work_dir);
                }
                result
            }
        }
    }

    fn execute(
        &self,
        unit: &PackageUnit,
        work_dir: &Path,
        tracker: &mut Tracker,
    ) -> Result<(), UnitError> {
        // Everything that can be rejected up front is checked before the
        // filesystem is touched.
        let prefix = self.env.validate()?.to_path_buf();
        let flags = self.configurator.derive(self.env, unit);
        let commands = unit.resolve_commands(self.env, &flags)?;
        let step_env = self.step_env(&prefix, &flags);

        tracker.log_file = self.log_file_for(unit);
        if let Some(log_file) = &tracker.log_file {
            if log_file.exists() {
                if let Err(e) = std::fs::remove_file(log_file) {
                    tracing::warn!("Could not reset build log: {e}");
                }
            }
        }

        self.check_cancel(Step::Stage)?;
        tracker.last_output.clear();
        let staged = stage::stage_unit(unit, work_dir, self.executor)?;
        tracker.advance();

        self.check_cancel(Step::Patch)?;
        tracker.last_output.clear();
        let run = PatchApplier::new(self.executor).apply(unit.patches(), &staged.source_root);
        if run.applied() > 0 || run.error.is_some() {
            tracker.record("patch", &run.output);
        }
        tracker.patches = run.records.clone();
        run.into_result()?;
        tracker.advance();

        let UnitCommands {
            configure,
            build,
            install,
        } = commands;
        for (step, argv) in [
            (Step::Configure, configure),
            (Step::Build, build),
            (Step::Install, install),
        ] {
            self.run_step(step, &argv, &staged.source_root, &step_env, tracker)?;
            tracker.advance();
        }

        let stamp = InstalledStamp::new(unit, self.env, &flags);
        if let Err(e) = installed::write_stamp(&prefix, unit, &stamp) {
            tracing::warn!("Could not record install of {}: {e}", unit.id());
        }
        Ok(())
    }

    fn check_cancel(&self, step: Step) -> Result<(), UnitError> {
        if self.executor.is_cancelled() {
            Err(UnitError::Cancelled { step })
        } else {
            Ok(())
        }
    }

    fn run_step(
        &self,
        step: Step,
        argv: &[String],
        source_root: &Path,
        env: &BTreeMap<String, String>,
        tracker: &mut Tracker,
    ) -> Result<(), UnitError> {
        tracker.last_output.clear();
        self.check_cancel(step)?;
        let Some(command) = StepCommand::from_argv(argv, source_root) else {
            tracing::debug!("{}: {step} step disabled", tracker.unit_id);
            return Ok(());
        };
        let command = command.with_env(env.clone());

        tracing::info!("{}: {step}", tracker.unit_id);
        tracing::debug!("{}", command.display());

        let output = self
            .executor
            .execute(&command)
            .map_err(|e| UnitError::Spawn {
                step,
                error: e.to_string(),
            })?;
        tracker.record(&format!("{step}: {}", command.display()), &output.output);

        if output.cancelled {
            Err(UnitError::Cancelled { step })
        } else if output.success() {
            Ok(())
        } else {
            Err(UnitError::StepFailed {
                step,
                exit_code: output.exit_code,
            })
        }
    }

    /// Environment for configure/build/install: run-wide variables, the
    /// derived flags and `PATH` with `<prefix>/bin` first
    fn step_env(&self, prefix: &Path, flags: &FlagSet) -> BTreeMap<String, String> {
        let mut env = self.env.to_env_map();
        env.extend(flags.to_env_map());

        let mut paths = vec![prefix.join("bin")];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        match std::env::join_paths(paths) {
            Ok(joined) => {
                env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
            }
            Err(e) => tracing::warn!("Could not extend PATH with the prefix: {e}"),
        }
        env
    }
}
