//! Unit results and the orchestration report

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::core::package::PackageUnit;
use crate::core::patch::PatchRecord;
use crate::core::unit::Step;
use crate::error::UnitError;

/// Terminal status of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Success,
    PreconditionFailed,
    StageFailed,
    PatchFailed,
    ConfigureFailed,
    BuildFailed,
    InstallFailed,
}

impl UnitStatus {
    /// Failure status for a unit that stopped at `step`
    pub fn failed_at(step: Step) -> Self {
        match step {
            Step::Precondition => Self::PreconditionFailed,
            Step::Stage => Self::StageFailed,
            Step::Patch => Self::PatchFailed,
            Step::Configure => Self::ConfigureFailed,
            Step::Build => Self::BuildFailed,
            Step::Install => Self::InstallFailed,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::PreconditionFailed => "precondition failed",
            Self::StageFailed => "stage failed",
            Self::PatchFailed => "patch failed",
            Self::ConfigureFailed => "configure failed",
            Self::BuildFailed => "build failed",
            Self::InstallFailed => "install failed",
        };
        f.write_str(text)
    }
}

/// Outcome of one unit, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitResult {
    name: String,
    version: String,
    status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    diagnostics: String,
    patches: Vec<PatchRecord>,
    already_installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    work_dir: Option<PathBuf>,
}

impl UnitResult {
    fn base(unit: &PackageUnit, status: UnitStatus) -> Self {
        Self {
            name: unit.name().to_string(),
            version: unit.version().to_string(),
            status,
            failed_step: None,
            exit_code: None,
            message: None,
            diagnostics: String::new(),
            patches: Vec::new(),
            already_installed: false,
            log_file: None,
            work_dir: None,
        }
    }

    /// A unit that ran every step successfully
    pub fn success(unit: &PackageUnit, patches: Vec<PatchRecord>) -> Self {
        Self {
            patches,
            ..Self::base(unit, UnitStatus::Success)
        }
    }

    /// A unit skipped because its stamp is present in the prefix
    pub fn already_installed(unit: &PackageUnit) -> Self {
        Self {
            already_installed: true,
            ..Self::base(unit, UnitStatus::Success)
        }
    }

    /// A unit that stopped at `error`; `diagnostics` is the tail of the
    /// failing step's output
    pub fn failure(
        unit: &PackageUnit,
        error: &UnitError,
        diagnostics: String,
        patches: Vec<PatchRecord>,
    ) -> Self {
        let step = error.step();
        Self {
            failed_step: Some(step),
            exit_code: error.exit_code(),
            message: Some(error.to_string()),
            diagnostics,
            patches,
            ..Self::base(unit, UnitStatus::failed_at(step))
        }
    }

    #[must_use]
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    /// Record the working directory left behind for inspection
    #[must_use]
    pub fn with_work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = Some(path);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn failed_step(&self) -> Option<Step> {
        self.failed_step
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Error message of a failed unit
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    pub fn patches(&self) -> &[PatchRecord] {
        &self.patches
    }

    pub fn was_already_installed(&self) -> bool {
        self.already_installed
    }

    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    pub fn work_dir(&self) -> Option<&PathBuf> {
        self.work_dir.as_ref()
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Failure,
}

/// Ordered results of one orchestration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestrationReport {
    units: Vec<UnitResult>,
    /// Units that were never attempted
    not_attempted: Vec<String>,
    cancelled: bool,
}

impl OrchestrationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished unit
    pub fn push(&mut self, result: UnitResult) {
        self.units.push(result);
    }

    /// Record units left unattempted after a stop condition
    pub fn mark_not_attempted(&mut self, names: impl IntoIterator<Item = String>) {
        self.not_attempted.extend(names);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn units(&self) -> &[UnitResult] {
        &self.units
    }

    pub fn not_attempted(&self) -> &[String] {
        &self.not_attempted
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether units were left unattempted
    pub fn stopped_early(&self) -> bool {
        !self.not_attempted.is_empty()
    }

    /// Success iff every attempted unit succeeded and nothing was skipped
    pub fn overall_status(&self) -> OverallStatus {
        if !self.cancelled && !self.stopped_early() && self.units.iter().all(UnitResult::is_success) {
            OverallStatus::Success
        } else {
            OverallStatus::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        self.overall_status() == OverallStatus::Success
    }

    /// Process exit status for this report
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    pub fn first_failure(&self) -> Option<&UnitResult> {
        self.units.iter().find(|u| !u.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitResult> {
        self.units.iter().filter(|u| !u.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.units.iter().filter(|u| u.is_success()).count()
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    overall_status: OverallStatus,
    #[serde(flatten)]
    report: &'a OrchestrationReport,
}

impl OrchestrationReport {
    /// Pretty JSON including the overall status
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportJson {
            overall_status: self.overall_status(),
            report: self,
        })
    }
}
