//! Check command logic
//!
//! Validates the manifest, the resolved environment, every package's inputs
//! and the external tools a build would need, without building anything.

use std::path::{Path, PathBuf};

use crate::core::build_env::BuildEnvironment;
use crate::core::installed;
use crate::core::manifest::Manifest;
use crate::core::package::PackageUnit;
use crate::infra::archive::{self, ArchiveFormat};

/// Inputs of one package as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCheck {
    pub id: String,
    pub archive: PathBuf,
    pub archive_present: bool,
    /// `None` when no checksum is configured or the archive is absent
    pub checksum_ok: Option<bool>,
    pub patches: usize,
    /// Listed patches that do not exist (they will be skipped)
    pub missing_patches: Vec<PathBuf>,
    pub installed: bool,
}

/// An external tool and whether it was found on `PATH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub name: &'static str,
    pub required: bool,
    pub found: bool,
}

/// Result of the check operation
#[derive(Debug, Default)]
pub struct CheckResult {
    /// Problems that would make a build fail
    pub errors: Vec<String>,
    /// Problems a build would tolerate
    pub warnings: Vec<String>,
    /// Packages in build order
    pub packages: Vec<PackageCheck>,
    pub tools: Vec<ToolCheck>,
}

impl CheckResult {
    /// Check if all validations passed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Perform check operation on a project
pub fn check(project_dir: &Path, manifest: &Manifest, env: &BuildEnvironment) -> CheckResult {
    let mut result = CheckResult::default();

    if let Err(e) = manifest.validate() {
        result.errors.push(e.to_string());
    }

    let prefix = match env.validate() {
        Ok(prefix) => Some(prefix.to_path_buf()),
        Err(e) => {
            result.errors.push(e.to_string());
            None
        }
    };

    let units: Vec<PackageUnit> = manifest
        .packages
        .iter()
        .map(|entry| PackageUnit::from_entry(project_dir, entry))
        .collect();

    for unit in &units {
        result.packages.push(check_unit(unit, prefix.as_deref(), &mut result.errors));
    }

    for package in &result.packages {
        for patch in &package.missing_patches {
            result.warnings.push(format!(
                "{}: patch {} does not exist and will be skipped",
                package.id,
                patch.display()
            ));
        }
    }

    let needs_patch = units.iter().any(|u| !u.patches().is_empty());
    let needs_tar = units.iter().any(|u| {
        ArchiveFormat::detect(u.archive()).is_some_and(|format| !format.is_native())
    });
    for (name, required) in [("patch", needs_patch), ("tar", needs_tar)] {
        let found = which::which(name).is_ok();
        if !found {
            let message = format!("'{name}' not found in PATH");
            if required {
                result.errors.push(message);
            } else {
                result.warnings.push(message);
            }
        }
        result.tools.push(ToolCheck {
            name,
            required,
            found,
        });
    }

    result
}

fn check_unit(unit: &PackageUnit, prefix: Option<&Path>, errors: &mut Vec<String>) -> PackageCheck {
    let archive_present = unit.archive().is_file();
    if !archive_present {
        errors.push(format!(
            "{}: archive {} not found",
            unit.id(),
            unit.archive().display()
        ));
    } else if ArchiveFormat::detect(unit.archive()).is_none() {
        errors.push(format!(
            "{}: unsupported archive format {}",
            unit.id(),
            unit.archive().display()
        ));
    }

    let checksum_ok = match unit.sha256() {
        Some(expected) if archive_present => {
            let ok = archive::verify_sha256(unit.archive(), expected).is_ok();
            if !ok {
                errors.push(format!("{}: archive checksum mismatch", unit.id()));
            }
            Some(ok)
        }
        _ => None,
    };

    PackageCheck {
        id: unit.id(),
        archive: unit.archive().to_path_buf(),
        archive_present,
        checksum_ok,
        patches: unit.patches().len(),
        missing_patches: unit
            .patches()
            .iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect(),
        installed: prefix.is_some_and(|p| installed::is_installed(p, unit)),
    }
}
