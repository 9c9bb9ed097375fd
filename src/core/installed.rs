//! Installed stamps
//!
//! A stamp under `<prefix>/var/lib/spkg/installed/<name>-<version>` records
//! that a unit finished its install step into the shared prefix.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::defaults::INSTALLED_STAMPS_DIR;
use crate::core::build_env::BuildEnvironment;
use crate::core::package::PackageUnit;
use crate::core::platform::FlagSet;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Contents of an installed stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledStamp {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub debug: bool,
    pub force64: bool,
    pub flags: FlagSet,
}

impl InstalledStamp {
    pub fn new(unit: &PackageUnit, env: &BuildEnvironment, flags: &FlagSet) -> Self {
        Self {
            name: unit.name().to_string(),
            version: unit.version().to_string(),
            platform: env.platform_name.clone(),
            debug: env.debug,
            force64: env.force64,
            flags: flags.clone(),
        }
    }
}

/// Path of a unit's stamp under `prefix`
pub fn stamp_path(prefix: &Path, unit: &PackageUnit) -> PathBuf {
    prefix.join(INSTALLED_STAMPS_DIR).join(unit.id())
}

/// Whether `unit` (at this exact version) is stamped as installed
pub fn is_installed(prefix: &Path, unit: &PackageUnit) -> bool {
    stamp_path(prefix, unit).is_file()
}

/// Record a completed install
pub fn write_stamp(prefix: &Path, unit: &PackageUnit, stamp: &InstalledStamp) -> Result<PathBuf, FilesystemError> {
    let path = stamp_path(prefix, unit);
    let json = serde_json::to_string_pretty(stamp).map_err(|e| FilesystemError::WriteFile {
        path: path.clone(),
        error: e.to_string(),
    })?;
    filesystem::write_file(&path, &json)?;
    Ok(path)
}

/// Read a unit's stamp; `Ok(None)` when it is not installed
pub fn read_stamp(prefix: &Path, unit: &PackageUnit) -> Result<Option<InstalledStamp>, FilesystemError> {
    let path = stamp_path(prefix, unit);
    if !path.is_file() {
        return Ok(None);
    }
    let content = filesystem::read_file(&path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| FilesystemError::ReadFile {
            path,
            error: e.to_string(),
        })
}
