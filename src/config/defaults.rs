//! Default configuration values

/// Project manifest file name
pub const MANIFEST_FILE: &str = "spkg.toml";

/// Default directory (relative to the project) holding per-unit working directories
pub const DEFAULT_WORK_DIR: &str = "build";

/// Default directory (relative to the project) holding per-unit build logs
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default directory (relative to the project) holding per-package patch sets
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

/// Name of the patch directory inside a package directory
pub const PATCHES_DIR_NAME: &str = "patches";

/// File extension that marks a patch during discovery
pub const PATCH_EXTENSION: &str = "patch";

/// Leading path components stripped when applying a patch
pub const PATCH_STRIP_LEVEL: u32 = 1;

/// Location of installed stamps, relative to the install prefix
pub const INSTALLED_STAMPS_DIR: &str = "var/lib/spkg/installed";

/// Number of trailing output lines kept in a unit's diagnostics
pub const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Optimization used when neither debug mode nor the package asks for one
pub const DEFAULT_OPTIMIZATION: &str = "-O2";

/// Interval between child-process status polls (milliseconds)
pub const PROCESS_POLL_INTERVAL_MS: u64 = 50;

/// Environment variable: debug build toggle
pub const ENV_DEBUG: &str = "SPKG_DEBUG";

/// Environment variable: 64-bit build toggle
pub const ENV_FORCE64: &str = "SPKG64";

/// Environment variable: installation prefix
pub const ENV_PREFIX: &str = "SPKG_LOCAL";

/// Environment variable: platform name override
pub const ENV_PLATFORM: &str = "UNAME";

/// Environment variable: parallel job count
pub const ENV_JOBS: &str = "SPKG_JOBS";
