//! Build environment setup
//!
//! Resolves the run-wide build environment (debug mode, 64-bit mode, platform
//! name, install prefix, job count) once per orchestration run and exports it
//! to the external build steps as SPKG_LOCAL, PREFIX, SPKG_DEBUG, SPKG64,
//! UNAME and MAKEFLAGS.
//!
//! Resolution order, highest first: command line, process environment,
//! manifest `[environment]`, built-in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults::{ENV_DEBUG, ENV_FORCE64, ENV_JOBS, ENV_PLATFORM, ENV_PREFIX};
use crate::core::manifest::EnvironmentConfig;
use crate::error::PreconditionError;

/// Build environment shared by every unit of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Build with debug symbols and no optimization
    pub debug: bool,
    /// Build 64-bit objects
    pub force64: bool,
    /// Platform name in uname style (e.g. "Linux", "Darwin")
    pub platform_name: String,
    /// Shared installation prefix; `None` is a fatal precondition failure
    pub install_prefix: Option<PathBuf>,
    /// Number of parallel jobs handed to build steps
    pub jobs: usize,
}

/// One layer of partially specified environment settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    pub debug: Option<bool>,
    pub force64: Option<bool>,
    pub prefix: Option<PathBuf>,
    pub platform: Option<String>,
    pub jobs: Option<usize>,
}

impl EnvironmentOverrides {
    /// Read overrides through a variable lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PreconditionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let debug = non_empty(ENV_DEBUG)
            .map(|v| parse_bool(ENV_DEBUG, &v))
            .transpose()?;
        let force64 = non_empty(ENV_FORCE64)
            .map(|v| parse_bool(ENV_FORCE64, &v))
            .transpose()?;
        let jobs = non_empty(ENV_JOBS)
            .map(|v| parse_jobs(ENV_JOBS, &v))
            .transpose()?;

        Ok(Self {
            debug,
            force64,
            prefix: non_empty(ENV_PREFIX).map(PathBuf::from),
            platform: non_empty(ENV_PLATFORM),
            jobs,
        })
    }

    /// Read overrides from the process environment
    pub fn from_process_env() -> Result<Self, PreconditionError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Convert the manifest `[environment]` section into an override layer
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            debug: config.debug,
            force64: config.force64,
            prefix: config
                .prefix
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            platform: config.platform.clone().filter(|p| !p.trim().is_empty()),
            jobs: config.jobs,
        }
    }

    /// Fill unset fields of `self` from `lower`
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            debug: self.debug.or(lower.debug),
            force64: self.force64.or(lower.force64),
            prefix: self.prefix.or(lower.prefix),
            platform: self.platform.or(lower.platform),
            jobs: self.jobs.or(lower.jobs),
        }
    }
}

impl BuildEnvironment {
    /// Create an environment for the detected host with the given prefix
    pub fn new(install_prefix: Option<PathBuf>) -> Self {
        Self {
            debug: false,
            force64: false,
            platform_name: detect_platform(),
            install_prefix,
            jobs: num_cpus::get(),
        }
    }

    /// Resolve from layered overrides; earlier layers win
    pub fn resolve(layers: impl IntoIterator<Item = EnvironmentOverrides>) -> Self {
        let merged = layers
            .into_iter()
            .fold(EnvironmentOverrides::default(), EnvironmentOverrides::or);

        Self {
            debug: merged.debug.unwrap_or(false),
            force64: merged.force64.unwrap_or(false),
            platform_name: merged.platform.unwrap_or_else(detect_platform),
            install_prefix: merged.prefix,
            jobs: merged.jobs.unwrap_or_else(num_cpus::get),
        }
    }

    /// Enable or disable debug mode
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable 64-bit mode
    #[must_use]
    pub fn with_force64(mut self, force64: bool) -> Self {
        self.force64 = force64;
        self
    }

    /// Set the platform name
    #[must_use]
    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform_name = platform.to_string();
        self
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Check that the environment is complete; returns the prefix
    pub fn validate(&self) -> Result<&Path, PreconditionError> {
        let prefix = match self.install_prefix.as_deref() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Err(PreconditionError::MissingPrefix),
        };
        if !prefix.is_absolute() {
            return Err(PreconditionError::RelativePrefix {
                path: prefix.to_path_buf(),
            });
        }
        if self.jobs == 0 {
            return Err(PreconditionError::InvalidValue {
                variable: "jobs".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.platform_name.trim().is_empty() {
            return Err(PreconditionError::InvalidValue {
                variable: ENV_PLATFORM.to_string(),
                value: String::new(),
                reason: "platform name cannot be empty".to_string(),
            });
        }
        Ok(prefix)
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        if let Some(prefix) = &self.install_prefix {
            let prefix = prefix.display().to_string();
            env.insert(ENV_PREFIX.to_string(), prefix.clone());
            env.insert("PREFIX".to_string(), prefix);
        }
        env.insert(ENV_DEBUG.to_string(), yes_no(self.debug));
        env.insert(ENV_FORCE64.to_string(), yes_no(self.force64));
        env.insert(ENV_PLATFORM.to_string(), self.platform_name.clone());
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.jobs));

        env
    }
}

fn yes_no(value: bool) -> String {
    let text = if value { "yes" } else { "no" };
    text.to_string()
}

/// Parse a boolean environment value (`yes/no`, `1/0`, `true/false`, `on/off`)
pub fn parse_bool(variable: &str, value: &str) -> Result<bool, PreconditionError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(PreconditionError::InvalidValue {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: "expected yes/no".to_string(),
        }),
    }
}

fn parse_jobs(variable: &str, value: &str) -> Result<usize, PreconditionError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PreconditionError::InvalidValue {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}

/// Host platform name in uname style
pub fn detect_platform() -> String {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        "solaris" | "illumos" => "SunOS",
        "windows" => "CYGWIN",
        other => other,
    }
    .to_string()
}
