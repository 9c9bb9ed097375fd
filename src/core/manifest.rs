//! Manifest (spkg.toml) parsing and validation
//!
//! The manifest is the main configuration file for an spkg project. It lists
//! the packages to build in dependency order, the default build environment,
//! and the orchestration policy.
//!
//! String values support environment variable substitution using `${VAR}`
//! syntax. The unit placeholders (`${PREFIX}`, `${NAME}`, ...) are left intact
//! so they can be expanded per unit at build time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::defaults::{DEFAULT_LOG_DIR, DEFAULT_WORK_DIR, MANIFEST_FILE};
use crate::core::package::TEMPLATE_PLACEHOLDERS;
use crate::error::ManifestError;
use crate::infra::filesystem::is_contained_relative;

/// The main project manifest (spkg.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project configuration
    pub project: ProjectConfig,

    /// Build environment defaults
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Orchestration settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Extra platform special cases
    #[serde(default, rename = "platform")]
    pub platforms: Vec<PlatformRuleConfig>,

    /// Packages, in dependency order
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

/// `[environment]` section; every field may be overridden by the process
/// environment or the command line
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Installation prefix shared by all units
    #[serde(default)]
    pub prefix: Option<String>,

    /// Build with debug flags
    #[serde(default)]
    pub debug: Option<bool>,

    /// Build 64-bit objects
    #[serde(default)]
    pub force64: Option<bool>,

    /// Platform name (uname style)
    #[serde(default)]
    pub platform: Option<String>,

    /// Parallel jobs for build steps
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// `[build]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfig {
    /// Directory holding per-unit working directories
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Directory holding per-unit logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Keep building after a unit fails
    #[serde(default)]
    pub continue_on_error: bool,

    /// Keep the working directory of successful units
    #[serde(default)]
    pub keep_workdir: bool,
}

fn default_work_dir() -> String {
    DEFAULT_WORK_DIR.to_string()
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            log_dir: default_log_dir(),
            continue_on_error: false,
            keep_workdir: false,
        }
    }
}

/// `[[platform]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformRuleConfig {
    /// Platform name prefix this rule applies to
    #[serde(rename = "match")]
    pub pattern: String,

    /// Extra configure arguments
    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Extra compiler flags
    #[serde(default)]
    pub cflags: Vec<String>,

    /// Extra linker flags
    #[serde(default)]
    pub ldflags: Vec<String>,
}

/// `[[package]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageEntry {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Source archive, relative to the project directory
    pub archive: String,

    /// Expected SHA256 of the archive
    #[serde(default)]
    pub sha256: Option<String>,

    /// Expected top-level directory inside the archive
    #[serde(default)]
    pub source_dir: Option<String>,

    /// Patch directory (default: packages/<name>/patches)
    #[serde(default)]
    pub patches_dir: Option<String>,

    /// Explicit patch order, relative to the patch directory
    #[serde(default)]
    pub patches: Option<Vec<String>>,

    /// Subpaths of the source tree removed after extraction
    #[serde(default)]
    pub prune: Vec<String>,

    /// Configure-argument template
    #[serde(default = "default_configure_args")]
    pub configure_args: Vec<String>,

    /// Compiler flags requested by the package
    #[serde(default)]
    pub cflags: Vec<String>,

    /// Linker flags requested by the package
    #[serde(default)]
    pub ldflags: Vec<String>,

    /// Upstream step commands
    #[serde(default)]
    pub steps: StepsConfig,
}

fn default_configure_args() -> Vec<String> {
    vec!["--prefix=${PREFIX}".to_string()]
}

/// `[package.steps]` table; an empty list disables a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepsConfig {
    /// Configure entry point
    #[serde(default = "default_configure_step")]
    pub configure: Vec<String>,

    /// Compile command
    #[serde(default = "default_build_step")]
    pub build: Vec<String>,

    /// Install command
    #[serde(default = "default_install_step")]
    pub install: Vec<String>,
}

fn default_configure_step() -> Vec<String> {
    vec!["./configure".to_string()]
}

fn default_build_step() -> Vec<String> {
    vec!["make".to_string()]
}

fn default_install_step() -> Vec<String> {
    vec!["make".to_string(), "install".to_string()]
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            configure: default_configure_step(),
            build: default_build_step(),
            install: default_install_step(),
        }
    }
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

fn package_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.+-]*$").expect("name pattern is valid"))
}

/// Substitute `${VAR}` patterns using `lookup`.
///
/// Unit placeholders and unset variables are preserved verbatim, so a
/// misspelled placeholder surfaces when the unit's templates are expanded.
pub fn substitute_env_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_var_regex()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if TEMPLATE_PLACEHOLDERS.contains(&name) {
                return caps[0].to_string();
            }
            lookup(name).unwrap_or_else(|| {
                tracing::debug!("Environment variable {name} is not set; leaving ${{{name}}} in place");
                caps[0].to_string()
            })
        })
        .into_owned()
}

/// Substitute `${VAR}` patterns from the process environment
///
/// # Example
///
/// ```
/// use spkg::core::manifest::substitute_env_vars;
///
/// assert_eq!(substitute_env_vars("--prefix=${PREFIX}"), "--prefix=${PREFIX}");
/// ```
pub fn substitute_env_vars(input: &str) -> String {
    substitute_env_vars_with(input, |name| std::env::var(name).ok())
}

fn substitute_in_value<F>(value: &mut toml::Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        toml::Value::String(s) => *s = substitute_env_vars_with(s, lookup),
        toml::Value::Array(items) => {
            for item in items {
                substitute_in_value(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v, lookup);
            }
        }
        _ => {}
    }
}

impl Manifest {
    /// Load `spkg.toml` from a project directory, substituting environment variables
    pub fn load(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = project_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(ManifestError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ManifestError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Self::from_toml_with_env(&content, |name| std::env::var(name).ok())
    }

    /// Parse with `${VAR}` substitution using `lookup`
    pub fn from_toml_with_env<F>(content: &str, lookup: F) -> Result<Self, ManifestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut value: toml::Value =
            toml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))?;
        substitute_in_value(&mut value, &lookup);
        value
            .try_into::<Self>()
            .map_err(|e: toml::de::Error| ManifestError::Parse(e.to_string()))
    }

    /// Parse without substitution
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Look up a package entry by name
    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Validate the manifest and report every problem found
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut problems = Vec::new();

        if self.project.name.trim().is_empty() {
            problems.push("Field 'project.name' cannot be empty".to_string());
        }
        for (field, dir) in [
            ("build.work_dir", &self.build.work_dir),
            ("build.log_dir", &self.build.log_dir),
        ] {
            if dir.trim().is_empty() {
                problems.push(format!("Field '{field}' cannot be empty"));
            } else if !is_contained_relative(Path::new(dir)) {
                problems.push(format!(
                    "Field '{field}' ('{dir}') must be a subdirectory of the project"
                ));
            }
        }
        if self.environment.jobs == Some(0) {
            problems.push("Field 'environment.jobs' must be greater than 0".to_string());
        }

        for rule in &self.platforms {
            if rule.pattern.trim().is_empty() {
                problems.push("Platform rule has an empty 'match'".to_string());
            }
        }

        let mut seen = HashSet::new();
        for (index, pkg) in self.packages.iter().enumerate() {
            let label = if pkg.name.is_empty() {
                format!("package #{}", index + 1)
            } else {
                format!("package '{}'", pkg.name)
            };

            if pkg.name.is_empty() {
                problems.push(format!("{label}: name cannot be empty"));
            } else if !package_name_regex().is_match(&pkg.name) {
                problems.push(format!("{label}: invalid name"));
            } else if !seen.insert(pkg.name.as_str()) {
                problems.push(format!("{label}: listed more than once"));
            }

            if pkg.version.trim().is_empty() {
                problems.push(format!("{label}: version cannot be empty"));
            } else if pkg.version.contains(['/', ' ']) {
                problems.push(format!("{label}: version '{}' is invalid", pkg.version));
            }

            if pkg.archive.trim().is_empty() {
                problems.push(format!("{label}: archive cannot be empty"));
            }

            if let Some(sha) = &pkg.sha256 {
                if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                    problems.push(format!("{label}: sha256 must be 64 hex characters"));
                }
            }

            if let Some(dir) = &pkg.source_dir {
                if !is_contained_relative(Path::new(dir)) {
                    problems.push(format!(
                        "{label}: source_dir '{dir}' must be relative and stay inside the working directory"
                    ));
                }
            }

            for sub in &pkg.prune {
                if !is_contained_relative(Path::new(sub)) {
                    problems.push(format!(
                        "{label}: prune path '{sub}' must be relative and stay inside the source tree"
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Invalid { problems })
        }
    }
}
