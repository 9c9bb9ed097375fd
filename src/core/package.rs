//! Package build units
//!
//! A [`PackageUnit`] is the immutable description of one package's
//! stage → patch → configure → build → install sequence. Units are
//! resolved from manifest entries once, before the run starts.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::config::defaults::{DEFAULT_PACKAGES_DIR, PATCHES_DIR_NAME, PATCH_EXTENSION};
use crate::core::build_env::BuildEnvironment;
use crate::core::manifest::{Manifest, PackageEntry};
use crate::core::platform::FlagSet;
use crate::error::{PreconditionError, SpkgError};

/// Placeholders expanded in configure arguments and step commands
pub const TEMPLATE_PLACEHOLDERS: &[&str] = &["PREFIX", "NAME", "VERSION", "PLATFORM", "JOBS"];

/// Upstream step command templates; an empty list disables the step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTemplates {
    pub configure: Vec<String>,
    pub build: Vec<String>,
    pub install: Vec<String>,
}

impl Default for StepTemplates {
    fn default() -> Self {
        Self {
            configure: vec!["./configure".to_string()],
            build: vec!["make".to_string()],
            install: vec!["make".to_string(), "install".to_string()],
        }
    }
}

/// Fully expanded argv for each external step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitCommands {
    pub configure: Vec<String>,
    pub build: Vec<String>,
    pub install: Vec<String>,
}

/// One package build unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUnit {
    name: String,
    version: String,
    archive: PathBuf,
    sha256: Option<String>,
    source_dir: Option<String>,
    patches: Vec<PathBuf>,
    prune: Vec<PathBuf>,
    configure_args: Vec<String>,
    cflags: Vec<String>,
    ldflags: Vec<String>,
    steps: StepTemplates,
}

impl PackageUnit {
    /// Create a unit with default steps and no patches
    pub fn new(name: &str, version: &str, archive: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            archive: archive.into(),
            sha256: None,
            source_dir: None,
            patches: Vec::new(),
            prune: Vec::new(),
            configure_args: vec!["--prefix=${PREFIX}".to_string()],
            cflags: Vec::new(),
            ldflags: Vec::new(),
            steps: StepTemplates::default(),
        }
    }

    /// Resolve a manifest entry; relative paths are taken from `project_dir`
    pub fn from_entry(project_dir: &Path, entry: &PackageEntry) -> Self {
        let patches_dir = entry.patches_dir.as_ref().map_or_else(
            || {
                project_dir
                    .join(DEFAULT_PACKAGES_DIR)
                    .join(&entry.name)
                    .join(PATCHES_DIR_NAME)
            },
            |dir| project_dir.join(dir),
        );

        let patches = match &entry.patches {
            Some(list) => list.iter().map(|p| patches_dir.join(p)).collect(),
            None => discover_patches(&patches_dir),
        };

        Self {
            name: entry.name.clone(),
            version: entry.version.clone(),
            archive: project_dir.join(&entry.archive),
            sha256: entry.sha256.clone(),
            source_dir: entry.source_dir.clone(),
            patches,
            prune: entry.prune.iter().map(PathBuf::from).collect(),
            configure_args: entry.configure_args.clone(),
            cflags: entry.cflags.clone(),
            ldflags: entry.ldflags.clone(),
            steps: StepTemplates {
                configure: entry.steps.configure.clone(),
                build: entry.steps.build.clone(),
                install: entry.steps.install.clone(),
            },
        }
    }

    /// Set the patch list
    #[must_use]
    pub fn with_patches(mut self, patches: Vec<PathBuf>) -> Self {
        self.patches = patches;
        self
    }

    /// Set the subpaths pruned after extraction
    #[must_use]
    pub fn with_prune(mut self, prune: Vec<PathBuf>) -> Self {
        self.prune = prune;
        self
    }

    /// Set the expected archive checksum
    #[must_use]
    pub fn with_sha256(mut self, sha256: &str) -> Self {
        self.sha256 = Some(sha256.to_string());
        self
    }

    /// Set the expected top-level source directory
    #[must_use]
    pub fn with_source_dir(mut self, dir: &str) -> Self {
        self.source_dir = Some(dir.to_string());
        self
    }

    /// Set the configure-argument template
    #[must_use]
    pub fn with_configure_args(mut self, args: Vec<String>) -> Self {
        self.configure_args = args;
        self
    }

    /// Set requested compiler flags
    #[must_use]
    pub fn with_cflags(mut self, flags: Vec<String>) -> Self {
        self.cflags = flags;
        self
    }

    /// Set requested linker flags
    #[must_use]
    pub fn with_ldflags(mut self, flags: Vec<String>) -> Self {
        self.ldflags = flags;
        self
    }

    /// Set the step templates
    #[must_use]
    pub fn with_steps(mut self, steps: StepTemplates) -> Self {
        self.steps = steps;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `<name>-<version>`, used for working dirs, logs and stamps
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    pub fn source_dir(&self) -> Option<&str> {
        self.source_dir.as_deref()
    }

    pub fn patches(&self) -> &[PathBuf] {
        &self.patches
    }

    pub fn prune(&self) -> &[PathBuf] {
        &self.prune
    }

    pub fn cflags(&self) -> &[String] {
        &self.cflags
    }

    pub fn ldflags(&self) -> &[String] {
        &self.ldflags
    }

    pub fn steps(&self) -> &StepTemplates {
        &self.steps
    }

    /// Expand every template into the argv of each external step.
    ///
    /// The configure step receives the expanded configure arguments followed
    /// by the platform-derived arguments. Fails before anything runs if a
    /// placeholder is unknown or the prefix is unset.
    pub fn resolve_commands(
        &self,
        env: &BuildEnvironment,
        flags: &FlagSet,
    ) -> Result<UnitCommands, PreconditionError> {
        let prefix = env.validate()?.display().to_string();
        let jobs = env.jobs.to_string();
        let lookup = |name: &str| match name {
            "PREFIX" => Some(prefix.clone()),
            "NAME" => Some(self.name.clone()),
            "VERSION" => Some(self.version.clone()),
            "PLATFORM" => Some(env.platform_name.clone()),
            "JOBS" => Some(jobs.clone()),
            _ => None,
        };
        let expand_all = |templates: &[String]| -> Result<Vec<String>, PreconditionError> {
            templates
                .iter()
                .map(|t| expand_template(&self.name, t, &lookup))
                .collect()
        };

        let mut configure = expand_all(&self.steps.configure)?;
        if !configure.is_empty() {
            configure.extend(expand_all(&self.configure_args)?);
            configure.extend(flags.configure_args.iter().cloned());
        }

        Ok(UnitCommands {
            configure,
            build: expand_all(&self.steps.build)?,
            install: expand_all(&self.steps.install)?,
        })
    }
}

/// Units of a validated manifest in manifest order.
///
/// A non-empty `only` restricts the result to the named packages while
/// keeping manifest order; naming an unknown package is an error.
pub fn resolve_units(
    project_dir: &Path,
    manifest: &Manifest,
    only: &[String],
) -> Result<Vec<PackageUnit>, SpkgError> {
    manifest.validate()?;

    if let Some(unknown) = only.iter().find(|name| manifest.package(name).is_none()) {
        return Err(SpkgError::UnknownPackage {
            name: unknown.clone(),
        });
    }

    Ok(manifest
        .packages
        .iter()
        .filter(|entry| only.is_empty() || only.contains(&entry.name))
        .map(|entry| PackageUnit::from_entry(project_dir, entry))
        .collect())
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Expand `${NAME}` placeholders in one template string
pub fn expand_template<F>(
    package: &str,
    template: &str,
    lookup: F,
) -> Result<String, PreconditionError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        let value = lookup(name).ok_or_else(|| PreconditionError::UnknownPlaceholder {
            package: package.to_string(),
            placeholder: name.to_string(),
        })?;
        output.push_str(&template[last_end..whole.start()]);
        output.push_str(&value);
        last_end = whole.end();
    }
    output.push_str(&template[last_end..]);

    Ok(output)
}

/// Sorted `*.patch` files directly inside `dir`; a missing dir yields none
pub fn discover_patches(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut patches: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == PATCH_EXTENSION))
        .collect();
    patches.sort();
    patches
}
