//! Platform configurator
//!
//! Derives compiler/linker flags and extra configure arguments from the build
//! environment. Derivation is a pure function of its inputs so a unit can be
//! retried without re-deriving a different flag set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::defaults::DEFAULT_OPTIMIZATION;
use crate::core::build_env::BuildEnvironment;
use crate::core::manifest::PlatformRuleConfig;
use crate::core::package::PackageUnit;

/// Resolved flags handed to the configure/build/install steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub fcflags: Vec<String>,
    pub cppflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub configure_args: Vec<String>,
}

impl FlagSet {
    /// Environment variables for the external steps
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CFLAGS".to_string(), self.cflags.join(" "));
        env.insert("CXXFLAGS".to_string(), self.cxxflags.join(" "));
        env.insert("FCFLAGS".to_string(), self.fcflags.join(" "));
        env.insert("CPPFLAGS".to_string(), self.cppflags.join(" "));
        env.insert("LDFLAGS".to_string(), self.ldflags.join(" "));
        env
    }

    /// Every optimization flag in the compile flag lists
    pub fn optimization_flags(&self) -> impl Iterator<Item = &str> {
        self.cflags
            .iter()
            .chain(&self.cxxflags)
            .chain(&self.fcflags)
            .map(String::as_str)
            .filter(|f| is_optimization(f))
    }
}

/// Extra arguments for platforms whose name starts with `pattern`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRule {
    pub pattern: String,
    pub configure_args: Vec<String>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl PlatformRule {
    /// Case-insensitive prefix match against a platform name
    pub fn matches(&self, platform: &str) -> bool {
        platform
            .to_ascii_lowercase()
            .starts_with(&self.pattern.to_ascii_lowercase())
    }
}

impl From<&PlatformRuleConfig> for PlatformRule {
    fn from(config: &PlatformRuleConfig) -> Self {
        Self {
            pattern: config.pattern.clone(),
            configure_args: config.configure_args.clone(),
            cflags: config.cflags.clone(),
            ldflags: config.ldflags.clone(),
        }
    }
}

/// Rules applied on every run
pub fn builtin_rules() -> Vec<PlatformRule> {
    vec![PlatformRule {
        pattern: "Darwin".to_string(),
        configure_args: vec!["--with-blas=-framework Accelerate".to_string()],
        cflags: Vec::new(),
        ldflags: vec!["-Wl,-headerpad_max_install_names".to_string()],
    }]
}

/// Derives [`FlagSet`]s from a [`BuildEnvironment`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfigurator {
    rules: Vec<PlatformRule>,
}

impl Default for PlatformConfigurator {
    fn default() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }
}

impl PlatformConfigurator {
    /// Configurator without any platform rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append rules after the existing ones
    #[must_use]
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = PlatformRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rules(&self) -> &[PlatformRule] {
        &self.rules
    }

    /// Flags for one unit
    pub fn derive(&self, env: &BuildEnvironment, unit: &PackageUnit) -> FlagSet {
        self.derive_with(env, unit.cflags(), unit.ldflags())
    }

    /// Flags from the environment plus explicitly requested compile/link flags.
    ///
    /// `debug` overrides any requested optimization with `-O0 -g`; `force64`
    /// appends `-m64`; matching platform rules contribute configure arguments
    /// and flags in rule order.
    pub fn derive_with(
        &self,
        env: &BuildEnvironment,
        requested_cflags: &[String],
        requested_ldflags: &[String],
    ) -> FlagSet {
        let matching: Vec<&PlatformRule> = self
            .rules
            .iter()
            .filter(|r| r.matches(&env.platform_name))
            .collect();

        let mut compile: Vec<String> = requested_cflags.to_vec();
        compile.extend(matching.iter().flat_map(|r| r.cflags.iter().cloned()));

        let mut ldflags: Vec<String> = requested_ldflags.to_vec();
        ldflags.extend(matching.iter().flat_map(|r| r.ldflags.iter().cloned()));

        if env.debug {
            compile.retain(|f| !is_optimization(f));
            ldflags.retain(|f| !is_optimization(f));
            compile.insert(0, "-O0".to_string());
            push_unique(&mut compile, "-g");
        } else if !compile.iter().any(|f| is_optimization(f)) {
            compile.insert(0, DEFAULT_OPTIMIZATION.to_string());
            push_unique(&mut compile, "-g");
        }

        if env.force64 {
            push_unique(&mut compile, "-m64");
            push_unique(&mut ldflags, "-m64");
        }

        let mut cppflags = Vec::new();
        if let Some(prefix) = &env.install_prefix {
            cppflags.push(format!("-I{}", prefix.join("include").display()));
            ldflags.push(format!("-L{}", prefix.join("lib").display()));
        }

        FlagSet {
            cflags: compile.clone(),
            cxxflags: compile.clone(),
            fcflags: compile,
            cppflags,
            ldflags,
            configure_args: matching
                .iter()
                .flat_map(|r| r.configure_args.iter().cloned())
                .collect(),
        }
    }
}

/// Whether a flag selects an optimization level (`-O`, `-O2`, `-Os`, `-Ofast`, ...)
pub fn is_optimization(flag: &str) -> bool {
    flag.starts_with("-O")
}

fn push_unique(flags: &mut Vec<String>, flag: &str) {
    if !flags.iter().any(|f| f == flag) {
        flags.push(flag.to_string());
    }
}
