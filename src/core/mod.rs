//! Core business logic module
//!
//! Orchestration logic for package build units. Side effects (processes,
//! archives, filesystem) go through [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (spkg.toml) parsing and validation
//! - [`package`] - Package build units and template expansion
//! - [`build_env`] - Build environment resolution
//! - [`platform`] - Platform configurator (compiler/linker flags)
//! - [`stage`] - Source stager
//! - [`patch`] - Patch applier
//! - [`unit`] - Build unit runner state machine
//! - [`builder`] - Package orchestrator
//! - [`report`] - Unit results and orchestration report
//! - [`installed`] - Installed stamps in the shared prefix
//! - [`check`] - Configuration validation logic
//! - [`clean`] - Clean build artifacts logic

pub mod build_env;
pub mod builder;
pub mod check;
pub mod clean;
pub mod installed;
pub mod manifest;
pub mod package;
pub mod patch;
pub mod platform;
pub mod report;
pub mod stage;
pub mod unit;
