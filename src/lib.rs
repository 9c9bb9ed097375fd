//! spkg - build orchestration for a source package distribution
//!
//! Stages upstream archives, applies patches, derives platform flags and
//! runs configure/build/install for an ordered list of packages sharing one
//! installation prefix.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Orchestration logic
//! - [`infra`] - Infrastructure layer (processes, archives, filesystem)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
