//! Infrastructure layer
//!
//! Handles all I/O operations: external processes, archives and the
//! filesystem. This module is the only place where side effects occur.

pub mod archive;
pub mod filesystem;
pub mod process;
