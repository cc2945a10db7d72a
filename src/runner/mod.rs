//! Task execution engine
//!
//! This module drives tasks from an assembled catalog: variable resolution,
//! dependency ordering and command execution through the shell.

pub mod context;
pub mod executor;

// Re-export main types
pub use context::*;
pub use executor::*;
