//! Taskfile - a declarative task runner core
//!
//! Loads `Taskfile` documents (YAML, JSON or TOML) with their includes and
//! platform overlays, and runs task scripts through an in-process shell.

// Public modules
pub mod cli;
pub mod error;
pub mod pathext;
pub mod runner;
pub mod shell;
pub mod taskfile;
pub mod templater;

// Re-export commonly used types
pub use error::{Result, ShellError, TaskError, TaskfileError, TemplateError};
pub use shell::{run_command, CommandRunner, RunCommandOptions, ShellConfig, ShellStatus};
pub use taskfile::{read_taskfile, read_taskvars, Taskfile};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
