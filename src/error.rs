//! Error types for the taskfile core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for taskfile operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Main error type
#[derive(Error, Debug)]
pub enum TaskError {
    /// Taskfile loading, include resolution and assembly errors
    #[error(transparent)]
    Taskfile(#[from] TaskfileError),

    /// Shell parsing and execution errors
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// Template rendering errors
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// A task was reached again while already running
    #[error("task '{0}' called itself recursively")]
    Recursion(String),

    /// Internal tasks cannot be run from the command line
    #[error("task '{0}' is internal")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TaskError {
    /// Exit code of a failed command, if that is what this error carries
    pub fn exit_code(&self) -> Option<u8> {
        match self {
            TaskError::Shell(ShellError::Exit(code)) => Some(*code),
            TaskError::Taskfile(TaskfileError::Shell(ShellError::Exit(code))) => Some(*code),
            _ => None,
        }
    }
}

/// Errors raised while reading taskfiles and resolving includes
#[derive(Error, Debug)]
pub enum TaskfileError {
    #[error("no taskfile found at {} (tried .yml, .json, .toml)", .base.display())]
    NotFound { base: PathBuf },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error resolving path {} relative to {}: {source}", .path, .base_dir.display())]
    PathResolution {
        path: String,
        base_dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("task '{task}' from include '{include}' is already defined")]
    TaskNameConflict { task: String, include: String },

    #[error("task '{0}' is not defined")]
    TaskNotFound(String),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

impl TaskfileError {
    /// Whether no candidate file existed in any supported format
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskfileError::NotFound { .. })
    }
}

/// Errors produced by the shell parser, expander and interpreter
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("{line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("expansion error: {0}")]
    Expansion(String),

    #[error("{0} is not supported")]
    Unsupported(String),

    /// The script ran and finished with a nonzero status
    #[error("exit status {0}")]
    Exit(u8),

    #[error("execution canceled")]
    Canceled,

    #[error("{0}")]
    Setup(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Template rendering errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("wrong number of args for {name}: want {want} got {got}")]
    WrongArity {
        name: String,
        want: usize,
        got: usize,
    },

    #[error("invalid action {{{{{0}}}}}")]
    InvalidAction(String),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Specialized result type for taskfile operations
pub type TaskfileResult<T> = std::result::Result<T, TaskfileError>;

/// Specialized result type for shell operations
pub type ShellResult<T> = std::result::Result<T, ShellError>;

/// Specialized result type for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Reports whether an error is a shell-level nonzero exit
/// (the script ran and failed) rather than an infrastructure failure.
pub fn is_exit_error(err: &ShellError) -> bool {
    matches!(err, ShellError::Exit(_))
}
