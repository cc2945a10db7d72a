//! Execution context for task running
//!
//! The context tracks the state shared by every task in one run: where
//! commands execute, which streams they use, and which tasks are active.

use crate::shell::{CancelToken, Input, Output};
use colored::Colorize;
use std::env;
use std::path::PathBuf;

/// Execution context that tracks state during task execution
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory of the root taskfile; relative task dirs resolve against it
    pub working_dir: PathBuf,

    /// Stack of tasks being executed (for detecting recursion)
    pub task_stack: Vec<String>,

    /// Verbosity level
    pub verbosity: Verbosity,

    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,

    /// Shared by every command started from this context
    pub cancel: CancelToken,
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

impl Context {
    /// Create a new context with default settings
    pub fn new() -> Self {
        Context {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            task_stack: Vec::new(),
            verbosity: Verbosity::Normal,
            stdin: Input::Inherit,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
            cancel: CancelToken::new(),
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Route command output somewhere other than the process streams
    pub fn with_output(mut self, stdout: Output, stderr: Output) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Push a task onto the execution stack
    pub fn push_task(&mut self, task_name: String) {
        self.task_stack.push(task_name);
    }

    /// Pop a task from the execution stack
    pub fn pop_task(&mut self) -> Option<String> {
        self.task_stack.pop()
    }

    /// Check if a task is in the execution stack (detect recursion)
    pub fn is_task_in_stack(&self, task_name: &str) -> bool {
        self.task_stack.iter().any(|t| t == task_name)
    }

    /// Echo a command before it runs
    pub fn print_command(&self, task_name: &str, command: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{}", format!("task: [{}] {}", task_name, command).green());
        }
    }

    /// Print warning message
    pub fn print_warning(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{}", format!("task: {}", message).yellow());
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{}", format!("task: {}", message).red());
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn print_debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{}", format!("task: {}", message).cyan());
        }
    }

    /// Print task start message
    pub fn print_task_start(&self, task_name: &str) {
        self.print_debug(&format!("\"{}\" started", task_name));
    }

    /// Print task complete message
    pub fn print_task_complete(&self, task_name: &str) {
        self.print_debug(&format!("\"{}\" finished", task_name));
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
