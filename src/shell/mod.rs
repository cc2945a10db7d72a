//! In-process shell sandbox
//!
//! Task commands are parsed and evaluated here rather than handed to a
//! native `sh`, so scripts behave the same on every platform.

pub mod ast;
mod builtins;
pub mod expand;
mod interp;
pub mod io;
pub mod parse;
pub mod process;

pub use crate::error::is_exit_error;
pub use expand::expand;
pub use io::{Input, Output, SharedBuffer};
pub use process::CancelToken;

use crate::error::{ShellError, ShellResult};
use crate::pathext;
use interp::{Interp, Streams};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Grace period between the termination signal and the forced kill
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(15);

/// Runner configuration, built once by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellConfig {
    pub kill_timeout: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }
}

/// One script invocation
#[derive(Debug, Clone)]
pub struct RunCommandOptions {
    pub command: String,
    /// Working directory; `None` means the process's current directory
    pub dir: Option<PathBuf>,
    /// Environment seen by the script; empty means a snapshot of the process environment
    pub env: HashMap<String, String>,
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    pub cancel: CancelToken,
}

impl RunCommandOptions {
    pub fn new(command: impl Into<String>) -> Self {
        RunCommandOptions {
            command: command.into(),
            dir: None,
            env: HashMap::new(),
            stdin: Input::Null,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_stdout(mut self, stdout: Output) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: Output) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Final status of a script that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellStatus(pub u8);

impl ShellStatus {
    pub fn code(self) -> u8 {
        self.0
    }

    pub fn success(self) -> bool {
        self.0 == 0
    }

    /// `Ok` on success, otherwise [`ShellError::Exit`]
    pub fn into_result(self) -> ShellResult<()> {
        if self.success() {
            Ok(())
        } else {
            Err(ShellError::Exit(self.0))
        }
    }
}

/// Runs scripts with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    config: ShellConfig,
}

impl CommandRunner {
    pub fn new(config: ShellConfig) -> Self {
        CommandRunner { config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Parse and run one script.
    ///
    /// `Ok` carries the script's exit status, zero or not. `Err` means the
    /// script could not be parsed, its setup failed, or it was canceled.
    pub fn run(&self, opts: RunCommandOptions) -> ShellResult<ShellStatus> {
        let program = parse::parse(&opts.command)?;

        let env = if opts.env.is_empty() {
            env_snapshot()
        } else {
            opts.env
        };
        let dir = working_dir(opts.dir.as_deref())?;

        let io = Streams {
            stdin: opts.stdin,
            stdout: opts.stdout,
            stderr: opts.stderr,
        };
        let mut interp = Interp::new(env, dir, io, opts.cancel, self.config.kill_timeout);
        interp.run(&program).map(ShellStatus)
    }
}

/// Run a script with the default configuration
pub fn run_command(opts: RunCommandOptions) -> ShellResult<ShellStatus> {
    CommandRunner::default().run(opts)
}

/// Snapshot of the process environment at call time
pub fn env_snapshot() -> HashMap<String, String> {
    env::vars_os()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect()
}

/// Absolute execution directory. A directory that does not exist yet is
/// adopted as-is so the script itself can create it.
fn working_dir(dir: Option<&Path>) -> ShellResult<PathBuf> {
    let dir = match dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => env::current_dir()?,
    };
    let absolute = pathext::absolute(&dir)?;

    match fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Ok(absolute),
        Ok(_) => Err(ShellError::Setup(format!(
            "{} is not a directory",
            absolute.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %absolute.display(), "working directory does not exist yet");
            Ok(absolute)
        }
        Err(e) => Err(ShellError::Io(e)),
    }
}
