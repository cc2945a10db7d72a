//! External process launching with cooperative cancellation
//!
//! A spawned process moves through `Running -> Signaled -> (Exited | ForceKilled)`.
//! Cancellation sends a polite termination signal first and only kills the
//! process once the grace period runs out.

use crate::shell::io::{Input, Output};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A cancellation signal shared between a caller and a running script
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Signaled(Instant),
    Exited,
    ForceKilled,
}

/// How a launched process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(u8),
    Canceled,
}

/// Everything needed to launch one external program
pub struct Launch<'a> {
    pub program: PathBuf,
    pub args: &'a [String],
    pub dir: &'a Path,
    pub env: &'a HashMap<String, String>,
    pub stdin: &'a Input,
    pub stdout: &'a Output,
    pub stderr: &'a Output,
}

/// A launched program whose stdio is still being serviced
pub struct Spawned {
    guard: ProcessGuard,
    threads: Vec<JoinHandle<()>>,
}

impl Spawned {
    /// Wait for the program, honoring cancellation
    pub fn wait(self, cancel: &CancelToken) -> io::Result<ProcessOutcome> {
        let Spawned { mut guard, threads } = self;
        let outcome = guard.wait(cancel)?;

        // a force-killed process may leave grandchildren holding the pipes open
        if outcome != ProcessOutcome::Canceled {
            for handle in threads {
                let _ = handle.join();
            }
        }
        Ok(outcome)
    }
}

/// Launch a program without waiting for it
pub fn spawn(launch: Launch<'_>, kill_timeout: Duration) -> io::Result<Spawned> {
    let mut command = StdCommand::new(&launch.program);
    command
        .args(launch.args)
        .current_dir(launch.dir)
        .env_clear()
        .envs(launch.env)
        .stdin(input_stdio(launch.stdin)?)
        .stdout(output_stdio(launch.stdout, false)?)
        .stderr(output_stdio(launch.stderr, true)?);

    let mut child = command.spawn()?;
    debug!(pid = child.id(), program = %launch.program.display(), "spawned process");

    let mut threads = Vec::new();
    if let (Input::Bytes(bytes), Some(mut stdin)) = (launch.stdin, child.stdin.take()) {
        let data = bytes.take_remaining();
        threads.push(thread::spawn(move || {
            // the child may exit before reading everything
            let _ = stdin.write_all(&data);
        }));
    }
    if let Some(stdout) = child.stdout.take() {
        threads.push(pump(stdout, launch.stdout.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        threads.push(pump(stderr, launch.stderr.clone()));
    }

    Ok(Spawned {
        guard: ProcessGuard::new(child, kill_timeout),
        threads,
    })
}

/// Launch a program and wait for it, honoring cancellation
pub fn run_process(
    launch: Launch<'_>,
    cancel: &CancelToken,
    kill_timeout: Duration,
) -> io::Result<ProcessOutcome> {
    spawn(launch, kill_timeout)?.wait(cancel)
}

fn input_stdio(input: &Input) -> io::Result<Stdio> {
    Ok(match input {
        Input::Null => Stdio::null(),
        Input::Inherit => Stdio::inherit(),
        Input::Bytes(_) => Stdio::piped(),
        Input::File(file) => Stdio::from(file.try_clone()?),
        Input::Pipe(pipe) => Stdio::from(pipe.try_clone()?),
    })
}

fn output_stdio(output: &Output, is_stderr: bool) -> io::Result<Stdio> {
    Ok(match output {
        Output::Null => Stdio::null(),
        Output::Stdout if !is_stderr => Stdio::inherit(),
        Output::Stderr if is_stderr => Stdio::inherit(),
        Output::Stdout => Stdio::from(io::stdout()),
        Output::Stderr => Stdio::from(io::stderr()),
        Output::File(file) => Stdio::from(file.try_clone()?),
        Output::Pipe(pipe) => Stdio::from(pipe.try_clone()?),
        Output::Buffer(_) | Output::Writer(_) => Stdio::piped(),
    })
}

fn pump(mut source: impl Read + Send + 'static, sink: Output) -> JoinHandle<()> {
    debug_assert!(!sink.is_direct());
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if sink.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

struct ProcessGuard {
    child: Child,
    state: ProcessState,
    kill_timeout: Duration,
}

impl ProcessGuard {
    fn new(child: Child, kill_timeout: Duration) -> Self {
        ProcessGuard {
            child,
            state: ProcessState::Running,
            kill_timeout,
        }
    }

    fn wait(&mut self, cancel: &CancelToken) -> io::Result<ProcessOutcome> {
        loop {
            match self.state {
                ProcessState::Running => {
                    if let Some(status) = self.child.try_wait()? {
                        self.state = ProcessState::Exited;
                        return Ok(ProcessOutcome::Exited(exit_code(status)));
                    }
                    if cancel.is_canceled() {
                        self.terminate();
                        self.state = ProcessState::Signaled(Instant::now());
                        continue;
                    }
                }
                ProcessState::Signaled(since) => {
                    if self.child.try_wait()?.is_some() {
                        self.state = ProcessState::Exited;
                        return Ok(ProcessOutcome::Canceled);
                    }
                    if since.elapsed() >= self.kill_timeout {
                        debug!(pid = self.child.id(), "grace period over, killing process");
                        self.child.kill()?;
                        self.child.wait()?;
                        self.state = ProcessState::ForceKilled;
                        return Ok(ProcessOutcome::Canceled);
                    }
                }
                ProcessState::Exited | ProcessState::ForceKilled => {
                    return Ok(ProcessOutcome::Canceled);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        debug!(pid = self.child.id(), "sending SIGTERM");
        // SAFETY: the pid belongs to a child we have not yet reaped
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        // no polite signal to send, so the kill is immediate
        let _ = self.child.kill();
    }
}

/// Shell-style status: the exit code, or 128 + signal number
pub fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return code as u8;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (128 + signal) as u8;
        }
    }
    1
}
