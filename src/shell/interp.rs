//! Script evaluation
//!
//! Walks a parsed [`Program`] sequentially. A nonzero status aborts the
//! script (`set -e` is on by default) except where the status is being
//! tested: `if`/`while` conditions, non-final members of `&&`/`||` lists
//! and negated pipelines.

use crate::error::{ShellError, ShellResult};
use crate::shell::ast::*;
use crate::shell::builtins;
use crate::shell::expand::{expand_fields, expand_literal, ExpandEnv};
use crate::shell::io::{self, Input, OpenFlags, Output, SharedBuffer};
use crate::shell::process::{spawn, CancelToken, Launch, ProcessOutcome, Spawned};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Why evaluation stopped early
#[derive(Debug)]
pub(crate) enum Stop {
    /// `exit` or an error under `set -e`
    Exit(u8),
    Fault(ShellError),
}

impl From<ShellError> for Stop {
    fn from(err: ShellError) -> Self {
        Stop::Fault(err)
    }
}

pub(crate) type Flow<T> = std::result::Result<T, Stop>;

/// A simple command after expansion
enum Stage {
    /// Ran in-process with this status
    Finished(u8),
    External(External),
}

/// An external program ready to launch
struct External {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    streams: Streams,
}

/// The three standard streams of a command
#[derive(Debug, Clone, Default)]
pub(crate) struct Streams {
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
}

/// Interpreter state for one script run.
///
/// Subshells, command substitutions and pipeline stages run on a clone.
#[derive(Debug, Clone)]
pub(crate) struct Interp {
    pub vars: HashMap<String, String>,
    pub exported: HashSet<String>,
    pub dir: PathBuf,
    pub io: Streams,
    pub errexit: bool,
    pub last_status: u8,
    substitutions: usize,
    cancel: CancelToken,
    kill_timeout: Duration,
}

impl Interp {
    pub fn new(
        env: HashMap<String, String>,
        dir: PathBuf,
        io: Streams,
        cancel: CancelToken,
        kill_timeout: Duration,
    ) -> Self {
        let exported = env.keys().cloned().collect();
        let mut interp = Interp {
            vars: env,
            exported,
            dir,
            io,
            errexit: true,
            last_status: 0,
            substitutions: 0,
            cancel,
            kill_timeout,
        };
        let pwd = interp.dir.to_string_lossy().into_owned();
        interp.export_var("PWD", pwd);
        interp
    }

    /// Run a whole program and return its final status
    pub fn run(&mut self, program: &Program) -> ShellResult<u8> {
        match self.exec_program(program, false) {
            Ok(()) => Ok(self.last_status),
            Err(Stop::Exit(code)) => Ok(code),
            Err(Stop::Fault(err)) => Err(err),
        }
    }

    pub fn set_var(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn export_var(&mut self, name: &str, value: String) {
        self.set_var(name, value);
        self.exported.insert(name.to_string());
    }

    pub fn unset_var(&mut self, name: &str) {
        self.vars.remove(name);
        self.exported.remove(name);
    }

    pub fn out(&self, text: &str) -> ShellResult<()> {
        Ok(self.io.stdout.write_all(text.as_bytes())?)
    }

    pub fn err(&self, text: &str) -> ShellResult<()> {
        Ok(self.io.stderr.write_all(text.as_bytes())?)
    }

    fn exported_env(&self) -> HashMap<String, String> {
        self.vars
            .iter()
            .filter(|(name, _)| self.exported.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn check_canceled(&self) -> Flow<()> {
        if self.cancel.is_canceled() {
            return Err(ShellError::Canceled.into());
        }
        Ok(())
    }

    /// Run a clone to completion, turning `exit` into a status
    fn run_nested(mut nested: Interp, program: &Program, cond: bool) -> Flow<u8> {
        match nested.exec_program(program, cond) {
            Ok(()) => Ok(nested.last_status),
            Err(Stop::Exit(code)) => Ok(code),
            Err(fault) => Err(fault),
        }
    }

    pub(crate) fn exec_program(&mut self, program: &Program, cond: bool) -> Flow<()> {
        for item in &program.items {
            self.exec_and_or(item, cond)?;
        }
        Ok(())
    }

    fn exec_and_or(&mut self, list: &AndOr, cond: bool) -> Flow<()> {
        let mut status = self.exec_pipeline(&list.first, cond || !list.rest.is_empty())?;
        for (i, (connector, pipeline)) in list.rest.iter().enumerate() {
            let run = match connector {
                Connector::And => status == 0,
                Connector::Or => status != 0,
            };
            if run {
                let is_last = i + 1 == list.rest.len();
                status = self.exec_pipeline(pipeline, cond || !is_last)?;
            }
        }
        Ok(())
    }

    fn exec_pipeline(&mut self, pipeline: &Pipeline, cond: bool) -> Flow<u8> {
        let status = match pipeline.commands.as_slice() {
            [command] => self.exec_command(command, cond || pipeline.negated)?,
            commands => self.exec_stages(commands, cond)?,
        };

        let status = if pipeline.negated {
            u8::from(status == 0)
        } else {
            status
        };
        self.last_status = status;
        if status != 0 && self.errexit && !cond && !pipeline.negated {
            return Err(Stop::Exit(status));
        }
        Ok(status)
    }

    /// Run a multi-stage pipeline.
    ///
    /// External programs start right away with their stdout on an OS pipe,
    /// so adjacent programs stream into each other. In-process stages run to
    /// completion with their output buffered for the next stage.
    fn exec_stages(&mut self, commands: &[Command], cond: bool) -> Flow<u8> {
        let mut running = Vec::new();
        let (mut status, last_running) = match self.start_stages(commands, cond, &mut running) {
            Ok(started) => started,
            Err(fault) => {
                // the fault wins over whatever the programs report
                let _ = self.reap(running);
                return Err(fault);
            }
        };

        let outcomes = self.reap(running)?;
        if let Some(index) = last_running {
            if let Some(ProcessOutcome::Exited(code)) = outcomes.get(index) {
                status = *code;
            }
        }
        Ok(status)
    }

    /// Start every stage, returning the status of the last in-process one
    /// and which of `running` is the last stage, if it is a program
    fn start_stages(
        &mut self,
        commands: &[Command],
        cond: bool,
        running: &mut Vec<Spawned>,
    ) -> Flow<(u8, Option<usize>)> {
        let mut input = self.io.stdin.clone();
        let mut status = 0;
        let mut last_running = None;
        for (i, command) in commands.iter().enumerate() {
            let is_last = i + 1 == commands.len();
            let buffer = SharedBuffer::new();
            let mut stage = self.clone();
            stage.io.stdin = std::mem::replace(&mut input, Input::Null);
            if !is_last {
                stage.io.stdout = Output::Buffer(buffer.clone());
            }

            let prepared = match command {
                Command::Simple(simple) => {
                    stage.check_canceled()?;
                    stage.prepare_simple(simple)
                }
                Command::Compound(..) => stage.exec_command(command, cond).map(Stage::Finished),
            };
            let prepared = match prepared {
                Err(Stop::Exit(code)) => Stage::Finished(code),
                other => other?,
            };

            match prepared {
                Stage::Finished(code) => {
                    status = code;
                    if !is_last {
                        input = Input::bytes(buffer.contents());
                    }
                }
                Stage::External(mut external) => {
                    if !is_last {
                        let (reader, writer) = std::io::pipe().map_err(ShellError::from)?;
                        let pipe = Output::Pipe(Arc::new(writer));
                        if external.streams.stdout.is_buffer(&buffer) {
                            external.streams.stdout = pipe.clone();
                        }
                        if external.streams.stderr.is_buffer(&buffer) {
                            external.streams.stderr = pipe;
                        }
                        input = Input::Pipe(Arc::new(reader));
                    }
                    match stage.spawn_external(external)? {
                        Ok(spawned) => {
                            running.push(spawned);
                            last_running = is_last.then(|| running.len() - 1);
                        }
                        Err(code) => status = code,
                    }
                }
            }
        }
        Ok((status, last_running))
    }

    /// Wait for every pipeline program, failing if any was canceled
    fn reap(&self, running: Vec<Spawned>) -> Flow<Vec<ProcessOutcome>> {
        let mut outcomes = Vec::with_capacity(running.len());
        let mut error = None;
        for spawned in running {
            match spawned.wait(&self.cancel) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error.get_or_insert(e);
                    outcomes.push(ProcessOutcome::Canceled);
                }
            }
        }
        if let Some(e) = error {
            return Err(ShellError::from(e).into());
        }
        if outcomes.contains(&ProcessOutcome::Canceled) {
            return Err(ShellError::Canceled.into());
        }
        Ok(outcomes)
    }

    fn exec_command(&mut self, command: &Command, cond: bool) -> Flow<u8> {
        self.check_canceled()?;
        match command {
            Command::Simple(simple) => self.exec_simple(simple),
            Command::Compound(compound, redirects) => {
                let io = match self.redirect(redirects)? {
                    Some(io) => io,
                    None => return Ok(self.finish(1)),
                };
                let saved = std::mem::replace(&mut self.io, io);
                let result = self.exec_compound(compound, cond);
                self.io = saved;
                result
            }
        }
    }

    fn finish(&mut self, status: u8) -> u8 {
        self.last_status = status;
        status
    }

    fn exec_compound(&mut self, compound: &CompoundCommand, cond: bool) -> Flow<u8> {
        match compound {
            CompoundCommand::Subshell(body) => {
                let status = Interp::run_nested(self.clone(), body, cond)?;
                Ok(self.finish(status))
            }
            CompoundCommand::Group(body) => {
                self.exec_program(body, cond)?;
                Ok(self.last_status)
            }
            CompoundCommand::If {
                branches,
                otherwise,
            } => {
                for (test, body) in branches {
                    self.exec_program(test, true)?;
                    if self.last_status == 0 {
                        self.exec_program(body, cond)?;
                        return Ok(self.last_status);
                    }
                }
                match otherwise {
                    Some(body) => {
                        self.exec_program(body, cond)?;
                        Ok(self.last_status)
                    }
                    None => Ok(self.finish(0)),
                }
            }
            CompoundCommand::For { var, words, body } => {
                let items = match words {
                    Some(words) => expand_fields(self, words)?,
                    None => Vec::new(),
                };
                self.last_status = 0;
                for item in items {
                    self.check_canceled()?;
                    self.set_var(var, item);
                    self.exec_program(body, cond)?;
                }
                Ok(self.last_status)
            }
            CompoundCommand::While {
                until,
                cond: test,
                body,
            } => {
                let mut status = 0;
                loop {
                    self.check_canceled()?;
                    self.exec_program(test, true)?;
                    if (self.last_status == 0) == *until {
                        break;
                    }
                    self.exec_program(body, cond)?;
                    status = self.last_status;
                }
                Ok(self.finish(status))
            }
        }
    }

    fn exec_simple(&mut self, simple: &SimpleCommand) -> Flow<u8> {
        let status = match self.prepare_simple(simple)? {
            Stage::Finished(status) => status,
            Stage::External(external) => self.run_external(external)?,
        };
        Ok(self.finish(status))
    }

    /// Expand a simple command and run it unless it names an external program
    fn prepare_simple(&mut self, simple: &SimpleCommand) -> Flow<Stage> {
        let substitutions = self.substitutions;
        let fields = expand_fields(self, &simple.words)?;

        let (name, args) = match fields.split_first() {
            Some(split) => split,
            None => {
                for assign in &simple.assigns {
                    let value = expand_literal(self, &assign.value)?;
                    self.set_var(&assign.name, value);
                }
                if self.redirect(&simple.redirects)?.is_none() {
                    return Ok(Stage::Finished(1));
                }
                // the last command substitution decides the status, if any ran
                let status = if self.substitutions > substitutions {
                    self.last_status
                } else {
                    0
                };
                return Ok(Stage::Finished(status));
            }
        };

        let mut assigns = Vec::with_capacity(simple.assigns.len());
        for assign in &simple.assigns {
            assigns.push((assign.name.clone(), expand_literal(self, &assign.value)?));
        }

        trace!(command = %fields.join(" "), dir = %self.dir.display(), "exec");

        let streams = match self.redirect(&simple.redirects)? {
            Some(streams) => streams,
            None => return Ok(Stage::Finished(1)),
        };
        let saved = std::mem::replace(&mut self.io, streams);
        let result = builtins::run(self, name, args);
        let streams = std::mem::replace(&mut self.io, saved);
        if let Some(status) = result? {
            return Ok(Stage::Finished(status));
        }

        let mut env = self.exported_env();
        env.extend(assigns);
        let report = |message: String| -> Flow<()> {
            streams.stderr.write_all(message.as_bytes()).map_err(ShellError::from)?;
            Ok(())
        };
        let program = match self.lookup(name, &env) {
            Some(program) => program,
            None => {
                report(format!("{}: command not found\n", name))?;
                return Ok(Stage::Finished(127));
            }
        };
        if !self.dir.is_dir() {
            report(format!(
                "{}: working directory {} does not exist\n",
                name,
                self.dir.display()
            ))?;
            return Ok(Stage::Finished(1));
        }

        Ok(Stage::External(External {
            name: name.clone(),
            program,
            args: args.to_vec(),
            env,
            streams,
        }))
    }

    fn run_external(&mut self, external: External) -> Flow<u8> {
        match self.spawn_external(external)? {
            Ok(spawned) => match spawned.wait(&self.cancel).map_err(ShellError::from)? {
                ProcessOutcome::Exited(code) => Ok(code),
                ProcessOutcome::Canceled => Err(ShellError::Canceled.into()),
            },
            Err(code) => Ok(code),
        }
    }

    /// Start an external program, or report why it could not start
    fn spawn_external(&self, external: External) -> Flow<Result<Spawned, u8>> {
        let launch = Launch {
            program: external.program,
            args: &external.args,
            dir: &self.dir,
            env: &external.env,
            stdin: &external.streams.stdin,
            stdout: &external.streams.stdout,
            stderr: &external.streams.stderr,
        };
        let message = match spawn(launch, self.kill_timeout) {
            Ok(spawned) => return Ok(Ok(spawned)),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                format!("{}: permission denied\n", external.name)
            }
            Err(e) => format!("{}: {}\n", external.name, e),
        };
        external
            .streams
            .stderr
            .write_all(message.as_bytes())
            .map_err(ShellError::from)?;
        Ok(Err(126))
    }

    fn lookup(&self, name: &str, env: &HashMap<String, String>) -> Option<PathBuf> {
        if name.contains('/') || (cfg!(windows) && name.contains('\\')) {
            let path = self.dir.join(name);
            return path.is_file().then_some(path);
        }
        let path_var = env.get("PATH").cloned().unwrap_or_default();
        which::which_in(name, Some(path_var), &self.dir).ok()
    }

    /// Streams after applying `redirects`, or `None` if a target failed to open
    fn redirect(&mut self, redirects: &[Redirect]) -> Flow<Option<Streams>> {
        let mut streams = self.io.clone();
        for redirect in redirects {
            let target = expand_literal(self, &redirect.target)?;
            let opened = match redirect.op {
                RedirectOp::Read => io::open(&self.dir, &target, OpenFlags::read(), 0o644),
                RedirectOp::Write | RedirectOp::WriteAll => {
                    io::open(&self.dir, &target, OpenFlags::write(), 0o644)
                }
                RedirectOp::Append => io::open(&self.dir, &target, OpenFlags::append(), 0o644),
                RedirectOp::Dup => {
                    self.dup(&mut streams, redirect.fd, &target)?;
                    continue;
                }
            };
            let opened = match opened {
                Ok(opened) => opened,
                Err(e) => {
                    self.err(&format!("{}: {}\n", target, e))?;
                    return Ok(None);
                }
            };

            match (redirect.op, redirect.fd) {
                (RedirectOp::Read, 0) => streams.stdin = opened.into_input(),
                (RedirectOp::WriteAll, _) => {
                    streams.stdout = opened.into_output();
                    streams.stderr = streams.stdout.clone();
                }
                (_, 1) => streams.stdout = opened.into_output(),
                (_, 2) => streams.stderr = opened.into_output(),
                (_, fd) => {
                    return Err(ShellError::Unsupported(format!("redirecting file descriptor {}", fd)).into())
                }
            }
        }
        Ok(Some(streams))
    }

    fn dup(&self, streams: &mut Streams, fd: u32, target: &str) -> Flow<()> {
        let source = match target {
            "1" => streams.stdout.clone(),
            "2" => streams.stderr.clone(),
            "-" => Output::Null,
            "0" if fd == 0 => return Ok(()),
            _ => {
                return Err(ShellError::Unsupported(format!("duplicating file descriptor {}", target)).into())
            }
        };
        match fd {
            1 => streams.stdout = source,
            2 => streams.stderr = source,
            0 => streams.stdin = Input::Null,
            _ => {
                return Err(ShellError::Unsupported(format!("redirecting file descriptor {}", fd)).into())
            }
        }
        Ok(())
    }
}

impl ExpandEnv for Interp {
    fn get(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "$" => Some(std::process::id().to_string()),
            "#" => Some("0".to_string()),
            "@" | "*" => Some(String::new()),
            "-" => Some(if self.errexit { "e" } else { "" }.to_string()),
            _ => self.vars.get(name).cloned(),
        }
    }

    fn set(&mut self, name: &str, value: String) {
        self.set_var(name, value);
    }

    fn substitute(&mut self, program: &Program) -> ShellResult<String> {
        let buffer = SharedBuffer::new();
        let mut nested = self.clone();
        nested.io.stdout = Output::Buffer(buffer.clone());
        let status = match Interp::run_nested(nested, program, false) {
            Ok(status) => status,
            Err(Stop::Exit(code)) => code,
            Err(Stop::Fault(err)) => return Err(err),
        };
        self.last_status = status;
        self.substitutions += 1;

        let mut out = buffer.to_string_lossy();
        while out.ends_with('\n') {
            out.pop();
            if out.ends_with('\r') {
                out.pop();
            }
        }
        Ok(out)
    }

    fn glob_dir(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}
