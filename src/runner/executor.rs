//! Sequential task driver
//!
//! Runs tasks from an assembled catalog one command at a time: deps first,
//! then cmds, each rendered through the templater and handed to the shell.

use crate::error::{Result, TaskError, TaskfileError};
use crate::pathext;
use crate::runner::Context;
use crate::shell::{self, CommandRunner, Output, RunCommandOptions, SharedBuffer, ShellConfig};
use crate::taskfile::{self, Cmd, Task, Taskfile, Var, Vars};
use crate::templater::{FuncTable, Templater};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Runs tasks from one assembled taskfile
#[derive(Debug)]
pub struct Executor {
    taskfile: Taskfile,
    taskvars: Vars,
    commands: CommandRunner,
    funcs: Arc<FuncTable>,
    /// Output of dynamic variables, keyed by directory and script
    dynamic: RefCell<HashMap<(PathBuf, String), String>>,
    pub ctx: Context,
}

impl Executor {
    pub fn new(taskfile: Taskfile, taskvars: Vars, ctx: Context) -> Self {
        Executor {
            taskfile,
            taskvars,
            commands: CommandRunner::default(),
            funcs: Arc::new(FuncTable::standard()),
            dynamic: RefCell::new(HashMap::new()),
            ctx,
        }
    }

    /// Assemble the taskfile in `dir` and read its shared variables
    pub fn load(dir: &Path, ctx: Context) -> Result<Self> {
        let taskfile = taskfile::assemble(dir)?;
        let taskvars = taskfile::read_taskvars(dir)?;
        let ctx = ctx.with_working_dir(pathext::absolute(dir)?);
        Ok(Executor::new(taskfile, taskvars, ctx))
    }

    pub fn with_shell_config(mut self, config: ShellConfig) -> Self {
        self.commands = CommandRunner::new(config);
        self
    }

    pub fn taskfile(&self) -> &Taskfile {
        &self.taskfile
    }

    /// Tasks that may be called from the command line, in catalog order
    pub fn list_tasks(&self) -> Vec<(&str, &Task)> {
        self.taskfile
            .tasks
            .iter()
            .filter(|(_, task)| !task.internal)
            .map(|(name, task)| (name.as_str(), task))
            .collect()
    }

    /// Run a task requested by the user. Internal tasks are refused.
    pub fn run_task(&mut self, name: &str) -> Result<()> {
        let (_, task) = self
            .taskfile
            .find_task(name)
            .ok_or_else(|| TaskfileError::TaskNotFound(name.to_string()))?;
        if task.internal {
            return Err(TaskError::Internal(name.to_string()));
        }
        self.run_call(name, &Vars::new())
    }

    /// Run a task by name or alias with extra call variables
    pub fn run_call(&mut self, name: &str, call_vars: &Vars) -> Result<()> {
        let (full_name, task) = self
            .taskfile
            .find_task(name)
            .map(|(full_name, task)| (full_name.to_string(), task.clone()))
            .ok_or_else(|| TaskfileError::TaskNotFound(name.to_string()))?;

        if self.ctx.is_task_in_stack(&full_name) {
            return Err(TaskError::Recursion(full_name));
        }

        self.ctx.push_task(full_name.clone());
        self.ctx.print_task_start(&full_name);
        let result = self.execute(&full_name, &task, call_vars);
        self.ctx.pop_task();

        if result.is_ok() {
            self.ctx.print_task_complete(&full_name);
        }
        result
    }

    fn execute(&mut self, name: &str, task: &Task, call_vars: &Vars) -> Result<()> {
        let globals = self.resolve_vars(
            HashMap::new(),
            &[&self.taskvars, &self.taskfile.vars],
            &self.ctx.working_dir,
        )?;
        // task and call vars may run scripts, which belong in the task dir
        let vars_dir = self.task_dir(task, &globals)?;
        let vars = self.resolve_vars(globals, &[&task.vars, call_vars], &vars_dir)?;
        let funcs = Arc::clone(&self.funcs);
        let templater = Templater::new(&funcs, &vars);

        let dir = self.task_dir(task, &vars)?;
        let env = self.resolve_env(&templater, task)?;

        for dep in &task.deps {
            let dep_name = templater.render(&dep.task)?;
            self.run_call(&dep_name, &dep.vars)?;
        }

        for cmd in &task.cmds {
            match cmd {
                Cmd::Task { task: callee, vars } => {
                    let callee = templater.render(callee)?;
                    self.run_call(&callee, vars)?;
                }
                Cmd::Shell {
                    cmd,
                    silent,
                    ignore_error,
                } => {
                    let command = templater.render(cmd)?;
                    if !(*silent || task.silent || self.taskfile.silent) {
                        self.ctx.print_command(name, &command);
                    }
                    trace!(task = name, dir = %dir.display(), "running command");

                    let opts = RunCommandOptions::new(command)
                        .with_dir(&dir)
                        .with_env(env.clone())
                        .with_stdin(self.ctx.stdin.clone())
                        .with_stdout(self.ctx.stdout.clone())
                        .with_stderr(self.ctx.stderr.clone())
                        .with_cancel(self.ctx.cancel.clone());
                    let status = self.commands.run(opts)?;

                    if let Err(err) = status.into_result() {
                        if *ignore_error || task.ignore_error {
                            self.ctx
                                .print_warning(&format!("[{}] command failed with {}, ignoring", name, err));
                            continue;
                        }
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(())
    }

    fn task_dir(&self, task: &Task, vars: &HashMap<String, String>) -> Result<PathBuf> {
        Ok(match &task.dir {
            Some(dir) => {
                let rendered = Templater::new(&self.funcs, vars).render(dir)?;
                pathext::smart_join(&self.ctx.working_dir, &rendered)
            }
            None => self.ctx.working_dir.clone(),
        })
    }

    /// Resolve variable layers on top of `resolved`, in order; later layers
    /// see and override earlier ones. Dynamic variables run in `dir`.
    fn resolve_vars(
        &self,
        mut resolved: HashMap<String, String>,
        layers: &[&Vars],
        dir: &Path,
    ) -> Result<HashMap<String, String>> {
        for layer in layers {
            for (name, var) in layer.iter() {
                let value = {
                    let templater = Templater::new(&self.funcs, &resolved);
                    self.evaluate(var, &templater, dir)?
                };
                resolved.insert(name.to_string(), value);
            }
        }
        Ok(resolved)
    }

    /// Process environment, then taskfile env, then task env
    fn resolve_env(&self, templater: &Templater, task: &Task) -> Result<HashMap<String, String>> {
        let mut env = shell::env_snapshot();
        for layer in [&self.taskfile.env, &task.env] {
            for (name, var) in layer.iter() {
                let value = self.evaluate(var, templater, &self.ctx.working_dir)?;
                env.insert(name.to_string(), value);
            }
        }
        Ok(env)
    }

    fn evaluate(&self, var: &Var, templater: &Templater, dir: &Path) -> Result<String> {
        match var {
            Var::Static(value) => Ok(templater.render(value)?),
            Var::Dynamic { sh } => {
                let script = templater.render(sh)?;
                self.dynamic_value(script, dir)
            }
        }
    }

    /// Stdout of a dynamic variable's script with trailing newlines removed
    fn dynamic_value(&self, script: String, dir: &Path) -> Result<String> {
        let key = (dir.to_path_buf(), script);
        if let Some(value) = self.dynamic.borrow().get(&key) {
            return Ok(value.clone());
        }

        debug!(script = %key.1, "evaluating dynamic variable");
        let out = SharedBuffer::new();
        let opts = RunCommandOptions::new(key.1.clone())
            .with_dir(dir)
            .with_stdout(Output::Buffer(out.clone()))
            .with_stderr(self.ctx.stderr.clone())
            .with_cancel(self.ctx.cancel.clone());
        self.commands.run(opts)?.into_result()?;

        let value = out.to_string_lossy().trim_end_matches(['\r', '\n']).to_string();
        self.dynamic.borrow_mut().insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;
    use crate::runner::Verbosity;
    use crate::shell::Input;
    use std::fs;
    use tempfile::TempDir;

    fn executor(yaml: &str) -> (TempDir, Executor, SharedBuffer) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("Taskfile.yml"), yaml).unwrap();
        let out = SharedBuffer::new();
        let ctx = Context::new()
            .with_verbosity(Verbosity::Silent)
            .with_stdin(Input::Null)
            .with_output(Output::Buffer(out.clone()), Output::Null);
        let executor = Executor::load(temp_dir.path(), ctx).unwrap();
        (temp_dir, executor, out)
    }

    #[test]
    fn test_deps_run_before_cmds() {
        let (_dir, mut executor, out) = executor(
            r#"
tasks:
  build:
    deps: [prepare]
    cmds:
      - echo build
      - task: finish
  prepare: echo prepare
  finish: echo finish
"#,
        );
        executor.run_task("build").unwrap();
        assert_eq!(out.to_string_lossy(), "prepare\nbuild\nfinish\n");
    }

    #[test]
    fn test_variable_layers() {
        let (dir, mut executor, out) = executor(
            r#"
vars:
  GREETING: hello
  TARGET: world
tasks:
  greet:
    vars:
      TARGET: "{{.GREETING}} there"
      USER: {sh: "echo dynamic"}
    cmds:
      - echo "{{.TARGET}} {{.USER}} {{.SHARED}}"
"#,
        );
        fs::write(dir.path().join("Taskvars.yml"), "SHARED: common\n").unwrap();
        executor.taskvars = taskfile::read_taskvars(dir.path()).unwrap();

        executor.run_task("greet").unwrap();
        assert_eq!(out.to_string_lossy(), "hello there dynamic common\n");
    }

    #[test]
    fn test_call_vars_override_task_vars() {
        let (_dir, mut executor, out) = executor(
            r#"
tasks:
  outer:
    cmds:
      - task: inner
        vars: {NAME: caller}
  inner:
    vars: {NAME: own}
    cmds: ["echo {{.NAME}}"]
"#,
        );
        executor.run_task("outer").unwrap();
        assert_eq!(out.to_string_lossy(), "caller\n");
    }

    #[test]
    fn test_env_and_dir() {
        let (dir, mut executor, out) = executor(
            r#"
env:
  LEVEL: file
tasks:
  show:
    dir: sub
    env:
      EXTRA: "task-{{OS}}"
    cmds:
      - mkdir -p .
      - echo "$LEVEL $EXTRA"
      - pwd
"#,
        );
        executor.run_task("show").unwrap();
        let expected_dir = pathext::absolute(&dir.path().join("sub")).unwrap();
        assert_eq!(
            out.to_string_lossy(),
            format!("file task-{}\n{}\n", std::env::consts::OS, expected_dir.display())
        );
        assert!(dir.path().join("sub").is_dir());
    }

    #[test]
    fn test_dynamic_vars_run_in_their_dir() {
        let (dir, mut executor, out) = executor(
            r#"
vars:
  ROOT: {sh: pwd}
tasks:
  here:
    dir: sub
    vars:
      HERE: {sh: pwd}
    cmds:
      - echo "{{.ROOT}} {{.HERE}}"
"#,
        );
        fs::create_dir(dir.path().join("sub")).unwrap();
        executor.run_task("here").unwrap();
        let root = pathext::absolute(dir.path()).unwrap();
        assert_eq!(
            out.to_string_lossy(),
            format!("{} {}\n", root.display(), root.join("sub").display())
        );
    }

    #[test]
    fn test_failing_command_stops_task() {
        let (_dir, mut executor, out) = executor(
            "tasks:\n  fail:\n    cmds:\n      - exit 3\n      - echo unreachable\n",
        );
        let err = executor.run_task("fail").unwrap_err();
        assert!(matches!(err, TaskError::Shell(ShellError::Exit(3))));
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(out.to_string_lossy(), "");
    }

    #[test]
    fn test_ignore_error() {
        let (_dir, mut executor, out) = executor(
            r#"
tasks:
  lenient:
    cmds:
      - cmd: "false"
        ignore_error: true
      - echo after
"#,
        );
        executor.run_task("lenient").unwrap();
        assert_eq!(out.to_string_lossy(), "after\n");
    }

    #[test]
    fn test_recursion_is_rejected() {
        let (_dir, mut executor, _out) = executor("tasks:\n  a:\n    deps: [b]\n  b:\n    deps: [a]\n");
        assert!(matches!(executor.run_task("a"), Err(TaskError::Recursion(name)) if name == "a"));
        assert!(executor.ctx.task_stack.is_empty());
    }

    #[test]
    fn test_unknown_and_internal_tasks() {
        let (_dir, mut executor, _out) = executor(
            "tasks:\n  hidden:\n    internal: true\n    cmds: [echo hidden]\n  caller:\n    cmds: [{task: hidden}]\n",
        );
        assert!(matches!(
            executor.run_task("nope"),
            Err(TaskError::Taskfile(TaskfileError::TaskNotFound(_)))
        ));
        assert!(matches!(executor.run_task("hidden"), Err(TaskError::Internal(_))));
        executor.run_task("caller").unwrap();

        let listed: Vec<&str> = executor.list_tasks().into_iter().map(|(name, _)| name).collect();
        assert_eq!(listed, vec!["caller"]);
    }

    #[test]
    fn test_aliases_resolve() {
        let (_dir, mut executor, out) = executor("tasks:\n  build:\n    aliases: [b]\n    cmds: [echo built]\n");
        executor.run_task("b").unwrap();
        assert_eq!(out.to_string_lossy(), "built\n");
    }
}
