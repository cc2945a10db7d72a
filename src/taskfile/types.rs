//! Core taskfile types
//!
//! This module defines the data structures a Taskfile document decodes into.
//! Every type here decodes the same way from YAML, JSON and TOML.

use crate::taskfile::included::IncludedTaskfiles;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

/// Task name to task definition, in declaration order
pub type TaskCatalog = IndexMap<String, Task>;

/// A Taskfile document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Taskfile {
    /// Schema version (informational)
    #[serde(deserialize_with = "deserialize_scalar")]
    pub version: Option<String>,

    /// Other taskfiles pulled in as namespaced sub-catalogs
    pub includes: IncludedTaskfiles,

    /// Variables shared by every task in this file
    pub vars: Vars,

    /// Environment shared by every task in this file
    pub env: Vars,

    /// Don't echo commands before running them
    pub silent: bool,

    #[serde(deserialize_with = "deserialize_tasks")]
    pub tasks: TaskCatalog,
}

impl Taskfile {
    /// Apply a platform overlay on top of this document.
    ///
    /// Tasks, vars and env are overwritten key by key; keys the overlay does
    /// not mention keep their base value and position. Overlay includes are
    /// merged into the registry.
    pub fn merge_overlay(&mut self, overlay: Taskfile) {
        if overlay.version.is_some() {
            self.version = overlay.version;
        }
        self.includes.merge(&overlay.includes);
        self.vars.merge(&overlay.vars);
        self.env.merge(&overlay.env);
        self.silent |= overlay.silent;
        for (name, task) in overlay.tasks {
            self.tasks.insert(name, task);
        }
    }

    /// Look a task up by name or alias
    pub fn find_task(&self, name: &str) -> Option<(&str, &Task)> {
        if let Some((key, task)) = self.tasks.get_key_value(name) {
            return Some((key.as_str(), task));
        }
        self.tasks
            .iter()
            .find(|(_, task)| task.aliases.iter().any(|alias| alias == name))
            .map(|(key, task)| (key.as_str(), task))
    }
}

/// A task definition
///
/// Decodes from a single command string, a list of commands, or a mapping.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Task {
    /// One-line description shown by `--list`
    pub desc: Option<String>,

    pub summary: Option<String>,

    /// Alternative names for this task
    pub aliases: Vec<String>,

    /// Commands to execute, in order
    pub cmds: Vec<Cmd>,

    /// Tasks to run before this one
    pub deps: Vec<Dep>,

    /// Working directory, relative to the root taskfile's directory
    pub dir: Option<String>,

    pub vars: Vars,

    pub env: Vars,

    /// Source files for up-to-date checks
    pub sources: Vec<String>,

    /// Generated files for up-to-date checks
    pub generates: Vec<String>,

    /// Commands that decide whether the task is up to date
    pub status: Vec<String>,

    pub silent: bool,

    /// Hidden from `--list` and not callable from the command line
    pub internal: bool,

    /// Keep going when a command exits nonzero
    pub ignore_error: bool,
}

impl Task {
    /// A task running one shell command
    pub fn from_command(cmd: impl Into<String>) -> Self {
        Task {
            cmds: vec![Cmd::shell(cmd)],
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskForm {
    Command(String),
    Commands(Vec<Cmd>),
    Full(Box<Task>),
}

impl From<TaskForm> for Task {
    fn from(form: TaskForm) -> Self {
        match form {
            TaskForm::Command(cmd) => Task::from_command(cmd),
            TaskForm::Commands(cmds) => Task {
                cmds,
                ..Default::default()
            },
            TaskForm::Full(task) => *task,
        }
    }
}

/// Custom deserializer for the task map that accepts every task form
fn deserialize_tasks<'de, D>(deserializer: D) -> Result<TaskCatalog, D::Error>
where
    D: Deserializer<'de>,
{
    let forms = Option::<IndexMap<String, TaskForm>>::deserialize(deserializer)?;
    Ok(forms
        .unwrap_or_default()
        .into_iter()
        .map(|(name, form)| (name, form.into()))
        .collect())
}

/// One step of a task
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "CmdForm")]
pub enum Cmd {
    /// A shell command
    Shell {
        cmd: String,
        silent: bool,
        ignore_error: bool,
    },
    /// A call to another task
    Task { task: String, vars: Vars },
}

impl Cmd {
    pub fn shell(cmd: impl Into<String>) -> Self {
        Cmd::Shell {
            cmd: cmd.into(),
            silent: false,
            ignore_error: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CmdForm {
    Short(String),
    Call {
        task: String,
        #[serde(default)]
        vars: Vars,
    },
    Shell {
        cmd: String,
        #[serde(default)]
        silent: bool,
        #[serde(default)]
        ignore_error: bool,
    },
}

impl From<CmdForm> for Cmd {
    fn from(form: CmdForm) -> Self {
        match form {
            CmdForm::Short(cmd) => Cmd::shell(cmd),
            CmdForm::Call { task, vars } => Cmd::Task { task, vars },
            CmdForm::Shell {
                cmd,
                silent,
                ignore_error,
            } => Cmd::Shell {
                cmd,
                silent,
                ignore_error,
            },
        }
    }
}

/// A dependency on another task
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "DepForm")]
pub struct Dep {
    pub task: String,
    pub vars: Vars,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DepForm {
    Short(String),
    Full {
        task: String,
        #[serde(default)]
        vars: Vars,
    },
}

impl From<DepForm> for Dep {
    fn from(form: DepForm) -> Self {
        match form {
            DepForm::Short(task) => Dep {
                task,
                vars: Vars::default(),
            },
            DepForm::Full { task, vars } => Dep { task, vars },
        }
    }
}

/// A variable value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "VarForm")]
pub enum Var {
    Static(String),
    /// Value is the trimmed output of a shell command
    Dynamic { sh: String },
}

impl Var {
    pub fn new(value: impl Into<String>) -> Self {
        Var::Static(value.into())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VarForm {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Dynamic { sh: String },
}

impl From<VarForm> for Var {
    fn from(form: VarForm) -> Self {
        match form {
            VarForm::Str(s) => Var::Static(s),
            VarForm::Bool(b) => Var::Static(b.to_string()),
            VarForm::Int(i) => Var::Static(i.to_string()),
            VarForm::Float(f) => Var::Static(f.to_string()),
            VarForm::Dynamic { sh } => Var::Dynamic { sh },
        }
    }
}

/// An ordered variable set
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Vars(#[serde(deserialize_with = "deserialize_vars")] IndexMap<String, Var>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Var> {
        self.0.get(name)
    }

    /// Set a variable; an existing name keeps its position
    pub fn set(&mut self, name: impl Into<String>, value: Var) {
        self.0.insert(name.into(), value);
    }

    /// Overwrite with every entry of `other`, in `other`'s order
    pub fn merge(&mut self, other: &Vars) {
        for (name, value) in other.iter() {
            self.set(name, value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Var)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Var)>>(iter: I) -> Self {
        Vars(iter.into_iter().collect())
    }
}

/// `vars:` with no entries decodes as an empty set
fn deserialize_vars<'de, D>(deserializer: D) -> Result<IndexMap<String, Var>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IndexMap<String, Var>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A scalar that may be written as a string or a number
fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Var>::deserialize(deserializer)? {
        Some(Var::Static(value)) => Ok(Some(value)),
        Some(Var::Dynamic { .. }) => Err(serde::de::Error::custom("expected a scalar")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_task_forms() {
        let yaml = r#"
version: 3
tasks:
  short: echo short
  list:
    - echo one
    - task: short
  full:
    desc: Full task
    aliases: [f]
    deps: [short, {task: list, vars: {X: 1}}]
    cmds:
      - cmd: echo full
        silent: true
    ignore_error: true
"#;
        let taskfile: Taskfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(taskfile.version.as_deref(), Some("3"));
        let names: Vec<&str> = taskfile.tasks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["short", "list", "full"]);

        assert_eq!(taskfile.tasks["short"].cmds, vec![Cmd::shell("echo short")]);
        assert_eq!(
            taskfile.tasks["list"].cmds[1],
            Cmd::Task {
                task: "short".to_string(),
                vars: Vars::new()
            }
        );

        let full = &taskfile.tasks["full"];
        assert_eq!(full.desc.as_deref(), Some("Full task"));
        assert!(full.ignore_error);
        assert_eq!(full.deps[0].task, "short");
        assert_eq!(full.deps[1].vars.get("X"), Some(&Var::new("1")));
        assert!(matches!(&full.cmds[0], Cmd::Shell { silent: true, .. }));
    }

    #[test]
    fn test_find_task_by_alias() {
        let yaml = r#"
tasks:
  build:
    aliases: [b]
    cmds: [echo build]
"#;
        let taskfile: Taskfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(taskfile.find_task("b").map(|(name, _)| name), Some("build"));
        assert!(taskfile.find_task("missing").is_none());
    }

    #[test]
    fn test_vars_keep_order_and_types() {
        let yaml = r#"
Z: last
A: true
N: 42
F: 1.5
D: {sh: echo dynamic}
"#;
        let vars: Vars = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = vars.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Z", "A", "N", "F", "D"]);
        assert_eq!(vars.get("A"), Some(&Var::new("true")));
        assert_eq!(vars.get("N"), Some(&Var::new("42")));
        assert_eq!(vars.get("F"), Some(&Var::new("1.5")));
        assert_eq!(
            vars.get("D"),
            Some(&Var::Dynamic {
                sh: "echo dynamic".to_string()
            })
        );
    }

    #[test]
    fn test_same_document_in_json_and_toml() {
        let json = r#"{"tasks": {"hello": {"cmds": ["echo hi"]}, "bye": "echo bye"}}"#;
        let from_json: Taskfile = serde_json::from_str(json).unwrap();

        let toml_src = r#"
[tasks]
bye = "echo bye"

[tasks.hello]
cmds = ["echo hi"]
"#;
        let from_toml: Taskfile = toml::from_str(toml_src).unwrap();
        assert_eq!(from_json.tasks["hello"], from_toml.tasks["hello"]);
        assert_eq!(from_json.tasks["bye"], from_toml.tasks["bye"]);
    }

    #[test]
    fn test_merge_overlay_is_shallow() {
        let base: Taskfile = serde_yaml::from_str(
            r#"
vars: {A: base, B: base}
tasks:
  one: echo one
  two:
    desc: base two
    cmds: [echo two]
"#,
        )
        .unwrap();
        let overlay: Taskfile = serde_yaml::from_str(
            r#"
vars: {B: overlay}
tasks:
  two: echo overlay
  three: echo three
"#,
        )
        .unwrap();

        let mut merged = base.clone();
        merged.merge_overlay(overlay);
        let names: Vec<&str> = merged.tasks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert_eq!(merged.tasks["one"], base.tasks["one"]);
        assert_eq!(merged.tasks["two"], Task::from_command("echo overlay"));
        assert_eq!(merged.tasks["two"].desc, None);
        assert_eq!(merged.vars.get("A"), Some(&Var::new("base")));
        assert_eq!(merged.vars.get("B"), Some(&Var::new("overlay")));
    }
}
