//! Recursive include resolution
//!
//! Builds one flat catalog from a root taskfile: every include is loaded,
//! itself assembled, and its tasks renamed into the include's namespace.

use crate::error::{TaskfileError, TaskfileResult};
use crate::pathext;
use crate::taskfile::included::IncludedTaskfile;
use crate::taskfile::read::{self, Format, TASKFILE};
use crate::taskfile::types::{Cmd, Task, Taskfile};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Separator between an include namespace and a task name
pub const NAMESPACE_SEPARATOR: &str = ":";

/// Name of the task run when none is given
pub const DEFAULT_TASK: &str = "default";

/// Load the taskfile in `dir` and flatten all of its includes
pub fn assemble(dir: &Path) -> TaskfileResult<Taskfile> {
    let root = dir.join(TASKFILE);
    let file = read::locate(&root).ok_or_else(|| TaskfileError::NotFound { base: root.clone() })?;

    let mut assembler = Assembler::default();
    let mut taskfile = assembler.load(&file, || read::load_catalog(&root))?;
    for task in taskfile.tasks.values_mut() {
        rewrite_refs(task, |name| name.trim_start_matches(NAMESPACE_SEPARATOR).to_string());
    }
    Ok(taskfile)
}

#[derive(Default)]
struct Assembler {
    /// Canonical paths of the taskfiles currently being assembled
    stack: Vec<PathBuf>,
}

impl Assembler {
    fn load(
        &mut self,
        file: &Path,
        read: impl FnOnce() -> TaskfileResult<Taskfile>,
    ) -> TaskfileResult<Taskfile> {
        let canonical = fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        if self.stack.contains(&canonical) {
            let mut chain: Vec<String> = self.stack.iter().map(|p| p.display().to_string()).collect();
            chain.push(canonical.display().to_string());
            return Err(TaskfileError::IncludeCycle(chain.join(" -> ")));
        }

        self.stack.push(canonical);
        let result = read().and_then(|taskfile| self.flatten(taskfile));
        self.stack.pop();
        result
    }

    fn flatten(&mut self, mut taskfile: Taskfile) -> TaskfileResult<Taskfile> {
        let includes = taskfile.includes.clone();
        for (key, include) in includes.iter() {
            let path = include.full_taskfile_path()?;
            let Some((file, base)) = resolve_include(&path) else {
                if include.optional {
                    warn!(include = key, path = %path.display(), "optional include not found, skipping");
                    continue;
                }
                return Err(TaskfileError::NotFound { base: path });
            };

            debug!(include = key, file = %file.display(), "including");
            let included = self.load(&file, || match base {
                Some(base) => read::load_catalog(&base),
                None => read::load_file(&file),
            })?;
            merge_include(&mut taskfile, key, include, included)?;
        }
        Ok(taskfile)
    }
}

/// The file an include path names, plus the logical base to load it from
/// (`None` when the path names the file directly)
fn resolve_include(path: &Path) -> Option<(PathBuf, Option<PathBuf>)> {
    if path.is_dir() {
        let base = path.join(TASKFILE);
        return read::locate(&base).map(|file| (file, Some(base)));
    }
    if Format::from_path(path).is_some() && path.is_file() {
        return Some((path.to_path_buf(), None));
    }
    read::locate(path).map(|file| (file, Some(path.to_path_buf())))
}

fn merge_include(
    taskfile: &mut Taskfile,
    key: &str,
    include: &IncludedTaskfile,
    mut included: Taskfile,
) -> TaskfileResult<()> {
    if let Some(vars) = &include.vars {
        included.vars.merge(vars);
    }
    let dir = if include.dir.is_empty() {
        None
    } else {
        Some(include.full_dir_path()?)
    };

    let mut prefixes = vec![key.to_string()];
    prefixes.extend(include.aliases.iter().cloned());

    for (name, mut task) in included.tasks {
        let mut vars = included.vars.clone();
        vars.merge(&task.vars);
        task.vars = vars;

        if include.internal {
            task.internal = true;
        }
        if let Some(dir) = &dir {
            let joined = match &task.dir {
                Some(task_dir) => pathext::clean(&pathext::smart_join(dir, task_dir)),
                None => dir.clone(),
            };
            task.dir = Some(joined.to_string_lossy().into_owned());
        }
        rewrite_refs(&mut task, |target| namespaced(key, target));

        let mut aliases = Vec::new();
        for prefix in &prefixes {
            if prefix != key {
                aliases.push(namespaced(prefix, &name));
            }
            for alias in &task.aliases {
                aliases.push(namespaced(prefix, alias));
            }
            if name == DEFAULT_TASK {
                aliases.push(prefix.clone());
            }
        }
        task.aliases = aliases;

        let full_name = namespaced(key, &name);
        if taskfile.tasks.contains_key(&full_name) {
            return Err(TaskfileError::TaskNameConflict {
                task: full_name,
                include: key.to_string(),
            });
        }
        taskfile.tasks.insert(full_name, task);
    }
    Ok(())
}

/// `key:name`, leaving root references (`:name`) alone
fn namespaced(key: &str, name: &str) -> String {
    if name.starts_with(NAMESPACE_SEPARATOR) {
        name.to_string()
    } else {
        format!("{}{}{}", key, NAMESPACE_SEPARATOR, name)
    }
}

fn rewrite_refs(task: &mut Task, rename: impl Fn(&str) -> String) {
    for cmd in &mut task.cmds {
        if let Cmd::Task { task, .. } = cmd {
            *task = rename(task);
        }
    }
    for dep in &mut task.deps {
        dep.task = rename(&dep.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taskfile::types::{Dep, Var};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn names(taskfile: &Taskfile) -> Vec<&str> {
        taskfile.tasks.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_include_namespaces_tasks() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Taskfile.yml",
            "includes:\n  docs: ./docs\ntasks:\n  build: echo build\n",
        );
        write(
            temp_dir.path(),
            "docs/Taskfile.yml",
            r#"
vars: {FORMAT: html}
tasks:
  default:
    deps: [render]
    cmds: [{task: ":build"}]
  render:
    aliases: [r]
    vars: {FORMAT: pdf}
    cmds: [echo render]
"#,
        );

        let taskfile = assemble(temp_dir.path()).unwrap();
        assert_eq!(names(&taskfile), vec!["build", "docs:default", "docs:render"]);

        let default = &taskfile.tasks["docs:default"];
        assert_eq!(default.deps[0].task, "docs:render");
        assert!(matches!(&default.cmds[0], Cmd::Task { task, .. } if task == "build"));
        assert!(default.aliases.contains(&"docs".to_string()));
        assert_eq!(default.vars.get("FORMAT"), Some(&Var::new("html")));

        let render = &taskfile.tasks["docs:render"];
        assert_eq!(render.aliases, vec!["docs:r".to_string()]);
        assert_eq!(render.vars.get("FORMAT"), Some(&Var::new("pdf")));
        assert_eq!(taskfile.find_task("docs").map(|(name, _)| name), Some("docs:default"));
    }

    #[test]
    fn test_include_options() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Taskfile.yml",
            r#"
includes:
  lib:
    taskfile: ./lib/Tasks.yml
    dir: ./lib
    internal: true
    aliases: [l]
    vars: {MODE: release}
  extra:
    taskfile: ./missing
    optional: true
"#,
        );
        write(
            temp_dir.path(),
            "lib/Tasks.yml",
            "vars: {MODE: debug}\ntasks:\n  compile:\n    dir: out\n    cmds: [echo $MODE]\n",
        );

        let taskfile = assemble(temp_dir.path()).unwrap();
        assert_eq!(names(&taskfile), vec!["lib:compile"]);
        let compile = &taskfile.tasks["lib:compile"];
        assert!(compile.internal);
        assert_eq!(compile.vars.get("MODE"), Some(&Var::new("release")));
        assert_eq!(compile.aliases, vec!["l:compile".to_string()]);

        let expected = pathext::absolute(&temp_dir.path().join("lib").join("out")).unwrap();
        assert_eq!(compile.dir.as_deref().map(PathBuf::from), Some(expected));
    }

    #[test]
    fn test_missing_required_include() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Taskfile.yml", "includes:\n  gone: ./gone\n");
        assert!(assemble(temp_dir.path()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_nested_includes_resolve_against_parent() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Taskfile.yml", "includes:\n  a: ./a\n");
        write(temp_dir.path(), "a/Taskfile.yml", "includes:\n  b: ./b\ntasks:\n  one: echo one\n");
        write(temp_dir.path(), "a/b/Taskfile.json", r#"{"tasks": {"two": {"deps": ["three"]}, "three": "echo 3"}}"#);

        let taskfile = assemble(temp_dir.path()).unwrap();
        assert_eq!(names(&taskfile), vec!["a:one", "a:b:two", "a:b:three"]);
        assert_eq!(
            taskfile.tasks["a:b:two"].deps,
            vec![Dep {
                task: "a:b:three".to_string(),
                vars: Default::default()
            }]
        );
    }

    #[test]
    fn test_include_cycle_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Taskfile.yml", "includes:\n  a: ./a\n");
        write(temp_dir.path(), "a/Taskfile.yml", "includes:\n  back: ..\n");
        assert!(matches!(
            assemble(temp_dir.path()),
            Err(TaskfileError::IncludeCycle(_))
        ));
    }

    #[test]
    fn test_diamond_include_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Taskfile.yml", "includes:\n  x: ./shared\n  y: ./shared\n");
        write(temp_dir.path(), "shared/Taskfile.yml", "tasks:\n  hi: echo hi\n");
        let taskfile = assemble(temp_dir.path()).unwrap();
        assert_eq!(names(&taskfile), vec!["x:hi", "y:hi"]);
    }

    #[test]
    fn test_name_conflict() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Taskfile.yml",
            "includes:\n  a: ./a\ntasks:\n  \"a:x\": echo root\n",
        );
        write(temp_dir.path(), "a/Taskfile.yml", "tasks:\n  x: echo included\n");
        assert!(matches!(
            assemble(temp_dir.path()),
            Err(TaskfileError::TaskNameConflict { .. })
        ));
    }
}
