//! Integration tests for taskfile loading and include resolution

mod common;

use common::{create_taskfile, write_file};
use std::path::PathBuf;
use taskfile::taskfile::{assemble, load_catalog, read_taskfile, read_taskvars, IncludedTaskfile, Task, Var};

#[test]
fn test_includes_decode_in_declared_order() {
    let temp_dir = create_taskfile(
        r#"
includes:
  a: ./sub/Taskfile.yml
  b:
    taskfile: ./other
    dir: ./otherdir
    optional: true
tasks: {}
"#,
    );
    let taskfile = read_taskfile(temp_dir.path()).unwrap();
    assert_eq!(taskfile.includes.keys(), ["a".to_string(), "b".to_string()]);

    let a = taskfile.includes.get("a").unwrap();
    assert!(!a.advanced_import);
    let b = taskfile.includes.get("b").unwrap();
    assert!(b.advanced_import);
    assert!(b.optional);
    assert_eq!(
        a.full_taskfile_path().unwrap(),
        temp_dir.path().join("sub").join("Taskfile.yml")
    );
}

#[cfg(unix)]
#[test]
fn test_full_path_against_base_dir() {
    let include = IncludedTaskfile::new("./sub/Taskfile.yml", "/proj");
    assert_eq!(include.full_taskfile_path().unwrap(), PathBuf::from("/proj/sub/Taskfile.yml"));

    let include = IncludedTaskfile::new("/elsewhere/Taskfile.yml", "/proj");
    assert_eq!(
        include.full_taskfile_path().unwrap(),
        PathBuf::from("/elsewhere/Taskfile.yml")
    );
}

#[test]
fn test_overlay_replaces_only_matching_tasks() {
    let temp_dir = create_taskfile("tasks:\n  build: echo base\n  lint: echo lint\n");
    let root = temp_dir.path().join("Taskfile");
    let base = load_catalog(&root).unwrap();

    write_file(
        temp_dir.path(),
        &format!("Taskfile_{}.json", std::env::consts::OS),
        r#"{"tasks": {"build": "echo native"}}"#,
    );
    let merged = load_catalog(&root).unwrap();
    assert_eq!(merged.tasks["build"], Task::from_command("echo native"));
    assert_eq!(merged.tasks["lint"], base.tasks["lint"]);
    let names: Vec<&String> = merged.tasks.keys().collect();
    assert_eq!(names, vec!["build", "lint"]);
}

#[test]
fn test_shared_vars_follow_search_order() {
    let temp_dir = create_taskfile("tasks: {}\n");
    write_file(temp_dir.path(), "Taskvars.json", r#"{"FROM": "json"}"#);
    write_file(temp_dir.path(), "Taskvars.toml", "FROM = \"toml\"\n");
    let vars = read_taskvars(temp_dir.path()).unwrap();
    assert_eq!(vars.get("FROM"), Some(&Var::new("json")));
}

#[test]
fn test_assemble_nested_catalog() {
    let temp_dir = create_taskfile(
        r#"
includes:
  web: ./web
  tools:
    taskfile: ./tools/Tools.toml
    internal: true
tasks:
  default:
    deps: ["web:build"]
"#,
    );
    write_file(
        temp_dir.path(),
        "web/Taskfile.yml",
        "includes:\n  assets: ./assets\ntasks:\n  build:\n    deps: [assets:bundle]\n    cmds: [echo web]\n",
    );
    write_file(temp_dir.path(), "web/assets/Taskfile.json", r#"{"tasks": {"bundle": "echo bundle"}}"#);
    write_file(temp_dir.path(), "tools/Tools.toml", "[tasks]\nfmt = \"echo fmt\"\n");

    let catalog = assemble(temp_dir.path()).unwrap();
    let names: Vec<&String> = catalog.tasks.keys().collect();
    assert_eq!(names, vec!["default", "web:build", "web:assets:bundle", "tools:fmt"]);
    assert_eq!(catalog.tasks["web:build"].deps[0].task, "web:assets:bundle");
    assert!(catalog.tasks["tools:fmt"].internal);
    assert!(!catalog.tasks["web:build"].internal);
}

#[test]
fn test_assemble_without_taskfile() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let err = assemble(temp_dir.path()).unwrap_err();
    assert!(err.is_not_found());
}
