//! Integration tests for the shell runner

use std::collections::HashMap;
use taskfile::shell::{self, Input, Output, SharedBuffer};
use taskfile::{run_command, RunCommandOptions, ShellError, ShellStatus};
use tempfile::TempDir;

fn run(script: &str, opts: impl FnOnce(RunCommandOptions) -> RunCommandOptions) -> (Result<ShellStatus, ShellError>, String) {
    let temp_dir = TempDir::new().unwrap();
    let stdout = SharedBuffer::new();
    let base = RunCommandOptions::new(script)
        .with_dir(temp_dir.path())
        .with_stdout(Output::Buffer(stdout.clone()))
        .with_stderr(Output::Null);
    let result = run_command(opts(base));
    (result, stdout.to_string_lossy())
}

#[test]
fn test_echo_hello() {
    let (result, out) = run("echo hello", |opts| opts);
    assert_eq!(result.unwrap(), ShellStatus(0));
    assert_eq!(out, "hello\n");
}

#[test]
fn test_nonzero_exit_is_an_outcome() {
    let (result, _) = run("exit 3", |opts| opts);
    let status = result.unwrap();
    assert_eq!(status.code(), 3);
    assert!(shell::is_exit_error(&status.into_result().unwrap_err()));
}

#[cfg(unix)]
#[test]
fn test_cat_discard_device() {
    let (result, out) = run("cat /dev/null; cat < /dev/null", |opts| opts);
    assert_eq!(result.unwrap(), ShellStatus(0));
    assert_eq!(out, "");
}

#[test]
fn test_parse_failure_is_not_an_exit() {
    let (result, out) = run("echo hi; if true; then", |opts| opts);
    let err = result.unwrap_err();
    assert!(!shell::is_exit_error(&err));
    assert_eq!(out, "");
}

#[test]
fn test_env_overlay_and_substitution() {
    let env = HashMap::from([
        ("GREETING".to_string(), "hi".to_string()),
        ("PATH".to_string(), std::env::var("PATH").unwrap_or_default()),
    ]);
    let (result, out) = run("WHO=$(echo there); echo \"$GREETING $WHO\"", |opts| opts.with_env(env));
    assert_eq!(result.unwrap(), ShellStatus(0));
    assert_eq!(out, "hi there\n");
}

#[cfg(unix)]
#[test]
fn test_stdin_reaches_external_command() {
    let (result, out) = run("tr a-z A-Z", |opts| opts.with_stdin(Input::bytes("quiet\n")));
    assert_eq!(result.unwrap(), ShellStatus(0));
    assert_eq!(out, "QUIET\n");
}

#[test]
fn test_word_expander() {
    assert_eq!(shell::expand("dir with spaces/file").unwrap(), "dir with spaces/file");
    assert_eq!(shell::expand("").unwrap(), "");
    assert!(shell::expand("'unterminated").is_err());
}
