//! Main CLI application

use crate::runner::{Context, Executor, Verbosity};
use crate::shell::{CommandRunner, Input, RunCommandOptions};
use crate::taskfile::DEFAULT_TASK;
use anyhow::Context as _;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use std::ffi::OsString;
use std::path::PathBuf;

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("task")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs the tasks declared in a Taskfile")
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .help("Directory containing the Taskfile")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List tasks with descriptions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exec")
                .short('x')
                .long("exec")
                .value_name("SCRIPT")
                .help("Run a shell script and exit with its status")
                .conflicts_with("list"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Don't echo commands")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tasks")
                .value_name("TASK")
                .help("Tasks to run (default: \"default\")")
                .num_args(0..),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Run the CLI with the process arguments, returning the exit code
pub fn run() -> anyhow::Result<i32> {
    run_from(std::env::args_os())
}

/// Run the CLI with explicit arguments, returning the exit code
pub fn run_from<I, T>(args: I) -> anyhow::Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().get_matches_from(args);
    let dir = match matches.get_one::<PathBuf>("dir") {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };

    if let Some(script) = matches.get_one::<String>("exec") {
        let opts = RunCommandOptions::new(script.as_str())
            .with_dir(&dir)
            .with_stdin(Input::Inherit);
        let status = CommandRunner::default()
            .run(opts)
            .context("failed to run script")?;
        return Ok(i32::from(status.code()));
    }

    let ctx = Context::new().with_verbosity(get_verbosity(&matches));
    let mut executor = Executor::load(&dir, ctx)
        .with_context(|| format!("failed to load the taskfile in {}", dir.display()))?;

    if matches.get_flag("list") {
        print_task_list(&executor);
        return Ok(0);
    }

    let tasks: Vec<String> = match matches.get_many::<String>("tasks") {
        Some(names) => names.cloned().collect(),
        None => vec![DEFAULT_TASK.to_string()],
    };

    for name in &tasks {
        if let Err(err) = executor.run_task(name) {
            if let Some(code) = err.exit_code() {
                executor
                    .ctx
                    .print_error(&format!("Failed to run task \"{}\": {}", name, err));
                return Ok(i32::from(code));
            }
            return Err(err).with_context(|| format!("failed to run task \"{}\"", name));
        }
    }
    Ok(0)
}

fn print_task_list(executor: &Executor) {
    let tasks: Vec<_> = executor
        .list_tasks()
        .into_iter()
        .filter_map(|(name, task)| task.desc.as_deref().map(|desc| (name, desc)))
        .collect();
    if tasks.is_empty() {
        println!("No tasks with description available");
        return;
    }

    let width = tasks.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    println!("Available tasks:");
    for (name, desc) in tasks {
        let padded = format!("{:width$}", name, width = width);
        println!("* {}  {}", padded.green(), desc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_verbosity() {
        let matches = build_command().get_matches_from(vec!["task"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Normal);

        let matches = build_command().get_matches_from(vec!["task", "-q"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Quiet);

        let matches = build_command().get_matches_from(vec!["task", "--silent", "-v"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Silent);
    }

    #[test]
    fn test_positional_tasks() {
        let matches = build_command().get_matches_from(vec!["task", "-d", "proj", "build", "test"]);
        let tasks: Vec<&String> = matches.get_many::<String>("tasks").unwrap().collect();
        assert_eq!(tasks, vec!["build", "test"]);
        assert_eq!(matches.get_one::<PathBuf>("dir"), Some(&PathBuf::from("proj")));
    }

    #[test]
    fn test_exec_conflicts_with_list() {
        let result = build_command().try_get_matches_from(vec!["task", "-l", "-x", "true"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_is_valid() {
        build_command().debug_assert();
    }
}
