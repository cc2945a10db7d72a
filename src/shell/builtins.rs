//! Commands the interpreter runs in-process

use crate::error::ShellError;
use crate::pathext;
use crate::shell::interp::{Flow, Interp, Stop};
use crate::shell::parse::is_name;
use std::fs;
use std::path::Path;

/// Run `name` as a builtin, or return `None` if it is not one
pub(crate) fn run(interp: &mut Interp, name: &str, args: &[String]) -> Flow<Option<u8>> {
    let status = match name {
        ":" | "true" => 0,
        "false" => 1,
        "exit" => return Err(Stop::Exit(exit_status(interp, args)?)),
        "echo" => echo(interp, args)?,
        "pwd" => {
            interp.out(&format!("{}\n", interp.dir.display()))?;
            0
        }
        "cd" => cd(interp, args)?,
        "export" => export(interp, args)?,
        "unset" => {
            for name in args.iter().filter(|a| !a.starts_with('-')) {
                interp.unset_var(name);
            }
            0
        }
        "set" => set(interp, args)?,
        "read" => read(interp, args)?,
        "test" => test(interp, args)?,
        "[" => match args.split_last() {
            Some((last, rest)) if last == "]" => test(interp, rest)?,
            _ => {
                interp.err("[: missing ]\n")?;
                2
            }
        },
        "mkdir" => mkdir(interp, args)?,
        _ => return Ok(None),
    };
    Ok(Some(status))
}

fn exit_status(interp: &Interp, args: &[String]) -> Flow<u8> {
    match args.first() {
        None => Ok(interp.last_status),
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) => Ok(n.rem_euclid(256) as u8),
            Err(_) => {
                interp.err(&format!("exit: {}: numeric argument required\n", arg))?;
                Ok(2)
            }
        },
    }
}

fn echo(interp: &Interp, args: &[String]) -> Flow<u8> {
    let mut newline = true;
    let mut rest = args;
    while let Some((first, tail)) = rest.split_first() {
        if first != "-n" {
            break;
        }
        newline = false;
        rest = tail;
    }
    let mut line = rest.join(" ");
    if newline {
        line.push('\n');
    }
    interp.out(&line)?;
    Ok(0)
}

fn cd(interp: &mut Interp, args: &[String]) -> Flow<u8> {
    let target = match args.first() {
        Some(target) => target.clone(),
        None => match interp.vars.get("HOME") {
            Some(home) => home.clone(),
            None => {
                interp.err("cd: HOME not set\n")?;
                return Ok(1);
            }
        },
    };
    let dir = pathext::clean(&pathext::smart_join(&interp.dir, &target));
    if !dir.is_dir() {
        interp.err(&format!("cd: {}: No such file or directory\n", target))?;
        return Ok(1);
    }

    let old = interp.dir.to_string_lossy().into_owned();
    interp.set_var("OLDPWD", old);
    interp.export_var("PWD", dir.to_string_lossy().into_owned());
    interp.dir = dir;
    Ok(0)
}

fn export(interp: &mut Interp, args: &[String]) -> Flow<u8> {
    if args.is_empty() {
        let mut names: Vec<&String> = interp.exported.iter().collect();
        names.sort();
        let mut listing = String::new();
        for name in names {
            if let Some(value) = interp.vars.get(name) {
                listing.push_str(&format!("export {}={:?}\n", name, value));
            }
        }
        interp.out(&listing)?;
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_name(name) {
            interp.err(&format!("export: {}: not a valid identifier\n", name))?;
            status = 1;
            continue;
        }
        match value {
            Some(value) => interp.export_var(name, value.to_string()),
            None => {
                interp.exported.insert(name.to_string());
            }
        }
    }
    Ok(status)
}

fn set(interp: &mut Interp, args: &[String]) -> Flow<u8> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let enable = match arg.chars().next() {
            Some('-') => true,
            Some('+') => false,
            _ => return Err(ShellError::Unsupported("setting positional parameters".to_string()).into()),
        };
        let flags = &arg[1..];
        match flags {
            "" | "-" => {}
            "o" => match iter.next().map(String::as_str) {
                Some("errexit") => interp.errexit = enable,
                other => {
                    interp.err(&format!("set: unsupported option {}\n", other.unwrap_or("")))?;
                    return Ok(2);
                }
            },
            _ => {
                for flag in flags.chars() {
                    match flag {
                        'e' => interp.errexit = enable,
                        // accepted for compatibility, no effect
                        'u' | 'x' => {}
                        other => {
                            interp.err(&format!("set: unsupported option {}\n", other))?;
                            return Ok(2);
                        }
                    }
                }
            }
        }
    }
    Ok(0)
}

/// `read [-r] [NAME...]`: assign one line of stdin to variables.
///
/// Fields split on `$IFS` and the last name takes the rest of the line.
/// Returns 1 at end of input, after assigning whatever partial line was read.
fn read(interp: &mut Interp, args: &[String]) -> Flow<u8> {
    let mut raw = false;
    let mut names = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-r" => raw = true,
            option if option.starts_with('-') => {
                interp.err(&format!("read: unsupported option {}\n", option))?;
                return Ok(2);
            }
            name if is_name(name) => names.push(name.to_string()),
            name => {
                interp.err(&format!("read: {}: not a valid identifier\n", name))?;
                return Ok(2);
            }
        }
    }
    if names.is_empty() {
        names.push("REPLY".to_string());
    }

    let (line, complete) = interp.io.stdin.read_line().map_err(ShellError::from)?;
    let mut line = String::from_utf8_lossy(&line).into_owned();
    if !raw {
        line = strip_backslashes(&line);
    }
    let ifs = interp
        .vars
        .get("IFS")
        .cloned()
        .unwrap_or_else(|| " \t\n".to_string());
    let fields = split_line(&line, &ifs, names.len());
    for (i, name) in names.iter().enumerate() {
        interp.set_var(name, fields.get(i).cloned().unwrap_or_default());
    }
    Ok(if complete { 0 } else { 1 })
}

fn strip_backslashes(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Split into at most `count` fields; the last one keeps inner separators
fn split_line(line: &str, ifs: &str, count: usize) -> Vec<String> {
    let is_sep = |c: char| ifs.contains(c);
    let mut fields = Vec::new();
    let mut rest = line.trim_start_matches(is_sep);
    while fields.len() + 1 < count && !rest.is_empty() {
        let end = rest.find(is_sep).unwrap_or(rest.len());
        fields.push(rest[..end].to_string());
        rest = rest[end..].trim_start_matches(is_sep);
    }
    let rest = rest.trim_end_matches(is_sep);
    if !rest.is_empty() {
        fields.push(rest.to_string());
    }
    fields
}

fn mkdir(interp: &Interp, args: &[String]) -> Flow<u8> {
    let parents = args.iter().any(|a| a == "-p");
    let dirs: Vec<&String> = args.iter().filter(|a| *a != "-p").collect();
    if dirs.is_empty() {
        interp.err("mkdir: missing operand\n")?;
        return Ok(1);
    }

    let mut status = 0;
    for dir in dirs {
        let path = pathext::smart_join(&interp.dir, dir);
        let result = if parents {
            fs::create_dir_all(&path)
        } else {
            fs::create_dir(&path)
        };
        if let Err(e) = result {
            interp.err(&format!("mkdir: {}: {}\n", dir, e))?;
            status = 1;
        }
    }
    Ok(status)
}

fn test(interp: &Interp, args: &[String]) -> Flow<u8> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match evaluate(&interp.dir, &args) {
        Ok(true) => Ok(0),
        Ok(false) => Ok(1),
        Err(message) => {
            interp.err(&format!("test: {}\n", message))?;
            Ok(2)
        }
    }
}

fn evaluate(dir: &Path, args: &[&str]) -> Result<bool, String> {
    match args {
        [] => Ok(false),
        ["!", rest @ ..] => evaluate(dir, rest).map(|v| !v),
        [s] => Ok(!s.is_empty()),
        [op, operand] => unary(dir, op, operand),
        [left, op, right] => binary(left, op, right),
        _ => Err("too many arguments".to_string()),
    }
}

fn unary(dir: &Path, op: &str, operand: &str) -> Result<bool, String> {
    let path = || pathext::smart_join(dir, operand);
    Ok(match op {
        "-n" => !operand.is_empty(),
        "-z" => operand.is_empty(),
        "-e" => path().exists(),
        "-f" => path().is_file(),
        "-d" => path().is_dir(),
        "-s" => fs::metadata(path()).map(|m| m.len() > 0).unwrap_or(false),
        _ => return Err(format!("{}: unary operator expected", op)),
    })
}

fn binary(left: &str, op: &str, right: &str) -> Result<bool, String> {
    let int = |s: &str| {
        s.trim()
            .parse::<i64>()
            .map_err(|_| format!("{}: integer expression expected", s))
    };
    Ok(match op {
        "=" | "==" => left == right,
        "!=" => left != right,
        "-eq" => int(left)? == int(right)?,
        "-ne" => int(left)? != int(right)?,
        "-lt" => int(left)? < int(right)?,
        "-le" => int(left)? <= int(right)?,
        "-gt" => int(left)? > int(right)?,
        "-ge" => int(left)? >= int(right)?,
        _ => return Err(format!("{}: binary operator expected", op)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_strings_and_integers() {
        let dir = Path::new("/");
        assert_eq!(evaluate(dir, &["a", "=", "a"]), Ok(true));
        assert_eq!(evaluate(dir, &["a", "!=", "a"]), Ok(false));
        assert_eq!(evaluate(dir, &["3", "-gt", "2"]), Ok(true));
        assert_eq!(evaluate(dir, &["!", "-z", "x"]), Ok(true));
        assert_eq!(evaluate(dir, &[""]), Ok(false));
        assert!(evaluate(dir, &["x", "-lt", "2"]).is_err());
    }

    #[test]
    fn test_split_line() {
        let ifs = " \t\n";
        assert_eq!(split_line("  one  two three ", ifs, 1), vec!["one  two three"]);
        assert_eq!(split_line("one  two three", ifs, 2), vec!["one", "two three"]);
        assert_eq!(split_line("one", ifs, 3), vec!["one"]);
        assert!(split_line("   ", ifs, 2).is_empty());
        assert_eq!(split_line("a:b:c", ":", 2), vec!["a", "b:c"]);
    }

    #[test]
    fn test_strip_backslashes() {
        assert_eq!(strip_backslashes(r"a\ b\\c"), r"a b\c");
        assert_eq!(strip_backslashes("trailing\\"), "trailing");
    }

    #[test]
    fn test_evaluate_file_checks() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file"), "data").unwrap();
        let dir = temp_dir.path();
        assert_eq!(evaluate(dir, &["-f", "file"]), Ok(true));
        assert_eq!(evaluate(dir, &["-s", "file"]), Ok(true));
        assert_eq!(evaluate(dir, &["-d", "file"]), Ok(false));
        assert_eq!(evaluate(dir, &["-e", "missing"]), Ok(false));
    }
}
