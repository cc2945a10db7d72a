//! Word expansion
//!
//! Turns parsed words into fields: tilde, parameter and command
//! substitution, field splitting of unquoted results, then pathname
//! expansion of unquoted glob patterns.

use crate::error::{ShellError, ShellResult};
use crate::pathext;
use crate::shell::ast::{ParamExp, ParamOp, Program, Word, WordPart};
use crate::shell::parse::parse_words;
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// The state word expansion reads from and writes to
pub trait ExpandEnv {
    /// Value of a variable or special parameter
    fn get(&self, name: &str) -> Option<String>;

    /// Assign a variable (`${name:=word}`)
    fn set(&mut self, name: &str, value: String);

    /// Run a command substitution and return its output
    fn substitute(&mut self, program: &Program) -> ShellResult<String>;

    /// Directory pathname expansion is relative to; `None` disables globbing
    fn glob_dir(&self) -> Option<&Path>;
}

/// Expands a path-like string and returns its first field.
///
/// Backslashes become forward slashes on Windows and spaces are escaped so
/// they never split the path. Variables come from a snapshot of the process
/// environment; no globbing or command substitution is done.
pub fn expand(s: &str) -> ShellResult<String> {
    let s = pathext::to_slash(s).replace(' ', "\\ ");
    let words = parse_words(&s)?;
    let mut env = ProcessEnv::snapshot();
    let fields = expand_fields(&mut env, &words)?;
    Ok(fields.into_iter().next().unwrap_or_default())
}

struct ProcessEnv {
    vars: HashMap<String, String>,
}

impl ProcessEnv {
    fn snapshot() -> Self {
        ProcessEnv {
            vars: env::vars_os()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
                .collect(),
        }
    }
}

impl ExpandEnv for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_string(), value);
    }

    fn substitute(&mut self, _program: &Program) -> ShellResult<String> {
        Err(ShellError::Expansion(
            "command substitution is not allowed here".to_string(),
        ))
    }

    fn glob_dir(&self) -> Option<&Path> {
        None
    }
}

/// Expand words into fields, with splitting and globbing
pub fn expand_fields(env: &mut dyn ExpandEnv, words: &[Word]) -> ShellResult<Vec<String>> {
    let mut fields = Fields::default();
    for word in words {
        expand_word(env, word, &mut fields)?;
        fields.end();
    }

    let mut out = Vec::new();
    for field in fields.finish() {
        match env.glob_dir() {
            Some(dir) if field.glob => out.extend(glob_field(dir, &field)),
            _ => out.push(field.text),
        }
    }
    Ok(out)
}

/// Expand a word into a single string, without splitting or globbing
pub fn expand_literal(env: &mut dyn ExpandEnv, word: &Word) -> ShellResult<String> {
    let mut out = String::new();
    for (i, part) in word.parts.iter().enumerate() {
        match part {
            WordPart::Lit(s) if i == 0 => {
                let (home, rest) = expand_tilde(env, s);
                out.push_str(&home);
                out.push_str(rest);
            }
            WordPart::DoubleQuoted(inner) => {
                for part in inner {
                    out.push_str(&expand_quoted(env, part)?);
                }
            }
            part => out.push_str(&expand_quoted(env, part)?),
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    pattern: String,
    glob: bool,
}

#[derive(Default)]
struct Fields {
    done: Vec<Field>,
    cur: Field,
    open: bool,
}

impl Fields {
    fn quoted(&mut self, s: &str) {
        self.open = true;
        self.cur.text.push_str(s);
        self.cur.pattern.push_str(&Pattern::escape(s));
    }

    fn unquoted(&mut self, s: &str) {
        self.open = true;
        self.cur.text.push_str(s);
        self.cur.pattern.push_str(s);
        if s.contains(['*', '?', '[']) {
            self.cur.glob = true;
        }
    }

    /// Append an unquoted expansion result, splitting on IFS whitespace
    fn split(&mut self, s: &str) {
        for c in s.chars() {
            if matches!(c, ' ' | '\t' | '\n') {
                self.end();
            } else {
                let mut buf = [0u8; 4];
                self.unquoted(c.encode_utf8(&mut buf));
            }
        }
    }

    fn end(&mut self) {
        if self.open {
            self.done.push(std::mem::take(&mut self.cur));
            self.open = false;
        }
    }

    fn finish(mut self) -> Vec<Field> {
        self.end();
        self.done
    }
}

fn expand_word(env: &mut dyn ExpandEnv, word: &Word, fields: &mut Fields) -> ShellResult<()> {
    for (i, part) in word.parts.iter().enumerate() {
        match part {
            WordPart::Lit(s) if i == 0 && s.starts_with('~') => {
                let (home, rest) = expand_tilde(env, s);
                if home.is_empty() {
                    fields.unquoted(rest);
                } else {
                    fields.quoted(&home);
                    fields.unquoted(rest);
                }
            }
            WordPart::Lit(s) => fields.unquoted(s),
            WordPart::Quoted(s) => fields.quoted(s),
            WordPart::DoubleQuoted(inner) => {
                fields.open = true;
                for part in inner {
                    let value = expand_quoted(env, part)?;
                    fields.quoted(&value);
                }
            }
            WordPart::Param(param) => {
                if let Some(value) = expand_param(env, param)? {
                    fields.split(&value);
                }
            }
            WordPart::CmdSubst(program) => {
                let value = env.substitute(program)?;
                fields.split(&value);
            }
        }
    }
    Ok(())
}

/// Expand one part as if it were inside double quotes
fn expand_quoted(env: &mut dyn ExpandEnv, part: &WordPart) -> ShellResult<String> {
    Ok(match part {
        WordPart::Lit(s) | WordPart::Quoted(s) => s.clone(),
        WordPart::Param(param) => expand_param(env, param)?.unwrap_or_default(),
        WordPart::CmdSubst(program) => env.substitute(program)?,
        WordPart::DoubleQuoted(inner) => {
            let mut out = String::new();
            for part in inner {
                out.push_str(&expand_quoted(env, part)?);
            }
            out
        }
    })
}

fn expand_param(env: &mut dyn ExpandEnv, param: &ParamExp) -> ShellResult<Option<String>> {
    let value = env.get(&param.name);
    let unset = |colon: bool| match &value {
        None => true,
        Some(v) => colon && v.is_empty(),
    };

    match &param.op {
        ParamOp::Plain => Ok(value),
        ParamOp::Length => Ok(Some(
            value.map(|v| v.chars().count()).unwrap_or(0).to_string(),
        )),
        ParamOp::Default { colon, word } => {
            if unset(*colon) {
                Ok(Some(expand_literal(env, word)?))
            } else {
                Ok(value)
            }
        }
        ParamOp::Assign { colon, word } => {
            if unset(*colon) {
                let assigned = expand_literal(env, word)?;
                env.set(&param.name, assigned.clone());
                Ok(Some(assigned))
            } else {
                Ok(value)
            }
        }
        ParamOp::Alternate { colon, word } => {
            if unset(*colon) {
                Ok(None)
            } else {
                Ok(Some(expand_literal(env, word)?))
            }
        }
    }
}

/// Split a leading `~` or `~/...` into the home directory and the rest
fn expand_tilde<'a>(env: &dyn ExpandEnv, s: &'a str) -> (String, &'a str) {
    let prefix_end = s.find('/').unwrap_or(s.len());
    if &s[..prefix_end] != "~" {
        return (String::new(), s);
    }
    match home_dir(env) {
        Some(home) => (home, &s[prefix_end..]),
        None => (String::new(), s),
    }
}

fn home_dir(env: &dyn ExpandEnv) -> Option<String> {
    env.get("HOME").filter(|h| !h.is_empty()).or_else(|| {
        directories::BaseDirs::new().map(|dirs| pathext::to_slash(&dirs.home_dir().to_string_lossy()))
    })
}

fn glob_field(dir: &Path, field: &Field) -> Vec<String> {
    let absolute = Path::new(&field.pattern).is_absolute();
    let full = if absolute {
        field.pattern.clone()
    } else {
        format!("{}/{}", Pattern::escape(&dir.to_string_lossy()), field.pattern)
    };

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let paths = match glob::glob_with(&full, options) {
        Ok(paths) => paths,
        Err(_) => return vec![field.text.clone()],
    };

    let matches: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .map(|path| {
            if absolute {
                path.to_string_lossy().into_owned()
            } else {
                path.strip_prefix(dir)
                    .map(|rel| rel.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| path.to_string_lossy().into_owned())
            }
        })
        .collect();

    if matches.is_empty() {
        vec![field.text.clone()]
    } else {
        matches
    }
}
