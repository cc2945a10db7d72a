//! Command text templating
//!
//! Renders `{{.NAME}}`, `{{FUNC}}`, `{{FUNC .NAME}}` and `{{FUNC "text"}}`
//! actions before a command reaches the shell. Unknown variables render as
//! the empty string; unknown functions are an error.

use crate::error::{ShellError, TemplateError, TemplateResult};
use crate::pathext;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const ACTION_PATTERN: &str = r"\{\{-?\s*(.*?)\s*-?\}\}";

/// A template helper
#[derive(Clone, Copy)]
pub enum Func {
    Nullary(fn() -> String),
    Unary(fn(&str) -> TemplateResult<String>),
}

/// Helpers available to templates, built once and shared by reference
#[derive(Clone)]
pub struct FuncTable {
    funcs: HashMap<&'static str, Func>,
}

impl FuncTable {
    /// An empty table
    pub fn new() -> Self {
        FuncTable {
            funcs: HashMap::new(),
        }
    }

    /// The standard helper set
    pub fn standard() -> Self {
        let mut table = FuncTable::new();
        table.insert("OS", Func::Nullary(|| std::env::consts::OS.to_string()));
        table.insert("ARCH", Func::Nullary(|| std::env::consts::ARCH.to_string()));
        table.insert("catLines", Func::Unary(|s| Ok(cat_lines(s))));
        table.insert("splitLines", Func::Unary(|s| Ok(split_lines(s).join("\n"))));
        table.insert("fromSlash", Func::Unary(|s| Ok(pathext::from_slash(s))));
        table.insert("toSlash", Func::Unary(|s| Ok(pathext::to_slash(s))));
        table.insert("exeExt", Func::Nullary(|| exe_ext().to_string()));
        table.insert("shellQuote", Func::Unary(shell_quote));
        // deprecated
        table.insert("IsSH", Func::Nullary(|| "true".to_string()));
        table.insert("FromSlash", Func::Unary(|s| Ok(pathext::from_slash(s))));
        table.insert("ToSlash", Func::Unary(|s| Ok(pathext::to_slash(s))));
        table.insert("ExeExt", Func::Nullary(|| exe_ext().to_string()));
        table
    }

    pub fn insert(&mut self, name: &'static str, func: Func) {
        self.funcs.insert(name, func);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Call a helper by name
    pub fn call(&self, name: &str, args: &[String]) -> TemplateResult<String> {
        let func = self
            .funcs
            .get(name)
            .ok_or_else(|| TemplateError::UnknownFunction(name.to_string()))?;
        match (func, args) {
            (Func::Nullary(f), []) => Ok(f()),
            (Func::Unary(f), [arg]) => f(arg),
            (func, args) => Err(TemplateError::WrongArity {
                name: name.to_string(),
                want: match func {
                    Func::Nullary(_) => 0,
                    Func::Unary(_) => 1,
                },
                got: args.len(),
            }),
        }
    }
}

impl Default for FuncTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for FuncTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&&str> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("FuncTable").field("funcs", &names).finish()
    }
}

fn cat_lines(s: &str) -> String {
    s.replace("\r\n", " ").replace('\n', " ")
}

fn split_lines(s: &str) -> Vec<String> {
    s.replace("\r\n", "\n").split('\n').map(str::to_string).collect()
}

fn exe_ext() -> &'static str {
    if cfg!(windows) {
        ".exe"
    } else {
        ""
    }
}

/// Quote a string so a shell reads it back as one literal word
fn shell_quote(s: &str) -> TemplateResult<String> {
    if s.contains('\0') {
        return Err(ShellError::Expansion("cannot quote a string containing a NUL byte".to_string()).into());
    }
    Ok(shell_words::quote(s).into_owned())
}

#[derive(Debug, PartialEq)]
enum Token {
    Var(String),
    Str(String),
    Ident(String),
}

fn tokenize(action: &str) -> TemplateResult<Vec<Token>> {
    let invalid = || TemplateError::InvalidAction(action.to_string());
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => return Err(invalid()),
                    },
                    Some(other) => text.push(other),
                    None => return Err(invalid()),
                }
            }
            tokens.push(Token::Str(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            let token = match word.strip_prefix('.') {
                Some(name) if !name.is_empty() => Token::Var(name.to_string()),
                Some(_) => return Err(invalid()),
                None => Token::Ident(word),
            };
            tokens.push(token);
        }
    }
    Ok(tokens)
}

fn action_regex() -> TemplateResult<&'static Regex> {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = ACTION.get() {
        return Ok(re);
    }
    let re = Regex::new(ACTION_PATTERN).map_err(|e| TemplateError::InvalidAction(e.to_string()))?;
    Ok(ACTION.get_or_init(|| re))
}

/// Renders templates against a variable set
pub struct Templater<'a> {
    funcs: &'a FuncTable,
    vars: &'a HashMap<String, String>,
}

impl<'a> Templater<'a> {
    pub fn new(funcs: &'a FuncTable, vars: &'a HashMap<String, String>) -> Self {
        Templater { funcs, vars }
    }

    /// Render every action in `text`
    pub fn render(&self, text: &str) -> TemplateResult<String> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in action_regex()?.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(&self.eval(inner.as_str())?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn value(&self, token: &Token) -> TemplateResult<String> {
        match token {
            Token::Var(name) => Ok(self.vars.get(name).cloned().unwrap_or_default()),
            Token::Str(text) => Ok(text.clone()),
            Token::Ident(name) => self.funcs.call(name, &[]),
        }
    }

    fn eval(&self, action: &str) -> TemplateResult<String> {
        let tokens = tokenize(action)?;
        match tokens.as_slice() {
            [] => Err(TemplateError::InvalidAction(action.to_string())),
            [Token::Ident(name), args @ ..] => {
                let args = args
                    .iter()
                    .map(|arg| self.value(arg))
                    .collect::<TemplateResult<Vec<String>>>()?;
                self.funcs.call(name, &args)
            }
            [single] => self.value(single),
            _ => Err(TemplateError::InvalidAction(action.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(text: &str, vars: &[(&str, &str)]) -> TemplateResult<String> {
        let funcs = FuncTable::standard();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Templater::new(&funcs, &vars).render(text)
    }

    #[test]
    fn test_render_variables() {
        assert_eq!(render("Hello, {{.NAME}}!", &[("NAME", "world")]).unwrap(), "Hello, world!");
        assert_eq!(render("{{ .A }}-{{.B}}", &[("A", "1"), ("B", "2")]).unwrap(), "1-2");
        assert_eq!(render("[{{.MISSING}}]", &[]).unwrap(), "[]");
        assert_eq!(render("no actions here", &[]).unwrap(), "no actions here");
    }

    #[test]
    fn test_render_functions() {
        assert_eq!(render("{{OS}}", &[]).unwrap(), std::env::consts::OS);
        assert_eq!(render("{{catLines .L}}", &[("L", "a\nb\r\nc")]).unwrap(), "a b c");
        assert_eq!(render("{{splitLines .L}}", &[("L", "a\r\nb")]).unwrap(), "a\nb");
        assert_eq!(render("{{toSlash \"a/b\"}}", &[]).unwrap(), "a/b");
        assert_eq!(render("bin{{exeExt}}", &[]).unwrap(), format!("bin{}", exe_ext()));
        assert_eq!(render("{{ExeExt}}", &[]).unwrap(), render("{{exeExt}}", &[]).unwrap());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-word_1.txt").unwrap(), "plain-word_1.txt");
        assert_eq!(shell_quote("").unwrap(), "''");
        assert_eq!(shell_quote("two words").unwrap(), "'two words'");
        assert_eq!(shell_quote("it's").unwrap(), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME/*").unwrap(), "'$HOME/*'");
        assert!(shell_quote("nul\0byte").is_err());
    }

    #[test]
    fn test_render_errors() {
        assert!(matches!(
            render("{{nope}}", &[]),
            Err(TemplateError::UnknownFunction(_))
        ));
        assert!(matches!(
            render("{{OS .X}}", &[]),
            Err(TemplateError::WrongArity { want: 0, got: 1, .. })
        ));
        assert!(matches!(
            render("{{\"unterminated}}", &[]),
            Err(TemplateError::InvalidAction(_))
        ));
        assert!(matches!(render("{{}}", &[]), Err(TemplateError::InvalidAction(_))));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize(r#"shellQuote .X "a \"b\"""#).unwrap(),
            vec![
                Token::Ident("shellQuote".to_string()),
                Token::Var("X".to_string()),
                Token::Str("a \"b\"".to_string()),
            ]
        );
    }
}
