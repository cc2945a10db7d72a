//! Shell script parsing
//!
//! A recursive descent parser for the POSIX shell subset task scripts use.
//! Anything outside that subset is rejected up front with
//! [`ShellError::Unsupported`] so no statement runs before the failure.

use crate::error::{ShellError, ShellResult};
use crate::shell::ast::*;

/// Parse a complete script
pub fn parse(src: &str) -> ShellResult<Program> {
    let mut parser = Parser::new(src);
    let program = parser.parse_list(&[], false)?;
    parser.skip_linebreaks();
    if let Some(c) = parser.peek() {
        return Err(parser.error(format!("unexpected {:?}", c)));
    }
    Ok(program)
}

/// Parse a blank-separated list of words, with no operators allowed
pub fn parse_words(src: &str) -> ShellResult<Vec<Word>> {
    let mut parser = Parser::new(src);
    let mut words = Vec::new();
    loop {
        parser.skip_linebreaks();
        match parser.peek() {
            None => break,
            Some(c) if is_meta(c) => {
                return Err(ShellError::Expansion(format!(
                    "unexpected {:?} in {:?}",
                    c, src
                )))
            }
            Some(_) => {}
        }
        match parser.read_word().map_err(|e| ShellError::Expansion(e.to_string()))? {
            Some(word) => words.push(word),
            None => break,
        }
    }
    Ok(words)
}

fn is_meta(c: char) -> bool {
    matches!(c, ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Whether `s` is a valid variable name
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_name_start(c)) && chars.all(is_name_char)
}

fn push_lit(parts: &mut Vec<WordPart>, lit: &mut String) {
    if lit.is_empty() {
        return;
    }
    if let Some(WordPart::Lit(prev)) = parts.last_mut() {
        prev.push_str(lit);
    } else {
        parts.push(WordPart::Lit(lit.clone()));
    }
    lit.clear();
}

fn push_quoted(parts: &mut Vec<WordPart>, lit: &mut String) {
    if lit.is_empty() {
        return;
    }
    parts.push(WordPart::Quoted(std::mem::take(lit)));
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Parser {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn error(&self, message: impl Into<String>) -> ShellError {
        let consumed = &self.chars[..self.pos.min(self.chars.len())];
        let line = 1 + consumed.iter().filter(|&&c| c == '\n').count();
        let column = match consumed.iter().rposition(|&c| c == '\n') {
            Some(nl) => consumed.len() - nl,
            None => consumed.len() + 1,
        };
        ShellError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Skip spaces, tabs, line continuations and comments
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.pos += 1;
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn skip_linebreaks(&mut self) {
        loop {
            self.skip_blanks();
            if self.peek() == Some('\n') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek_keyword(&mut self) -> Option<String> {
        let save = self.pos;
        self.skip_blanks();
        let word = self.read_word().ok().flatten();
        self.pos = save;
        word.and_then(|w| w.as_literal().map(str::to_string))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_blanks();
        if self.peek_keyword().as_deref() == Some(keyword) {
            self.pos += keyword.chars().count();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ShellResult<()> {
        self.skip_linebreaks();
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", keyword)))
        }
    }

    fn parse_list(&mut self, terminators: &[&str], close_paren: bool) -> ShellResult<Program> {
        let mut items = Vec::new();
        loop {
            self.skip_linebreaks();
            match self.peek() {
                None => break,
                Some(')') if close_paren => break,
                Some(')') => return Err(self.error("unexpected \")\"")),
                Some(_) => {}
            }
            if let Some(keyword) = self.peek_keyword() {
                if terminators.contains(&keyword.as_str()) {
                    break;
                }
            }

            items.push(self.parse_and_or()?);

            self.skip_blanks();
            match self.peek() {
                Some(';') if self.starts_with(";;") => {
                    return Err(ShellError::Unsupported("case statement".to_string()))
                }
                Some(';') | Some('\n') => {
                    self.pos += 1;
                }
                Some('&') => {
                    return Err(ShellError::Unsupported("background execution".to_string()))
                }
                Some(')') if close_paren => {}
                None => {}
                Some(c) => return Err(self.error(format!("unexpected {:?}", c))),
            }
        }
        Ok(Program { items })
    }

    fn parse_and_or(&mut self) -> ShellResult<AndOr> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            self.skip_blanks();
            let connector = if self.starts_with("&&") {
                Connector::And
            } else if self.starts_with("||") {
                Connector::Or
            } else {
                break;
            };
            self.pos += 2;
            self.skip_linebreaks();
            rest.push((connector, self.parse_pipeline()?));
        }
        Ok(AndOr { first, rest })
    }

    fn parse_pipeline(&mut self) -> ShellResult<Pipeline> {
        self.skip_blanks();
        let negated = self.eat_keyword("!");
        let mut commands = vec![self.parse_command()?];
        loop {
            self.skip_blanks();
            if self.peek() == Some('|') && !self.starts_with("||") {
                self.pos += 1;
                self.skip_linebreaks();
                commands.push(self.parse_command()?);
            } else {
                break;
            }
        }
        Ok(Pipeline { negated, commands })
    }

    fn parse_command(&mut self) -> ShellResult<Command> {
        self.skip_blanks();
        if self.peek() == Some('(') {
            if self.starts_with("((") {
                return Err(ShellError::Unsupported("arithmetic command".to_string()));
            }
            self.pos += 1;
            let body = self.parse_list(&[], true)?;
            if self.bump() != Some(')') {
                return Err(self.error("reached EOF without matching ( with )"));
            }
            let redirects = self.parse_redirects()?;
            return Ok(Command::Compound(CompoundCommand::Subshell(body), redirects));
        }

        let compound = match self.peek_keyword().as_deref() {
            Some("{") => {
                self.eat_keyword("{");
                let body = self.parse_list(&["}"], false)?;
                self.expect_keyword("}")?;
                CompoundCommand::Group(body)
            }
            Some("if") => self.parse_if()?,
            Some("for") => self.parse_for()?,
            Some(kw @ ("while" | "until")) => {
                let until = kw == "until";
                self.eat_keyword(kw);
                let cond = self.parse_list(&["do"], false)?;
                self.expect_keyword("do")?;
                let body = self.parse_list(&["done"], false)?;
                self.expect_keyword("done")?;
                CompoundCommand::While { until, cond, body }
            }
            Some("case") => return Err(ShellError::Unsupported("case statement".to_string())),
            Some("function") => {
                return Err(ShellError::Unsupported("function definition".to_string()))
            }
            Some(kw @ ("then" | "else" | "elif" | "fi" | "do" | "done" | "}")) => {
                return Err(self.error(format!("unexpected {:?}", kw)))
            }
            _ => return self.parse_simple().map(Command::Simple),
        };

        let redirects = self.parse_redirects()?;
        Ok(Command::Compound(compound, redirects))
    }

    fn parse_if(&mut self) -> ShellResult<CompoundCommand> {
        self.eat_keyword("if");
        let mut branches = Vec::new();
        let mut otherwise = None;

        let cond = self.parse_list(&["then"], false)?;
        self.expect_keyword("then")?;
        let body = self.parse_list(&["elif", "else", "fi"], false)?;
        branches.push((cond, body));

        loop {
            self.skip_linebreaks();
            if self.eat_keyword("elif") {
                let cond = self.parse_list(&["then"], false)?;
                self.expect_keyword("then")?;
                let body = self.parse_list(&["elif", "else", "fi"], false)?;
                branches.push((cond, body));
                continue;
            }
            if self.eat_keyword("else") {
                otherwise = Some(self.parse_list(&["fi"], false)?);
            }
            self.expect_keyword("fi")?;
            break;
        }

        Ok(CompoundCommand::If {
            branches,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> ShellResult<CompoundCommand> {
        self.eat_keyword("for");
        self.skip_blanks();
        let var = match self.read_word()? {
            Some(word) => match word.as_literal() {
                Some(name) if is_name(name) => name.to_string(),
                _ => return Err(self.error("invalid for loop variable name")),
            },
            None => return Err(self.error("for requires a variable name")),
        };

        self.skip_linebreaks();
        let words = if self.eat_keyword("in") {
            let mut words = Vec::new();
            loop {
                self.skip_blanks();
                match self.peek() {
                    Some(';') | Some('\n') => {
                        self.pos += 1;
                        break;
                    }
                    None => break,
                    Some(_) => match self.read_word()? {
                        Some(word) => words.push(word),
                        None => return Err(self.error("unexpected token in for loop")),
                    },
                }
            }
            Some(words)
        } else {
            if self.peek() == Some(';') {
                self.pos += 1;
            }
            None
        };

        self.expect_keyword("do")?;
        let body = self.parse_list(&["done"], false)?;
        self.expect_keyword("done")?;
        Ok(CompoundCommand::For { var, words, body })
    }

    fn parse_simple(&mut self) -> ShellResult<SimpleCommand> {
        let mut cmd = SimpleCommand::default();
        loop {
            self.skip_blanks();
            if let Some(redirect) = self.try_redirect()? {
                cmd.redirects.push(redirect);
                continue;
            }
            match self.peek() {
                None | Some(';') | Some('&') | Some('|') | Some(')') | Some('\n') => break,
                Some('(') => {
                    if cmd.words.len() == 1 && self.peek_at(1) == Some(')') {
                        return Err(ShellError::Unsupported("function definition".to_string()));
                    }
                    return Err(self.error("unexpected \"(\""));
                }
                Some(_) => {}
            }
            let word = match self.read_word()? {
                Some(word) => word,
                None => break,
            };
            if cmd.words.is_empty() {
                if let Some(assign) = split_assignment(&word) {
                    cmd.assigns.push(assign);
                    continue;
                }
            }
            cmd.words.push(word);
        }

        if cmd.assigns.is_empty() && cmd.words.is_empty() && cmd.redirects.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.error(format!("unexpected {:?}", c)),
                None => self.error("expected a command"),
            });
        }
        check_set_args(&cmd.words)?;
        Ok(cmd)
    }

    fn parse_redirects(&mut self) -> ShellResult<Vec<Redirect>> {
        let mut redirects = Vec::new();
        loop {
            self.skip_blanks();
            match self.try_redirect()? {
                Some(redirect) => redirects.push(redirect),
                None => break,
            }
        }
        Ok(redirects)
    }

    fn try_redirect(&mut self) -> ShellResult<Option<Redirect>> {
        let save = self.pos;
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.pos += 1;
        }
        let explicit_fd = if digits.is_empty() {
            None
        } else if matches!(self.peek(), Some('<') | Some('>')) {
            Some(digits.parse::<u32>().unwrap_or(u32::MAX))
        } else {
            self.pos = save;
            return Ok(None);
        };

        let (op, default_fd, width) = if self.starts_with("&>") && explicit_fd.is_none() {
            (RedirectOp::WriteAll, 1, 2)
        } else if self.starts_with("<<") {
            return Err(ShellError::Unsupported("here-document".to_string()));
        } else if self.starts_with(">>") {
            (RedirectOp::Append, 1, 2)
        } else if self.starts_with(">&") {
            (RedirectOp::Dup, 1, 2)
        } else if self.starts_with("<&") {
            (RedirectOp::Dup, 0, 2)
        } else if self.starts_with(">|") {
            (RedirectOp::Write, 1, 2)
        } else if self.peek() == Some('>') {
            (RedirectOp::Write, 1, 1)
        } else if self.peek() == Some('<') {
            (RedirectOp::Read, 0, 1)
        } else {
            self.pos = save;
            return Ok(None);
        };
        self.pos += width;

        self.skip_blanks();
        let target = match self.read_word()? {
            Some(word) => word,
            None => return Err(self.error("expected a redirection target")),
        };
        let fd = explicit_fd.unwrap_or(default_fd);
        if fd > 2 {
            return Err(ShellError::Unsupported(format!("redirecting file descriptor {}", fd)));
        }
        if matches!(op, RedirectOp::Dup) {
            check_dup_target(fd, &target)?;
        }
        Ok(Some(Redirect { fd, op, target }))
    }

    fn read_word(&mut self) -> ShellResult<Option<Word>> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => break,
                c if is_meta(c) => break,
                '\\' => {
                    self.pos += 1;
                    match self.bump() {
                        Some('\n') => {}
                        Some(escaped) => {
                            push_lit(&mut parts, &mut lit);
                            parts.push(WordPart::Quoted(escaped.to_string()));
                        }
                        None => lit.push('\\'),
                    }
                }
                '\'' => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::Quoted(self.read_single_quoted()?));
                }
                '"' => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '$' => match self.read_dollar()? {
                    WordPart::Lit(s) => lit.push_str(&s),
                    part => {
                        push_lit(&mut parts, &mut lit);
                        parts.push(part);
                    }
                },
                '`' => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::CmdSubst(self.read_backtick()?));
                }
                _ => {
                    lit.push(c);
                    self.pos += 1;
                }
            }
        }
        push_lit(&mut parts, &mut lit);

        if parts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Word { parts }))
        }
    }

    fn read_single_quoted(&mut self) -> ShellResult<String> {
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(s),
                Some(c) => s.push(c),
                None => return Err(self.error("reached EOF without closing quote '")),
            }
        }
    }

    fn read_double_quoted(&mut self) -> ShellResult<Vec<WordPart>> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("reached EOF without closing quote \"")),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ ('$' | '`' | '"' | '\\')) => {
                            self.pos += 1;
                            lit.push(c);
                        }
                        Some('\n') => {
                            self.pos += 1;
                        }
                        _ => lit.push('\\'),
                    }
                }
                Some('$') => match self.read_dollar()? {
                    WordPart::Lit(s) => lit.push_str(&s),
                    part => {
                        push_quoted(&mut parts, &mut lit);
                        parts.push(part);
                    }
                },
                Some('`') => {
                    self.pos += 1;
                    push_quoted(&mut parts, &mut lit);
                    parts.push(WordPart::CmdSubst(self.read_backtick()?));
                }
                Some(c) => {
                    self.pos += 1;
                    lit.push(c);
                }
            }
        }
        push_quoted(&mut parts, &mut lit);
        // keep `""` distinguishable from nothing at all
        if parts.is_empty() {
            parts.push(WordPart::Quoted(String::new()));
        }
        Ok(parts)
    }

    /// Parse a `$` expansion; a lone `$` comes back as a literal
    fn read_dollar(&mut self) -> ShellResult<WordPart> {
        self.pos += 1;
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                self.read_braced_param()
            }
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    return Err(ShellError::Unsupported("arithmetic expansion".to_string()));
                }
                self.pos += 1;
                let program = self.parse_list(&[], true)?;
                if self.bump() != Some(')') {
                    return Err(self.error("reached EOF without matching ( with )"));
                }
                Ok(WordPart::CmdSubst(program))
            }
            Some(c) if is_name_start(c) => Ok(WordPart::Param(ParamExp {
                name: self.read_name(),
                op: ParamOp::Plain,
            })),
            Some(c) if c.is_ascii_digit() || "?$#@*!-".contains(c) => {
                self.pos += 1;
                Ok(WordPart::Param(ParamExp {
                    name: c.to_string(),
                    op: ParamOp::Plain,
                }))
            }
            _ => Ok(WordPart::Lit("$".to_string())),
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|&c| is_name_char(c)) {
            name.push(c);
            self.pos += 1;
        }
        name
    }

    fn read_braced_param(&mut self) -> ShellResult<WordPart> {
        if self.peek() == Some('#') && self.peek_at(1).is_some_and(is_name_start) {
            self.pos += 1;
            let name = self.read_name();
            if self.bump() != Some('}') {
                return Err(self.error("bad substitution"));
            }
            return Ok(WordPart::Param(ParamExp {
                name,
                op: ParamOp::Length,
            }));
        }

        let name = match self.peek() {
            Some(c) if is_name_start(c) => self.read_name(),
            Some(c) if c.is_ascii_digit() || "?$#@*!-".contains(c) => {
                self.pos += 1;
                c.to_string()
            }
            _ => return Err(self.error("bad substitution")),
        };

        let (colon, op_char) = match self.bump() {
            Some('}') => {
                return Ok(WordPart::Param(ParamExp {
                    name,
                    op: ParamOp::Plain,
                }))
            }
            Some(':') => (true, self.bump()),
            other => (false, other),
        };

        let make: fn(bool, Word) -> ParamOp = match op_char {
            Some('-') => |colon, word| ParamOp::Default { colon, word },
            Some('=') => |colon, word| ParamOp::Assign { colon, word },
            Some('+') => |colon, word| ParamOp::Alternate { colon, word },
            Some('?') => return Err(ShellError::Unsupported("${var?message}".to_string())),
            Some('%') | Some('#') | Some('/') => {
                return Err(ShellError::Unsupported("pattern substitution".to_string()))
            }
            _ => return Err(self.error("bad substitution")),
        };
        let word = self.read_param_word()?;
        Ok(WordPart::Param(ParamExp {
            name,
            op: make(colon, word),
        }))
    }

    /// Read the operand of `${name:-word}` up to the closing brace
    fn read_param_word(&mut self) -> ShellResult<Word> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("reached EOF without matching ${ with }")),
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(escaped) = self.bump() {
                        push_lit(&mut parts, &mut lit);
                        parts.push(WordPart::Quoted(escaped.to_string()));
                    }
                }
                Some('\'') => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::Quoted(self.read_single_quoted()?));
                }
                Some('"') => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::DoubleQuoted(self.read_double_quoted()?));
                }
                Some('$') => match self.read_dollar()? {
                    WordPart::Lit(s) => lit.push_str(&s),
                    part => {
                        push_lit(&mut parts, &mut lit);
                        parts.push(part);
                    }
                },
                Some('`') => {
                    self.pos += 1;
                    push_lit(&mut parts, &mut lit);
                    parts.push(WordPart::CmdSubst(self.read_backtick()?));
                }
                Some(c) => {
                    self.pos += 1;
                    lit.push(c);
                }
            }
        }
        push_lit(&mut parts, &mut lit);
        Ok(Word { parts })
    }

    fn read_backtick(&mut self) -> ShellResult<Program> {
        let mut inner = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("reached EOF without closing quote `")),
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('`' | '\\' | '$')) => inner.push(c),
                    Some(c) => {
                        inner.push('\\');
                        inner.push(c);
                    }
                    None => inner.push('\\'),
                },
                Some(c) => inner.push(c),
            }
        }
        parse(&inner)
    }
}

/// Only the standard streams can be duplicated or closed
fn check_dup_target(fd: u32, target: &Word) -> ShellResult<()> {
    match target.as_literal() {
        Some("1") | Some("2") | Some("-") => Ok(()),
        Some("0") if fd == 0 => Ok(()),
        _ => Err(ShellError::Unsupported(format!(
            "duplicating file descriptor {}",
            target.as_literal().unwrap_or("from an expansion")
        ))),
    }
}

/// `set` only toggles options; literal operands would set positional parameters
fn check_set_args(words: &[Word]) -> ShellResult<()> {
    let Some((first, args)) = words.split_first() else {
        return Ok(());
    };
    if first.as_literal() != Some("set") {
        return Ok(());
    }
    let mut args = args.iter().peekable();
    while let Some(arg) = args.next() {
        let Some(arg) = arg.as_literal() else {
            continue;
        };
        let is_option = arg.len() > 1 && (arg.starts_with('-') || arg.starts_with('+'));
        let ends_options = arg == "-" || arg == "--";
        if ends_options && args.peek().is_none() {
            continue;
        }
        if !is_option || ends_options {
            return Err(ShellError::Unsupported("setting positional parameters".to_string()));
        }
        if arg[1..].ends_with('o') {
            args.next();
        }
    }
    Ok(())
}

fn split_assignment(word: &Word) -> Option<Assign> {
    let first = match word.parts.first() {
        Some(WordPart::Lit(s)) => s,
        _ => return None,
    };
    let eq = first.find('=')?;
    let name = &first[..eq];
    if !is_name(name) {
        return None;
    }

    let mut parts = Vec::new();
    let rest = &first[eq + 1..];
    if !rest.is_empty() {
        parts.push(WordPart::Lit(rest.to_string()));
    }
    parts.extend(word.parts[1..].iter().cloned());
    Some(Assign {
        name: name.to_string(),
        value: Word { parts },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(program: &Program, index: usize) -> &SimpleCommand {
        match &program.items[index].first.commands[0] {
            Command::Simple(cmd) => cmd,
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_command() {
        let program = parse("echo hello world").unwrap();
        assert_eq!(program.items.len(), 1);
        let cmd = simple(&program, 0);
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[0].as_literal(), Some("echo"));
    }

    #[test]
    fn test_parse_sequences_and_connectors() {
        let program = parse("a; b && c || d\ne").unwrap();
        assert_eq!(program.items.len(), 3);
        assert_eq!(program.items[1].rest.len(), 2);
        assert_eq!(program.items[1].rest[0].0, Connector::And);
        assert_eq!(program.items[1].rest[1].0, Connector::Or);
    }

    #[test]
    fn test_parse_pipeline_and_negation() {
        let program = parse("! cat file | grep x").unwrap();
        let pipeline = &program.items[0].first;
        assert!(pipeline.negated);
        assert_eq!(pipeline.commands.len(), 2);
    }

    #[test]
    fn test_parse_quotes() {
        let program = parse(r#"echo 'a b' "c $HOME d" e\ f"#).unwrap();
        let cmd = simple(&program, 0);
        assert_eq!(cmd.words.len(), 4);
        assert_eq!(cmd.words[1].parts, vec![WordPart::Quoted("a b".to_string())]);
        match &cmd.words[2].parts[0] {
            WordPart::DoubleQuoted(inner) => assert_eq!(inner.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignments() {
        let program = parse("FOO=bar BAZ= env").unwrap();
        let cmd = simple(&program, 0);
        assert_eq!(cmd.assigns.len(), 2);
        assert_eq!(cmd.assigns[0].name, "FOO");
        assert!(cmd.assigns[1].value.parts.is_empty());
        assert_eq!(cmd.words.len(), 1);
    }

    #[test]
    fn test_parse_redirects() {
        let program = parse("cmd > out.txt 2>&1 < in.txt >> log").unwrap();
        let cmd = simple(&program, 0);
        let ops: Vec<_> = cmd.redirects.iter().map(|r| (r.fd, r.op)).collect();
        assert_eq!(
            ops,
            vec![
                (1, RedirectOp::Write),
                (2, RedirectOp::Dup),
                (0, RedirectOp::Read),
                (1, RedirectOp::Append)
            ]
        );
    }

    #[test]
    fn test_parse_if_for_while() {
        let program = parse(
            "if test -f x; then echo yes; elif true; then echo maybe; else echo no; fi\n\
             for f in a b c; do echo $f; done\n\
             while false; do :; done",
        )
        .unwrap();
        assert_eq!(program.items.len(), 3);
        match &program.items[0].first.commands[0] {
            Command::Compound(CompoundCommand::If { branches, otherwise }, _) => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_groups_and_subshells() {
        let program = parse("{ echo a; echo b; } > out; (cd sub && make)").unwrap();
        assert_eq!(program.items.len(), 2);
    }

    #[test]
    fn test_parse_command_substitution() {
        let program = parse("echo $(echo inner) `date`").unwrap();
        let cmd = simple(&program, 0);
        assert!(matches!(cmd.words[1].parts[0], WordPart::CmdSubst(_)));
        assert!(matches!(cmd.words[2].parts[0], WordPart::CmdSubst(_)));
    }

    #[test]
    fn test_parse_param_operators() {
        let program = parse("echo ${A:-default} ${#B} ${C+alt}").unwrap();
        let cmd = simple(&program, 0);
        assert!(matches!(
            &cmd.words[1].parts[0],
            WordPart::Param(ParamExp { op: ParamOp::Default { colon: true, .. }, .. })
        ));
        assert!(matches!(
            &cmd.words[2].parts[0],
            WordPart::Param(ParamExp { op: ParamOp::Length, .. })
        ));
    }

    #[test]
    fn test_parse_comments_and_continuations() {
        let program = parse("# leading\necho a \\\n  b # trailing\n").unwrap();
        assert_eq!(program.items.len(), 1);
        assert_eq!(simple(&program, 0).words.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("echo 'open"), Err(ShellError::Parse { .. })));
        assert!(matches!(parse("if true; then echo"), Err(ShellError::Parse { .. })));
        assert!(matches!(parse("echo )"), Err(ShellError::Parse { .. })));
        assert!(matches!(parse("sleep 1 &"), Err(ShellError::Unsupported(_))));
        assert!(matches!(parse("case x in esac"), Err(ShellError::Unsupported(_))));
        assert!(matches!(parse("cat <<EOF"), Err(ShellError::Unsupported(_))));
    }

    #[test]
    fn test_only_standard_streams_redirect() {
        for script in ["echo x 3>f", "cat 9<in", "echo x 2>&5", "echo x >&$fd", "cat 1<&0"] {
            assert!(matches!(parse(script), Err(ShellError::Unsupported(_))), "{}", script);
        }
        for script in ["echo x 2>&1", "echo x >&2", "echo x 2>&-", "cat <&0", "echo x 2>/dev/null"] {
            assert!(parse(script).is_ok(), "{}", script);
        }
    }

    #[test]
    fn test_set_rejects_positional_parameters() {
        for script in ["set a b", "set -- a", "set -e x", "set - x"] {
            assert!(matches!(parse(script), Err(ShellError::Unsupported(_))), "{}", script);
        }
        for script in ["set -e", "set +e", "set -o errexit", "set -eu", "set --", "echo set a"] {
            assert!(parse(script).is_ok(), "{}", script);
        }
    }

    #[test]
    fn test_parse_error_position() {
        match parse("echo ok\necho 'bad") {
            Err(ShellError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_words() {
        let words = parse_words(r"~/my\ dir/file").unwrap();
        assert_eq!(words.len(), 1);
        assert!(parse_words("a; b").is_err());
    }
}
