//! Syntax tree for the supported shell subset

/// A parsed script: a sequence of and-or lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub items: Vec<AndOr>,
}

/// A pipeline followed by `&&`/`||` continuations
#[derive(Debug, Clone, PartialEq)]
pub struct AndOr {
    pub first: Pipeline,
    pub rest: Vec<(Connector, Pipeline)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub negated: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Simple(SimpleCommand),
    Compound(CompoundCommand, Vec<Redirect>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleCommand {
    pub assigns: Vec<Assign>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub name: String,
    pub value: Word,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompoundCommand {
    Subshell(Program),
    Group(Program),
    If {
        branches: Vec<(Program, Program)>,
        otherwise: Option<Program>,
    },
    For {
        var: String,
        words: Option<Vec<Word>>,
        body: Program,
    },
    While {
        until: bool,
        cond: Program,
        body: Program,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub fd: u32,
    pub op: RedirectOp,
    pub target: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `>>`
    Append,
    /// `&>`
    WriteAll,
    /// `>&N`
    Dup,
}

/// A shell word made of literal, quoted and expanded parts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Unquoted text, subject to tilde expansion and globbing
    Lit(String),
    /// Text that was single-quoted, escaped, or literal inside double quotes
    Quoted(String),
    Param(ParamExp),
    CmdSubst(Program),
    DoubleQuoted(Vec<WordPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamExp {
    pub name: String,
    pub op: ParamOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    Plain,
    Length,
    /// `${x:-w}` / `${x-w}`
    Default { colon: bool, word: Word },
    /// `${x:=w}` / `${x=w}`
    Assign { colon: bool, word: Word },
    /// `${x:+w}` / `${x+w}`
    Alternate { colon: bool, word: Word },
}

impl Word {
    pub fn lit(s: &str) -> Self {
        Word {
            parts: vec![WordPart::Lit(s.to_string())],
        }
    }

    /// The word's text if it is a single unquoted literal
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Lit(s)] => Some(s),
            _ => None,
        }
    }
}
