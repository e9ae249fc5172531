use std::fmt::{self, Display};

use crate::common::span::Spanned;

/// The kinds of token the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    // Keywords
    If,
    Else,
    While,
    For,
    In,
    Fn,
    Object,
    New,
    Require,
    Return,

    // Literals
    Bool,
    Nil,
    Float,
    Number,
    String,

    // Operators
    /// `=` and the compound assignments, `+=` and friends.
    Assign,
    /// The loose tier: `+ -` and the comparisons.
    AddOp,
    /// The tight tier: `* / % ^`.
    MulOp,

    // Grouping
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,

    Name,
}

/// A single lexeme and what kind of token it is.
/// Tokens are spanned (`Spanned<Token>`) to know where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Kind,
    pub lexeme: String,
}

pub type Tokens = Vec<Spanned<Token>>;

impl Token {
    pub fn new(kind: Kind, lexeme: &str) -> Token {
        Token {
            kind,
            lexeme: lexeme.to_string(),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pretty formatting for tokens
        // just use debug if you're not printing a message or something.
        use Kind::*;
        match self.kind {
            If | Else | While | For | In | Fn | Object | New | Require | Return => {
                write!(f, "keyword `{}`", self.lexeme)
            }
            Bool | Nil | Float | Number | String => write!(f, "literal `{}`", self.lexeme),
            Assign | AddOp | MulOp => write!(f, "operator `{}`", self.lexeme),
            LParen | RParen | LBrack | RBrack | LBrace | RBrace => {
                write!(f, "`{}`", self.lexeme)
            }
            Comma => write!(f, "comma"),
            Name => write!(f, "name `{}`", self.lexeme),
        }
    }
}
