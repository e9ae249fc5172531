use std::rc::Rc;

use crate::{
    common::{
        source::Source,
        span::{Span, Spanned},
    },
    compiler::{
        syntax::{Note, Syntax},
        token::{Kind, Token, Tokens},
    },
};

/// How a single entry of the pattern table recognizes its token.
enum Pattern {
    /// A keyword; only matches as a whole word.
    Word(&'static str),
    /// Any of these exact symbols, tried in order.
    Symbols(&'static [&'static str]),
    /// Returns the matched length in bytes.
    Rule(fn(&str) -> Option<usize>),
}

/// The pattern table.
/// The first entry that matches wins, so order matters:
/// keywords come before names, and longer operators before their prefixes.
const PATTERNS: &[(Kind, Pattern)] = &[
    (Kind::If, Pattern::Word("if")),
    (Kind::Else, Pattern::Word("else")),
    (Kind::While, Pattern::Word("while")),
    (Kind::For, Pattern::Word("for")),
    (Kind::In, Pattern::Word("in")),
    (Kind::Fn, Pattern::Word("fn")),
    (Kind::Object, Pattern::Word("object")),
    (Kind::New, Pattern::Word("new")),
    (Kind::Require, Pattern::Word("require")),
    (Kind::Return, Pattern::Word("return")),
    (Kind::Bool, Pattern::Word("true")),
    (Kind::Bool, Pattern::Word("false")),
    (Kind::Nil, Pattern::Word("nil")),
    (Kind::Float, Pattern::Rule(float)),
    (Kind::Number, Pattern::Rule(number)),
    (Kind::Assign, Pattern::Symbols(&["+=", "-=", "*=", "/=", "%="])),
    (Kind::AddOp, Pattern::Symbols(&["==", "!=", "<=", ">="])),
    (Kind::AddOp, Pattern::Symbols(&["<", ">"])),
    (Kind::Assign, Pattern::Symbols(&["="])),
    (Kind::AddOp, Pattern::Symbols(&["+", "-"])),
    (Kind::MulOp, Pattern::Symbols(&["*", "/", "%", "^"])),
    (Kind::String, Pattern::Rule(string)),
    (Kind::LParen, Pattern::Symbols(&["("])),
    (Kind::RParen, Pattern::Symbols(&[")"])),
    (Kind::LBrack, Pattern::Symbols(&["["])),
    (Kind::RBrack, Pattern::Symbols(&["]"])),
    (Kind::LBrace, Pattern::Symbols(&["{"])),
    (Kind::RBrace, Pattern::Symbols(&["}"])),
    (Kind::Comma, Pattern::Symbols(&[","])),
    (Kind::Name, Pattern::Rule(name)),
];

fn is_word_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn digits(s: &str) -> usize {
    s.bytes().take_while(|c| c.is_ascii_digit()).count()
}

fn word(s: &str) -> usize {
    match s.bytes().next() {
        Some(c) if is_word_start(c) => s.bytes().take_while(|c| is_word(*c)).count(),
        _ => 0,
    }
}

/// `[0-9]+`
fn number(s: &str) -> Option<usize> {
    Some(digits(s)).filter(|len| *len > 0)
}

/// `[0-9]+.[0-9]+`
fn float(s: &str) -> Option<usize> {
    let whole = number(s)?;
    if s.as_bytes().get(whole) != Some(&b'.') {
        return None;
    }
    let fraction = number(&s[whole + 1..])?;
    Some(whole + 1 + fraction)
}

/// A double quoted string, with backslash escapes.
/// The escapes themselves are decoded by the parser.
fn string(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    if chars.next()?.1 != '"' {
        return None;
    }

    let mut escape = false;
    for (index, c) in chars {
        match c {
            _ if escape => escape = false,
            '\\' => escape = true,
            '"' => return Some(index + 1),
            _ => (),
        }
    }
    None
}

/// A name, optionally followed by `.field` or `:field` segments.
fn name(s: &str) -> Option<usize> {
    let mut len = word(s);
    if len == 0 {
        return None;
    }

    while let Some(b'.' | b':') = s.as_bytes().get(len) {
        let segment = word(&s[len + 1..]);
        if segment == 0 {
            break;
        }
        len += 1 + segment;
    }
    Some(len)
}

impl Pattern {
    fn matches(&self, s: &str) -> Option<usize> {
        match self {
            Pattern::Word(keyword) => {
                let whole = s.starts_with(keyword)
                    && !s.as_bytes().get(keyword.len()).copied().map_or(false, is_word);
                whole.then(|| keyword.len())
            }
            Pattern::Symbols(symbols) => symbols
                .iter()
                .find(|symbol| s.starts_with(*symbol))
                .map(|symbol| symbol.len()),
            Pattern::Rule(rule) => rule(s),
        }
    }
}

#[derive(Debug)]
pub struct Lexer {
    source: Rc<Source>,
    index: usize,
    tokens: Tokens,
}

impl Lexer {
    /// Lexes a source file into a stream of tokens.
    /// Stops at the first position no pattern matches.
    pub fn lex(source: Rc<Source>) -> Result<Tokens, Syntax> {
        let mut lexer = Lexer {
            source,
            index: 0,
            tokens: vec![],
        };

        lexer.strip()?;
        while lexer.index < lexer.source.contents.len() {
            let token = lexer.next_token()?;
            lexer.tokens.push(token);
            lexer.strip()?;
        }

        Ok(lexer.tokens)
    }

    fn remaining(&self) -> &str {
        &self.source.contents[self.index..]
    }

    /// Strips whitespace, line comments (`# ...`),
    /// and block comments (`#> ... <#`).
    fn strip(&mut self) -> Result<(), Syntax> {
        loop {
            let remaining = self.remaining();
            let trimmed = remaining.trim_start();
            let mut stripped = remaining.len() - trimmed.len();

            if trimmed.starts_with("#>") {
                match trimmed.find("<#") {
                    Some(end) => stripped += end + 2,
                    None => {
                        return Err(Syntax::lex(
                            "Block comment is never closed with `<#`",
                            &Span::new(&self.source, self.index + stripped, 2),
                        ))
                    }
                }
            } else if trimmed.starts_with('#') {
                stripped += trimmed.find('\n').unwrap_or(trimmed.len());
            }

            self.index += stripped;
            if stripped == 0 {
                return Ok(());
            }
        }
    }

    /// Produces the next token.
    /// Expects all whitespace and comments to be stripped.
    fn next_token(&mut self) -> Result<Spanned<Token>, Syntax> {
        let remaining = self.remaining();

        let found = PATTERNS
            .iter()
            .find_map(|(kind, pattern)| pattern.matches(remaining).map(|len| (*kind, len)));

        let (kind, len) = match found {
            Some(found) => found,
            None if remaining.starts_with('"') => {
                return Err(Syntax::error_with_note(
                    "Unexpected end of source while parsing string literal",
                    Note::new_with_hint(
                        "this string is never closed",
                        &Span::point(&self.source, self.index),
                    ),
                )
                .with_kind(crate::compiler::syntax::Kind::Lex));
            }
            None => {
                let unknown = remaining.chars().next().unwrap_or(' ');
                return Err(Syntax::lex(
                    &format!(
                        "The character `{}` is not recognized here, check for typos",
                        unknown,
                    ),
                    &Span::new(&self.source, self.index, unknown.len_utf8()),
                ));
            }
        };

        let lexeme = &remaining[..len];
        let span = Span::new(&self.source, self.index, len);

        // the magnitude of `i64::MIN` is allowed; the parser applies the sign
        if kind == Kind::Number && !lexeme.parse::<u64>().is_ok_and(|n| n <= i64::MIN.unsigned_abs()) {
            return Err(Syntax::lex(
                "Integer literal too large to fit in a signed 64-bit integer",
                &span,
            ));
        }

        let token = Spanned::new(Token::new(kind, lexeme), span);
        self.index += len;
        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::compiler::syntax;

    fn kinds(source: &str) -> Vec<Kind> {
        Lexer::lex(Source::source(source))
            .unwrap()
            .into_iter()
            .map(|t| t.item.kind)
            .collect()
    }

    fn lexemes(source: &str) -> Vec<String> {
        Lexer::lex(Source::source(source))
            .unwrap()
            .into_iter()
            .map(|t| t.item.lexeme)
            .collect()
    }

    proptest! {
        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let result = Lexer::lex(Source::source(&s));
            format!("{:?}", result);
        }

        #[test]
        fn integers(s in "[0-9]{1,18}") {
            let result = Lexer::lex(Source::source(&s)).unwrap();
            prop_assert_eq!(result.len(), 1);
            prop_assert_eq!(result[0].item.kind, Kind::Number);
        }

        #[test]
        fn small_positive_floats(x in 0.0..1000000.0) {
            let formatted = format!("{:.3}", x);
            let result = Lexer::lex(Source::source(&formatted));
            prop_assert!(result.is_ok());
            let unwrapped = result.unwrap();
            prop_assert!(unwrapped.len() == 1);
            prop_assert_eq!(unwrapped[0].item.kind, Kind::Float);
        }
    }

    #[test]
    fn keywords_are_whole_words() {
        assert_eq!(kinds("if iffy"), vec![Kind::If, Kind::Name]);
        assert_eq!(kinds("in index"), vec![Kind::In, Kind::Name]);
        assert_eq!(kinds("nil nile"), vec![Kind::Nil, Kind::Name]);
    }

    #[test]
    fn longest_operators_first() {
        assert_eq!(
            lexemes("a += 1 <= 2 == 3 < 4 = 5"),
            vec!["a", "+=", "1", "<=", "2", "==", "3", "<", "4", "=", "5"],
        );
        assert_eq!(
            kinds("+= <= = ^"),
            vec![Kind::Assign, Kind::AddOp, Kind::Assign, Kind::MulOp],
        );
    }

    #[test]
    fn dotted_names() {
        assert_eq!(lexemes("a.b.c Point:x"), vec!["a.b.c", "Point:x"]);
        // a trailing dot isn't part of the name
        assert!(Lexer::lex(Source::source("a.")).is_err());
    }

    #[test]
    fn comments() {
        let source = "x # the x\n#> a\nblock <# y";
        assert_eq!(lexemes(source), vec!["x", "y"]);
    }

    #[test]
    fn unclosed_block_comment() {
        assert!(Lexer::lex(Source::source("x #> forever")).is_err());
    }

    #[test]
    fn brackets() {
        assert_eq!(
            kinds("{[(])},"),
            vec![
                Kind::LBrace,
                Kind::LBrack,
                Kind::LParen,
                Kind::RBrack,
                Kind::RParen,
                Kind::RBrace,
                Kind::Comma,
            ],
        );
    }

    #[test]
    fn strings() {
        assert_eq!(lexemes(r#""a \" b" "c""#), vec![r#""a \" b""#, r#""c""#]);
    }

    #[test]
    fn unclosed_string() {
        let result = Lexer::lex(Source::source("\"asdf\"\"qwerty"));
        assert_eq!(result.unwrap_err().kind, syntax::Kind::Lex);
    }

    #[test]
    fn bad_character_position() {
        let error = Lexer::lex(Source::source("x = 1\ny = $")).unwrap_err();
        assert_eq!(error.kind, syntax::Kind::Lex);
        assert_eq!(error.position(), Some((2, 5)));
    }

    #[test]
    fn integer_overflow() {
        let result = Lexer::lex(Source::source("99999999999999999999"));
        assert_eq!(result.unwrap_err().kind, syntax::Kind::Lex);
        let result = Lexer::lex(Source::source("9223372036854775809"));
        assert_eq!(result.unwrap_err().kind, syntax::Kind::Lex);
        assert!(Lexer::lex(Source::source("-9223372036854775808")).is_ok());
    }

    #[test]
    fn floats_before_numbers() {
        assert_eq!(kinds("1.5 2"), vec![Kind::Float, Kind::Number]);
    }

    #[test]
    fn new_empty() {
        assert!(Lexer::lex(Source::source("")).unwrap().is_empty());
        assert!(Lexer::lex(Source::source("  # nothing\n")).unwrap().is_empty());
    }
}
