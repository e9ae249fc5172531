use std::fmt;

use crate::common::span::Span;

/// Represents a note attached to a Syntax error,
/// i.e. a location in source code with an optional
/// specific hint or tip corresponding this this specific location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub span: Span,
    pub hint: Option<String>,
}

impl Note {
    pub fn new(span: Span) -> Note {
        Note { span, hint: None }
    }

    pub fn new_with_hint(hint: &str, span: &Span) -> Note {
        Note {
            span: span.clone(),
            hint: Some(hint.to_string()),
        }
    }
}

/// Which stage of compilation gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// No token pattern matches.
    Lex,
    /// No grammar production matches.
    Syntax,
    /// A required module isn't in any search directory.
    ModuleNotFound,
    /// A name or literal can't be written as a bytecode operand.
    Encoding,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Lex => "Lex Error",
            Kind::Syntax => "Syntax Error",
            Kind::ModuleNotFound => "Module Not Found",
            Kind::Encoding => "Encoding Error",
        };
        write!(f, "{}", name)
    }
}

/// Represents a static error (lexing, syntax, module resolution, encoding)
/// found before anything runs.
/// Ideally, each note included should have a distinct `Span` and hint.
/// Usually, one `Note` per error is enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub kind: Kind,
    pub reason: String,
    pub notes: Vec<Note>,
}

impl Syntax {
    /// Creates a new syntax error with a single note that does not have a hint.
    pub fn error(reason: &str, span: &Span) -> Syntax {
        Syntax::error_with_note(reason, Note::new(span.clone()))
    }

    /// Creates a new syntax error with a single note that may or may not have a
    /// hint.
    pub fn error_with_note(reason: &str, note: Note) -> Syntax {
        Syntax {
            kind: Kind::Syntax,
            reason: reason.to_string(),
            notes: vec![note],
        }
    }

    /// Creates an error without a note. It will not
    /// contain any location information, so only use it if you plan to add
    /// additional notes with [`Syntax::add_note`] later.
    pub fn error_no_note(reason: &str) -> Syntax {
        Syntax {
            kind: Kind::Syntax,
            reason: reason.to_string(),
            notes: vec![],
        }
    }

    pub fn lex(reason: &str, span: &Span) -> Syntax {
        Syntax::error(reason, span).with_kind(Kind::Lex)
    }

    pub fn module_not_found(name: &str, span: &Span) -> Syntax {
        Syntax::error_with_note(
            &format!("Cannot find `{}.sdx` anywhere in the search path", name),
            Note::new_with_hint("required here", span),
        )
        .with_kind(Kind::ModuleNotFound)
    }

    pub fn encoding(reason: &str, span: &Span) -> Syntax {
        Syntax::error(reason, span).with_kind(Kind::Encoding)
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    /// Extend a syntax error by adding another note to the error.
    pub fn add_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    /// One-based line and column of the first note, if any.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.notes.first().map(|n| n.span.position())
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in self.notes.iter() {
            let formatted = note.span.format();
            let padding = " ".repeat(formatted.gutter_padding());

            match (&note.hint, formatted.carrots()) {
                (Some(hint), Some(carrots)) => {
                    writeln!(
                        f,
                        "In {}:{}:{}",
                        formatted.path,
                        formatted.start + 1,
                        formatted.start_col + 1
                    )?;
                    writeln!(f, "{} |", padding)?;
                    writeln!(
                        f,
                        "{:>width$} | {}",
                        formatted.start + 1,
                        formatted.lines[0],
                        width = padding.len()
                    )?;
                    writeln!(
                        f,
                        "{} | {}{} {}",
                        padding,
                        " ".repeat(formatted.start_col),
                        "^".repeat(carrots.max(1)),
                        hint,
                    )?;
                }
                (Some(hint), None) => {
                    write!(f, "{}", formatted)?;
                    writeln!(f, "{} |- note: {}", padding, hint)?;
                }
                (None, _) => write!(f, "{}", formatted)?,
            }
        }
        write!(f, "{}: {}", self.kind, self.reason)
    }
}
