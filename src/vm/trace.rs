use std::fmt;

use crate::common::span::Span;

/// What went wrong at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NoSuchVariable,
    /// A value lacks the capability an operation needs.
    UnsupportedOperation,
    NotCallable,
    ArityMismatch,
    StackUnderflow,
    /// Integer division by zero or overflow.
    Arithmetic,
    RecursionLimit,
    /// The bytecode could not be decoded.
    Malformed,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fault::NoSuchVariable => "Name",
            Fault::UnsupportedOperation => "Operation",
            Fault::NotCallable => "Call",
            Fault::ArityMismatch => "Arity",
            Fault::StackUnderflow => "Stack",
            Fault::Arithmetic => "Arithmetic",
            Fault::RecursionLimit => "Recursion",
            Fault::Malformed => "Bytecode",
        };
        write!(f, "{}", name)
    }
}

/// Represents a runtime error, i.e. a traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub kind: Fault,
    pub message: String,
    spans: Vec<Span>,
}

impl Trace {
    /// Creates a new traceback
    pub fn error(kind: Fault, message: &str, spans: Vec<Span>) -> Trace {
        Trace {
            kind,
            message: message.to_string(),
            spans,
        }
    }

    /// A traceback with no location yet;
    /// the VM attaches the span of the failing instruction.
    pub fn fault(kind: Fault, message: &str) -> Trace {
        Trace::error(kind, message, vec![])
    }

    /// Used to add context (i.e. function calls) while unwinding the stack.
    pub fn add_context(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn with_context(mut self, span: Option<&Span>) -> Trace {
        if let Some(span) = span {
            self.add_context(span.clone());
        }
        self
    }

    /// Innermost first.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback, most recent call last:")?;

        for span in self.spans.iter().rev() {
            fmt::Display::fmt(span, f)?;
        }

        write!(f, "Runtime {} Error: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn traceback() {
        let source = Source::source("fn half(x) x / 0\nhalf(3)\n");
        let target = "\
            Traceback, most recent call last:\n\
            In ./source:2:1\n  \
              |\n\
            2 | half(3)\n  \
              | ^^^^^^^\n\
            In ./source:1:12\n  \
              |\n\
            1 | fn half(x) x / 0\n  \
              |            ^^^^^\n\
            Runtime Arithmetic Error: Division by zero";

        let mut traceback = Trace::error(
            Fault::Arithmetic,
            "Division by zero",
            vec![Span::new(&source, 11, 5)],
        );
        traceback.add_context(Span::new(&source, 17, 7));

        assert_eq!(format!("{}", traceback), target);
    }

    #[test]
    fn context_is_optional() {
        let trace = Trace::fault(Fault::NotCallable, "Cannot call 1").with_context(None);
        assert!(trace.spans().is_empty());
        assert_eq!(
            format!("{}", trace),
            "Traceback, most recent call last:\nRuntime Call Error: Cannot call 1"
        );
    }
}
