use std::fmt::{Display, Formatter, Result};

/// Literal values, as they appear in source code.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Integer(i64),
    Float(f64),
    /// A UTF-8 encoded string, escapes already decoded.
    String(String),
    Boolean(bool),
    Nil,
}

impl Lit {
    /// The operand text a literal is stored as in bytecode.
    /// `Nil` has no operand.
    pub fn operand(&self) -> Option<String> {
        Some(match self {
            Lit::Integer(n) => n.to_string(),
            // `{:?}` keeps the fractional part, so `1.0` stays a float
            Lit::Float(n) => format!("{:?}", n),
            Lit::String(s) => s.clone(),
            Lit::Boolean(b) => b.to_string(),
            Lit::Nil => return None,
        })
    }
}

impl Display for Lit {
    /// Displays a literal the way it would be written in source.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Lit::Integer(n) => write!(f, "{}", n),
            Lit::Float(n) => write!(f, "{:?}", n),
            Lit::String(s) => write!(f, "{:?}", s),
            Lit::Boolean(b) => write!(f, "{}", b),
            Lit::Nil => write!(f, "nil"),
        }
    }
}
