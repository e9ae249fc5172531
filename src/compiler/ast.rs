use std::fmt::{self, Display};

use crate::common::{lit::Lit, opcode::Opcode, span::Spanned};

/// Binary operators.
/// `+ -` and the comparisons share the loose tier,
/// `* / % ^` bind tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        use BinOp::*;
        Some(match symbol {
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Mod,
            "^" => Pow,
            "==" => Eq,
            "!=" => Ne,
            "<" => Lt,
            ">" => Gt,
            "<=" => Le,
            ">=" => Ge,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        use BinOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Pow => "^",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
        }
    }

    pub fn opcode(&self) -> Opcode {
        use BinOp::*;
        match self {
            Add => Opcode::Add,
            Sub => Opcode::Sub,
            Mul => Opcode::Mul,
            Div => Opcode::Div,
            Mod => Opcode::Mod,
            Pow => Opcode::Pow,
            Eq => Opcode::Eq,
            Ne => Opcode::Ne,
            Lt => Opcode::Lt,
            Gt => Opcode::Gt,
            Le => Opcode::Le,
            Ge => Opcode::Ge,
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Represents an item in the syntax tree,
/// which is the direct result of parsing.
/// Each syntax-level construct has its own `AST` variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AST {
    Lit(Lit),
    /// A possibly dotted variable path.
    Name(String),
    /// `name = expr`, or `name op= expr` when `op` is set.
    Assign {
        name: String,
        op: Option<BinOp>,
        expr: Box<Spanned<AST>>,
    },
    Call {
        callee: Box<Spanned<AST>>,
        args: Vec<Spanned<AST>>,
    },
    New {
        callee: Box<Spanned<AST>>,
        args: Vec<Spanned<AST>>,
    },
    Op {
        op: BinOp,
        lhs: Box<Spanned<AST>>,
        rhs: Box<Spanned<AST>>,
    },
    If {
        cond: Box<Spanned<AST>>,
        then: Box<Spanned<AST>>,
        other: Option<Box<Spanned<AST>>>,
    },
    While {
        cond: Box<Spanned<AST>>,
        body: Box<Spanned<AST>>,
    },
    /// `for x in source body`; the binding is optional.
    For {
        binding: Option<String>,
        source: Box<Spanned<AST>>,
        body: Box<Spanned<AST>>,
    },
    Fn {
        name: String,
        params: Vec<String>,
        body: Box<Spanned<AST>>,
    },
    Object {
        name: String,
        params: Vec<String>,
        body: Box<Spanned<AST>>,
    },
    List(Vec<Spanned<AST>>),
    Block(Vec<Spanned<AST>>),
    /// A resolved module: its top level nodes.
    Require {
        module: String,
        body: Vec<Spanned<AST>>,
    },
    Return(Box<Spanned<AST>>),
}

impl AST {
    /// Shortcut for creating an `AST::Op` variant.
    pub fn op(op: BinOp, lhs: Spanned<AST>, rhs: Spanned<AST>) -> AST {
        AST::Op {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn name(name: &str) -> AST {
        AST::Name(name.to_string())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn symbols_round_trip(op in any::<BinOp>()) {
            prop_assert_eq!(BinOp::from_symbol(op.symbol()), Some(op));
        }

        #[test]
        fn opcodes_dispatch(op in any::<BinOp>()) {
            prop_assert!(op.opcode().capability().is_some());
        }
    }

    #[test]
    fn unknown_symbol() {
        assert_eq!(BinOp::from_symbol("="), None);
        assert_eq!(BinOp::from_symbol("+="), None);
    }
}
