//! This module contains the compiler implementation.
//!
//! Source flows through three steps:
//! the `Lexer` splits it into tokens,
//! the `Parser` builds a syntax tree (splicing in required modules),
//! and `gen` lowers the tree to bytecode.

use std::rc::Rc;

pub mod ast;
pub mod gen;
pub mod lex;
pub mod module;
pub mod parse;
pub mod syntax;
pub mod token;

pub use gen::Compiler;
pub use lex::Lexer;
pub use parse::Parser;
pub use syntax::Syntax;

use crate::common::{bytecode::Bytecode, config::Config, source::Source, span::Spanned};
use ast::AST;
use token::Tokens;

#[inline(always)]
pub fn lex(source: Rc<Source>) -> Result<Tokens, Syntax> {
    Lexer::lex(source)
}

#[inline(always)]
pub fn parse(source: Rc<Source>, config: &Config) -> Result<Vec<Spanned<AST>>, Syntax> {
    let tokens = lex(Rc::clone(&source))?;
    Parser::parse(tokens, source, config)
}

#[inline(always)]
pub fn gen(source: Rc<Source>, config: &Config) -> Result<Bytecode, Syntax> {
    let ast = parse(source, config)?;
    gen::gen(&ast)
}
