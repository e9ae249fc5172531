//! # Sardonyx
//! This repository contains the core of the Sardonyx scripting language:
//! a lexer and parser, a compiler to a byte-oriented bytecode,
//! and a stack VM that dispatches every operation through
//! per-value capability tables.
//! The `sdx` binary wraps it in a script runner and a REPL.
//!
//! ## Embedding Sardonyx in Rust
//! ```ignore
//! use sardonyx::{Config, Source};
//!
//! fn main() {
//!     let vm = sardonyx::run(Source::source("print(\"Hello from Sardonyx!\")"), &Config::default());
//!     if let Err(error) = vm {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```
//!
//! ## Overview of the compilation process
//! Source code is represented as a `Source` object.
//! `compiler::lex` splits it into tokens,
//! `compiler::parse` builds a tree, splicing in `require`d modules,
//! and `compiler::gen` lowers it to `Bytecode`.
//! A `VM` then runs the bytecode until it ends.
//! Each step returns the first error it finds:
//! a `Syntax` error before running, a `Trace` while running.

use std::{fmt, rc::Rc};

pub mod common;
pub mod compiler;
pub mod kernel;
pub mod vm;

pub use common::{bytecode::Bytecode, config::Config, source::Source, span::Spanned};
pub use compiler::{ast::AST, syntax::Syntax, token::Tokens};
pub use kernel::Output;
pub use vm::{trace::Trace, value::Value, vm::VM};

/// Either kind of error the pipeline can stop with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Syntax(Syntax),
    Trace(Trace),
}

impl From<Syntax> for Error {
    fn from(syntax: Syntax) -> Error {
        Error::Syntax(syntax)
    }
}

impl From<Trace> for Error {
    fn from(trace: Trace) -> Error {
        Error::Trace(trace)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax(syntax) => fmt::Display::fmt(syntax, f),
            Error::Trace(trace) => fmt::Display::fmt(trace, f),
        }
    }
}

impl std::error::Error for Error {}

#[inline(always)]
pub fn lex(source: Rc<Source>) -> Result<Tokens, Syntax> {
    compiler::lex(source)
}

#[inline(always)]
pub fn parse(source: Rc<Source>, config: &Config) -> Result<Vec<Spanned<AST>>, Syntax> {
    compiler::parse(source, config)
}

#[inline(always)]
pub fn compile(source: Rc<Source>, config: &Config) -> Result<Bytecode, Syntax> {
    compiler::gen(source, config)
}

/// Compiles and runs a program on a fresh VM,
/// returning the VM so its final stack and scope can be inspected.
pub fn run(source: Rc<Source>, config: &Config) -> Result<VM, Error> {
    run_with(source, config, Output::Stdout)
}

/// Like `run`, with `print` writing to `output`.
pub fn run_with(source: Rc<Source>, config: &Config, output: Output) -> Result<VM, Error> {
    let bytecode = compile(source, config)?;
    let mut vm = VM::with_output(config.clone(), output);
    vm.load(bytecode);
    vm.run()?;
    Ok(vm)
}
