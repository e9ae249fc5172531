//! Contains datastructures and utility functions
//! common to both the `compiler` and `vm`.
//!
//! - Opcodes and number splicing.
//! - Bytecode chunks and their disassembly.
//! - Source code representation and span annotations.
//! - Configuration shared by both halves.

pub mod bytecode;
pub mod config;
pub mod lit;
pub mod number;
pub mod opcode;
pub mod source;
pub mod span;
