//! This module contains the core VM implementation.
//! Values carry capability tables (`capability`),
//! names live in `Scope`s copied into each nested VM,
//! and runtime errors unwind as a `Trace`.

pub mod capability;
pub mod env;
pub mod scope;
pub mod trace;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;

pub use trace::{Fault, Trace};
pub use value::Value;
pub use vm::VM;
