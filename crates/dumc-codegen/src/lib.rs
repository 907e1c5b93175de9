//! dumc-codegen — register allocation, x86-64 encoding and the AST-to-machine-code walker.
//!
//! [`compile_program`] is the crate's single entry point: it lowers a whole
//! [`dumc_ast::Program`] to a flat `.text` buffer plus the function symbols
//! an object writer turns into an ELF symbol table.

#![forbid(unsafe_code)]

mod codegen;
mod encoder;
mod jumptable;
mod regalloc;
mod scope;

pub use codegen::{compile_program, CompiledFunction, CompiledProgram};
pub use encoder::{Cc, Encoder, Reg, PARAM_REGS, PRESERVED_REGS};
pub use jumptable::{JumpTable, Label, OpKind};
pub use regalloc::RegAlloc;
pub use scope::{Scope, ScopeEntry};

use thiserror::Error;

/// Errors rooted in what the program *means*, independent of register
/// pressure or instruction encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),
    #[error("'{0}' is already declared in this scope")]
    DuplicateDeclaration(String),
    #[error("cannot assign to immutable binding '{0}'")]
    AssignToImmutable(String),
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
}

/// Errors raised while lowering a well-parsed program to machine code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error("out of scratch registers")]
    OutOfRegisters,
    #[error("unresolved jump remained at function end (break/continue outside a loop)")]
    UnresolvedJump,
    #[error("unsupported expression: {0}")]
    Unsupported(&'static str),
}
