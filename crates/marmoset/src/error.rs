//! Error types shared by the compiler and the virtual machine.
//!
//! One enum covers both surfaces: compile errors come back from
//! [`crate::compiler::Compiler::compile`] and runtime errors from
//! [`crate::vm::Vm::run`]. Message texts are part of the contract — the
//! end-to-end tests compare them verbatim.
//!
//! Note that a failing builtin (`len(1)`) is *not* an error on this surface:
//! it produces a first-class [`crate::value::Value::Error`] and execution
//! continues.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // --- Compile errors ---
    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    // --- Runtime errors ---
    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("integer divide by zero")]
    DivideByZero,

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("index operator not supported: {0}")]
    NotIndexable(&'static str),

    #[error("calling non-closure and non-builtin")]
    NotCallable,

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("not a function: {0}")]
    NotAFunction(&'static str),

    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
