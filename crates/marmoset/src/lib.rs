//! Marmoset — bytecode compiler and stack VM for a small expression language.
//!
//! The crate is the execution core of the language: it lowers an abstract
//! syntax tree to bytecode and runs that bytecode on a stack machine.
//! Lexing, parsing, and the interactive shell live outside — callers hand
//! in a [`ast::Program`] and read back a [`Value`].
//!
//! # Pipeline
//!
//! `AST → Compiler → Bytecode → Vm → Value`
//!
//! # Quick start
//!
//! ```
//! use marmoset::ast::{Expression, InfixOperator, Program, Statement};
//! use marmoset::{Compiler, Value, Vm};
//!
//! // 1 + 2
//! let program = Program {
//!     statements: vec![Statement::Expression(Expression::Infix {
//!         operator: InfixOperator::Add,
//!         left: Box::new(Expression::IntegerLiteral(1)),
//!         right: Box::new(Expression::IntegerLiteral(2)),
//!     })],
//! };
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(&program)?;
//!
//! let mut vm = Vm::new(compiler.bytecode());
//! vm.run()?;
//!
//! assert_eq!(vm.last_popped_stack_element(), Value::Integer(3));
//! # Ok::<(), marmoset::Error>(())
//! ```
//!
//! # Interactive sessions
//!
//! Both halves carry their state across inputs so a read-eval-print loop
//! accumulates definitions: [`Compiler::new_with_state`] reuses the symbol
//! table and constant pool of the previous compile, and
//! [`vm::Vm::new_with_globals_store`] reuses the globals of the previous
//! run. Global and builtin indices stay stable for the whole session.
//!
//! # Language surface
//!
//! - Integers, booleans, strings, arrays, hashes, `null`
//! - `let` bindings, first-class functions, closures, recursion
//! - Arithmetic (`+ - * /`), comparison (`== != < >`), prefix `-` and `!`
//! - `if`/`else` expressions, indexing, function calls
//! - Builtins: `len`, `first`, `last`, `rest`, `push`, `puts`, `help`,
//!   `exit`

pub mod ast;
pub mod builtins;
pub mod code;
pub mod compiler;
pub mod error;
pub mod symbols;
pub mod value;
pub mod vm;

pub use compiler::{Bytecode, Compiler};
pub use error::{Error, Result};
pub use symbols::{Symbol, SymbolScope, SymbolTable};
pub use value::{Builtin, Closure, CompiledFunction, HashKey, Value};
pub use vm::{Limits, Vm};
