//! Runtime value model.
//!
//! Values are small tagged handles: Array, Hash, String, and function
//! payloads sit behind `Rc`, so pushing a value onto the VM stack clones a
//! pointer, not a payload. The VM is single-threaded, hence `Rc` rather
//! than `Arc`.
//!
//! Arrays and Hashes are immutable as far as the instruction set is
//! concerned — no opcode mutates them; builtins like `push` build new ones.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::code::Instructions;
use crate::error::{Error, Result};

/// Host procedure behind a [`Value::Builtin`] handle.
///
/// Builtins never fail the VM: misuse is reported as a first-class
/// [`Value::Error`] flowing back through the stack. A builtin with nothing
/// to say returns [`Value::Null`].
pub type BuiltinFn = fn(&[Value]) -> Value;

/// An opaque, copyable handle to a host-provided procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// Bytecode plus the metadata the calling convention needs: how many stack
/// slots to reserve for locals and how many arguments the function expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the free-variable values captured when
/// the `Closure` opcode constructed it, in source capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Str(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashMap<HashKey, Value>>),
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// A first-class error produced by builtins. Not a VM failure —
    /// execution continues and the value flows like any other.
    Error(String),
}

/// Key derived from a hashable value.
///
/// Only Integer, Boolean, and String values are hashable. The key carries
/// the source scalar itself, so equal values yield equal keys, distinct
/// values yield distinct keys, and the key preserves its source form for
/// inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(Rc<str>),
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Integer(value) => write!(f, "{value}"),
            HashKey::Boolean(value) => write!(f, "{value}"),
            HashKey::Str(value) => f.write_str(value),
        }
    }
}

impl Value {
    /// Uppercase kind name, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// Everything is truthy except `false` and `null`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    /// Derive the hash key for this value, or fail for unhashable kinds.
    pub fn hash_key(&self) -> Result<HashKey> {
        match self {
            Value::Integer(value) => Ok(HashKey::Integer(*value)),
            Value::Boolean(value) => Ok(HashKey::Boolean(*value)),
            Value::Str(value) => Ok(HashKey::Str(Rc::clone(value))),
            other => Err(Error::UnusableHashKey(other.type_name())),
        }
    }

    /// Human-readable rendering: integers and booleans in their natural
    /// form, strings without quotes, `null` for Null, bracket/brace syntax
    /// for Arrays and Hashes.
    pub fn inspect(&self) -> String {
        match self {
            Value::Integer(value) => value.to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Str(value) => value.to_string(),
            Value::Null => "null".to_string(),
            Value::Array(elements) => {
                let elements: Vec<String> = elements.iter().map(Value::inspect).collect();
                format!("[{}]", elements.join(", "))
            }
            Value::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{key}: {}", value.inspect()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Value::Function(func) => format!("CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Value::Closure(closure) => format!("Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => "builtin function".to_string(),
            Value::Error(message) => format!("ERROR: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_hash_keys_follow_content() {
        let hello1 = Value::Str("Hello World".into());
        let hello2 = Value::Str("Hello World".into());
        let diff = Value::Str("My name is johnny".into());

        assert_eq!(hello1.hash_key().unwrap(), hello2.hash_key().unwrap());
        assert_ne!(hello1.hash_key().unwrap(), diff.hash_key().unwrap());
    }

    #[test]
    fn scalar_hash_keys_follow_content() {
        assert_eq!(
            Value::Integer(1).hash_key().unwrap(),
            Value::Integer(1).hash_key().unwrap()
        );
        assert_ne!(
            Value::Integer(1).hash_key().unwrap(),
            Value::Integer(2).hash_key().unwrap()
        );
        assert_eq!(
            Value::Boolean(true).hash_key().unwrap(),
            Value::Boolean(true).hash_key().unwrap()
        );
        assert_ne!(
            Value::Boolean(true).hash_key().unwrap(),
            Value::Boolean(false).hash_key().unwrap()
        );
    }

    #[test]
    fn only_scalars_and_strings_hash() {
        let array = Value::Array(Rc::new(vec![Value::Integer(1)]));
        assert_eq!(array.hash_key(), Err(Error::UnusableHashKey("ARRAY")));
        assert_eq!(Value::Null.hash_key(), Err(Error::UnusableHashKey("NULL")));
    }

    #[test]
    fn inspect_renders_natural_forms() {
        assert_eq!(Value::Integer(-7).inspect(), "-7");
        assert_eq!(Value::Boolean(true).inspect(), "true");
        assert_eq!(Value::Str("monkey business".into()).inspect(), "monkey business");
        assert_eq!(Value::Null.inspect(), "null");
        assert_eq!(
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Str("two".into())])).inspect(),
            "[1, two]"
        );
        assert_eq!(Value::Error("boom".to_string()).inspect(), "ERROR: boom");
    }

    #[test]
    fn truthiness_is_not_false_and_not_null() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Str("".into()).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }
}
