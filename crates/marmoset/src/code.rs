//! Bytecode instruction set and encoder.
//!
//! This module defines the opcode catalog the compiler emits and the VM
//! executes, plus the byte-level encoding: one opcode byte followed by zero
//! or more big-endian operands of fixed widths. [`make`] produces encoded
//! instructions, [`read_operands`] is its inverse, and [`Instructions`]
//! renders an offset-labeled disassembly through `Display`.
//!
//! The catalog order is stable: it is the wire-level contract for anything
//! that compares raw bytes.

use std::fmt;
use std::ops::{Deref, DerefMut};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Opcode catalog
// ---------------------------------------------------------------------------

/// A single-byte instruction tag.
///
/// Operand widths are declared per opcode in [`Op::definition`]. Jump targets
/// are absolute byte offsets within the instruction stream of the function
/// being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Op {
    /// Push `constants[idx]` onto the stack. Operand: 2-byte constant index.
    Constant,
    /// Pop two values, push their sum (Integer + Integer, or String
    /// concatenation).
    Add,
    /// Discard the top-of-stack value.
    Pop,
    /// Pop two values, push their difference.
    Sub,
    /// Pop two values, push their product.
    Mul,
    /// Pop two values, push their quotient. A zero divisor is a runtime
    /// error.
    Div,
    /// Push the `true` singleton.
    True,
    /// Push the `false` singleton.
    False,
    /// Pop two values, push whether they are equal.
    Equal,
    /// Pop two values, push whether they are unequal.
    NotEqual,
    /// Pop two Integers, push whether the deeper one is greater.
    GreaterThan,
    /// Pop an Integer, push its negation.
    Minus,
    /// Pop a value, push its logical inverse (truthiness-based).
    Bang,
    /// Unconditional jump. Operand: 2-byte absolute offset.
    Jump,
    /// Pop a value; jump if it is not truthy. Operand: 2-byte absolute
    /// offset.
    JumpNotTruthy,
    /// Push the `null` singleton.
    Null,
    /// Pop a value into the globals store. Operand: 2-byte global index.
    SetGlobal,
    /// Push a value from the globals store. Operand: 2-byte global index.
    GetGlobal,
    /// Pop N values, push an Array of them. Operand: 2-byte element count.
    Array,
    /// Pop 2N values as key/value pairs, push a Hash. Operand: 2-byte count
    /// of keys plus values.
    Hash,
    /// Pop an index and a receiver, push `receiver[index]`.
    Index,
    /// Call the value sitting below the arguments. Operand: 1-byte argument
    /// count.
    Call,
    /// Pop the return value, unwind the current frame, push the value.
    ReturnValue,
    /// Unwind the current frame, push `null`.
    Return,
    /// Pop a value into a frame-local slot. Operand: 1-byte local index.
    SetLocal,
    /// Push a value from a frame-local slot. Operand: 1-byte local index.
    GetLocal,
    /// Push a builtin by registry index. Operand: 1-byte builtin index.
    GetBuiltin,
    /// Pop captured free values and wrap `constants[idx]` into a closure.
    /// Operands: 2-byte constant index, 1-byte free-variable count.
    Closure,
    /// Push a captured free value of the current closure. Operand: 1-byte
    /// free-variable index.
    GetFree,
}

/// Name and operand layout of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    /// Human-readable opcode name, as shown in disassembly.
    pub name: &'static str,
    /// Width in bytes of each operand, in order.
    pub operand_widths: &'static [usize],
}

impl Op {
    /// The name and operand-width table entry for this opcode.
    pub fn definition(self) -> Definition {
        let (name, operand_widths): (&'static str, &'static [usize]) = match self {
            Op::Constant => ("Constant", &[2]),
            Op::Add => ("Add", &[]),
            Op::Pop => ("Pop", &[]),
            Op::Sub => ("Sub", &[]),
            Op::Mul => ("Mul", &[]),
            Op::Div => ("Div", &[]),
            Op::True => ("True", &[]),
            Op::False => ("False", &[]),
            Op::Equal => ("Equal", &[]),
            Op::NotEqual => ("NotEqual", &[]),
            Op::GreaterThan => ("GreaterThan", &[]),
            Op::Minus => ("Minus", &[]),
            Op::Bang => ("Bang", &[]),
            Op::Jump => ("Jump", &[2]),
            Op::JumpNotTruthy => ("JumpNotTruthy", &[2]),
            Op::Null => ("Null", &[]),
            Op::SetGlobal => ("SetGlobal", &[2]),
            Op::GetGlobal => ("GetGlobal", &[2]),
            Op::Array => ("Array", &[2]),
            Op::Hash => ("Hash", &[2]),
            Op::Index => ("Index", &[]),
            Op::Call => ("Call", &[1]),
            Op::ReturnValue => ("ReturnValue", &[]),
            Op::Return => ("Return", &[]),
            Op::SetLocal => ("SetLocal", &[1]),
            Op::GetLocal => ("GetLocal", &[1]),
            Op::GetBuiltin => ("GetBuiltin", &[1]),
            Op::Closure => ("Closure", &[2, 1]),
            Op::GetFree => ("GetFree", &[1]),
        };
        Definition {
            name,
            operand_widths,
        }
    }
}

/// Look up the definition for a raw opcode byte.
///
/// Bytes outside the catalog produce `Error::UnknownOpcode`; the catalog
/// itself is closed, so this is the only place an "unknown opcode" can
/// surface outside the VM's decode step.
pub fn lookup(opcode: u8) -> Result<Definition> {
    let op = Op::try_from(opcode).map_err(|_| Error::UnknownOpcode(opcode))?;
    Ok(op.definition())
}

// ---------------------------------------------------------------------------
// Encoding and decoding
// ---------------------------------------------------------------------------

/// Encode an instruction: the opcode byte followed by its operands, each
/// laid out big-endian at the width declared by the opcode's definition.
///
/// Surplus operands are ignored; missing ones are not padded. The compiler
/// always supplies exactly the declared count.
pub fn make(op: Op, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();
    let len = 1 + def.operand_widths.iter().sum::<usize>();

    let mut instruction = Vec::with_capacity(len);
    instruction.push(op.into());

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => unreachable!("operand width {width} is not part of the encoding"),
        }
    }

    instruction
}

/// Decode the operands of one instruction, given its definition and the
/// bytes *after* the opcode. Returns the operands and how many bytes they
/// occupied.
pub fn read_operands(def: &Definition, instruction: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(&instruction[offset..]) as usize),
            1 => operands.push(instruction[offset] as usize),
            _ => unreachable!("operand width {width} is not part of the encoding"),
        }
        offset += width;
    }

    (operands, offset)
}

/// Read a big-endian 2-byte operand. The VM uses this directly in its
/// dispatch loop instead of going through [`read_operands`].
#[inline]
pub fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Read a 1-byte operand.
#[inline]
pub fn read_u8(bytes: &[u8]) -> u8 {
    bytes[0]
}

// ---------------------------------------------------------------------------
// Instruction streams
// ---------------------------------------------------------------------------

/// An encoded instruction stream. Positions are byte offsets; jump targets
/// are absolute offsets within one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }
}

impl Deref for Instructions {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Instructions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }
}

/// Disassembly: each instruction on its own line as
/// `NNNN OPNAME OP1 OP2 …` with a zero-padded 4-digit byte offset. Every
/// line is newline-terminated, including the last.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut i = 0;
        while i < self.0.len() {
            let def = match lookup(self.0[i]) {
                Ok(def) => def,
                Err(err) => {
                    writeln!(f, "ERROR: {err}")?;
                    i += 1;
                    continue;
                }
            };

            let (operands, read) = read_operands(&def, &self.0[i + 1..]);

            write!(f, "{i:04} {}", def.name)?;
            for operand in &operands {
                write!(f, " {operand}")?;
            }
            writeln!(f)?;

            i += 1 + read;
        }
        Ok(())
    }
}
