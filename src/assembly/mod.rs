//! Decoded CIL instructions and opcode pattern matching.
//!
//! # Key Components
//!
//! - [`Instruction`], [`OpCode`], [`Operand`] - The decoded instruction model
//! - [`PatternScanner`] - Filler-tolerant opcode sequence matcher
//! - [`find_sequence`] - Convenience wrapper using the default filler set

mod instruction;
mod pattern;

pub use instruction::{Instruction, OpCode, Operand};
pub use pattern::{find_sequence, PatternScanner, SequenceMatch};
