//! Filler-tolerant opcode sequence matching.
//!
//! Obfuscators pad generated code with instructions that have no effect (`nop` by default),
//! varying the padding between builds. [`PatternScanner`] matches an ordered list of opcodes
//! against an instruction stream while skipping such filler between the matched elements, so
//! a pattern survives re-padding without relying on exact offsets.
//!
//! # Example
//!
//! ```rust
//! use dotresolve::assembly::{Instruction, OpCode, PatternScanner};
//!
//! let stream = vec![
//!     Instruction::ldstr("X"),
//!     Instruction::simple(OpCode::Nop),
//!     Instruction::simple(OpCode::Ret),
//! ];
//! let scanner = PatternScanner::default();
//! let found = scanner.find(&stream, 0, &[OpCode::Ldstr, OpCode::Ret]).unwrap();
//! assert_eq!(found.instructions.len(), 2);
//! assert_eq!(found.start, 0);
//! assert_eq!(found.end, 3);
//! ```

use crate::assembly::{Instruction, OpCode};

/// A run of instructions matching a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMatch<'a> {
    /// Index of the first matched instruction
    pub start: usize,
    /// Index one past the last matched instruction
    pub end: usize,
    /// The matched instructions, one per pattern element, filler excluded
    pub instructions: Vec<&'a Instruction>,
}

/// Sliding-window opcode matcher.
#[derive(Debug, Clone)]
pub struct PatternScanner {
    filler: Vec<OpCode>,
}

impl Default for PatternScanner {
    fn default() -> Self {
        Self::new(vec![OpCode::Nop])
    }
}

impl PatternScanner {
    /// Creates a scanner that skips the given filler opcodes between pattern elements.
    #[must_use]
    pub fn new(filler: Vec<OpCode>) -> Self {
        Self { filler }
    }

    /// Opcodes treated as skippable filler.
    #[must_use]
    pub fn filler(&self) -> &[OpCode] {
        &self.filler
    }

    /// Returns true if `opcode` is skippable filler.
    #[must_use]
    pub fn is_filler(&self, opcode: OpCode) -> bool {
        self.filler.contains(&opcode)
    }

    /// Finds the first run at or after `start` whose opcodes equal `pattern`.
    ///
    /// The first pattern element must sit exactly at the start of the run; filler is only
    /// skipped between elements. An element that is itself a filler opcode matches directly.
    /// Returns `None` for an empty pattern or when no run exists before the end of the stream.
    #[must_use]
    pub fn find<'a>(
        &self,
        instructions: &'a [Instruction],
        start: usize,
        pattern: &[OpCode],
    ) -> Option<SequenceMatch<'a>> {
        if pattern.is_empty() {
            return None;
        }

        (start..instructions.len()).find_map(|pos| self.match_at(instructions, pos, pattern))
    }

    /// Iterates over every match in the stream, in order of their start index.
    pub fn find_all<'a, 'p>(
        &'p self,
        instructions: &'a [Instruction],
        pattern: &'p [OpCode],
    ) -> impl Iterator<Item = SequenceMatch<'a>> + 'p
    where
        'a: 'p,
    {
        let mut next = 0;
        std::iter::from_fn(move || {
            let found = self.find(instructions, next, pattern)?;
            next = found.start + 1;
            Some(found)
        })
    }

    fn match_at<'a>(
        &self,
        instructions: &'a [Instruction],
        pos: usize,
        pattern: &[OpCode],
    ) -> Option<SequenceMatch<'a>> {
        let first = instructions.get(pos)?;
        if first.opcode != pattern[0] {
            return None;
        }

        let mut matched = Vec::with_capacity(pattern.len());
        matched.push(first);
        let mut cursor = pos + 1;

        for expected in &pattern[1..] {
            loop {
                let instr = instructions.get(cursor)?;
                cursor += 1;
                if instr.opcode == *expected {
                    matched.push(instr);
                    break;
                }
                if !self.is_filler(instr.opcode) {
                    return None;
                }
            }
        }

        Some(SequenceMatch {
            start: pos,
            end: cursor,
            instructions: matched,
        })
    }
}

/// Finds `pattern` at or after `start`, skipping `nop` filler.
///
/// Shorthand for [`PatternScanner::default`] followed by [`PatternScanner::find`], returning
/// only the matched instructions.
#[must_use]
pub fn find_sequence<'a>(
    instructions: &'a [Instruction],
    start: usize,
    pattern: &[OpCode],
) -> Option<Vec<&'a Instruction>> {
    PatternScanner::default()
        .find(instructions, start, pattern)
        .map(|m| m.instructions)
}
