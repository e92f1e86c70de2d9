//! CIL instruction representation.
//!
//! Instructions are already decoded: the binary reader resolved every metadata token into a
//! structural reference ([`TypeRef`], [`FieldRef`], [`MethodRef`]) or a literal, so pattern
//! matching never needs the module's heaps.
//!
//! Only the opcodes the resolver detectors and the built-in collaborators reason about are
//! named individually. Everything else a reader encounters maps to [`OpCode::Other`], which
//! keeps the raw opcode value for diagnostics.

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::metadata::{
    method::MethodRef,
    typesystem::{FieldRef, TypeRef},
};

/// CIL operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum OpCode {
    /// `nop`
    Nop,
    /// `break`
    Break,
    /// `ldarg`
    Ldarg,
    /// `ldloc`
    Ldloc,
    /// `stloc`
    Stloc,
    /// `ldnull`
    Ldnull,
    /// `ldc.i4`
    LdcI4,
    /// `ldc.i8`
    LdcI8,
    /// `ldstr`
    Ldstr,
    /// `dup`
    Dup,
    /// `pop`
    Pop,
    /// `call`
    Call,
    /// `callvirt`
    Callvirt,
    /// `newobj`
    Newobj,
    /// `newarr`
    Newarr,
    /// `ldtoken`
    Ldtoken,
    /// `ldsfld`
    Ldsfld,
    /// `stsfld`
    Stsfld,
    /// `ldfld`
    Ldfld,
    /// `stfld`
    Stfld,
    /// `br`
    Br,
    /// `brtrue`
    Brtrue,
    /// `brfalse`
    Brfalse,
    /// `ret`
    Ret,
    /// `throw`
    Throw,
    /// Any other opcode; the value is the raw (possibly two-byte) encoding.
    Other(u16),
}

impl OpCode {
    /// Returns the ECMA-335 mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Break => "break",
            Self::Ldarg => "ldarg",
            Self::Ldloc => "ldloc",
            Self::Stloc => "stloc",
            Self::Ldnull => "ldnull",
            Self::LdcI4 => "ldc.i4",
            Self::LdcI8 => "ldc.i8",
            Self::Ldstr => "ldstr",
            Self::Dup => "dup",
            Self::Pop => "pop",
            Self::Call => "call",
            Self::Callvirt => "callvirt",
            Self::Newobj => "newobj",
            Self::Newarr => "newarr",
            Self::Ldtoken => "ldtoken",
            Self::Ldsfld => "ldsfld",
            Self::Stsfld => "stsfld",
            Self::Ldfld => "ldfld",
            Self::Stfld => "stfld",
            Self::Br => "br",
            Self::Brtrue => "brtrue",
            Self::Brfalse => "brfalse",
            Self::Ret => "ret",
            Self::Throw => "throw",
            Self::Other(_) => "<other>",
        }
    }

    /// Returns true for opcodes that transfer control to another method.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call | Self::Callvirt | Self::Newobj)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "<0x{raw:04x}>"),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// String literal (`ldstr`)
    String(String),
    /// Numeric literal, branch offsets and local/argument indices
    Integer(i64),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Type reference
    Type(TypeRef),
}

/// A decoded CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the instruction within the method body
    pub offset: u32,
    /// Operation
    pub opcode: OpCode,
    /// Operand
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction at offset 0.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Self {
            offset: 0,
            opcode,
            operand,
        }
    }

    /// Creates an instruction without an operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// `ldstr value`
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::new(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// `call method`
    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Self::new(OpCode::Call, Operand::Method(method))
    }

    /// `newobj ctor`
    #[must_use]
    pub fn newobj(ctor: MethodRef) -> Self {
        Self::new(OpCode::Newobj, Operand::Method(ctor))
    }

    /// `stsfld field`
    #[must_use]
    pub fn stsfld(field: FieldRef) -> Self {
        Self::new(OpCode::Stsfld, Operand::Field(field))
    }

    /// `ldtoken field`
    #[must_use]
    pub fn ldtoken_field(field: FieldRef) -> Self {
        Self::new(OpCode::Ldtoken, Operand::Field(field))
    }

    /// Returns a copy placed at `offset`.
    #[must_use]
    pub fn at(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// The string operand, if any.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match &self.operand {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    /// The method operand, if any.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(m) => Some(m),
            _ => None,
        }
    }

    /// The field operand, if any.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::String(s) => write!(f, " \"{s}\""),
            Operand::Integer(v) => write!(f, " {v}"),
            Operand::Field(field) => write!(
                f,
                " {} {}::{}",
                field.field_type,
                field.declaring_type.full_name(),
                field.name
            ),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::Type(ty) => write!(f, " {}", ty.full_name()),
        }
    }
}
