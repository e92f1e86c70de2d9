//! Metadata tokens identifying types, methods and fields within a module.
//!
//! A token packs the owning table in the top byte and a 1-based row in the lower 24 bits,
//! mirroring ECMA-335 §II.22. Detectors and candidates refer to declarations through tokens
//! instead of borrowing them, so a module can be mutated (normalized) while a candidate is alive.

use std::fmt;

/// Table identifier of the `TypeDef` table.
pub const TABLE_TYPEDEF: u8 = 0x02;
/// Table identifier of the `Field` table.
pub const TABLE_FIELD: u8 = 0x04;
/// Table identifier of the `MethodDef` table.
pub const TABLE_METHODDEF: u8 = 0x06;
/// Table identifier of the `ManifestResource` table.
pub const TABLE_MANIFESTRESOURCE: u8 = 0x28;

/// A metadata token (`table << 24 | row`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Creates a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table identifier and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Token of the `TypeDef` row at `row`.
    #[must_use]
    pub fn typedef(row: u32) -> Self {
        Self::from_parts(TABLE_TYPEDEF, row)
    }

    /// Token of the `MethodDef` row at `row`.
    #[must_use]
    pub fn methoddef(row: u32) -> Self {
        Self::from_parts(TABLE_METHODDEF, row)
    }

    /// Token of the `Field` row at `row`.
    #[must_use]
    pub fn field(row: u32) -> Self {
        Self::from_parts(TABLE_FIELD, row)
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table identifier.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns the 0-based index into the owning table, `None` for the null row.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self.row() {
            0 => None,
            row => Some((row - 1) as usize),
        }
    }

    /// Returns true for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
