//! Method declarations, bodies, signatures and method references.
//!
//! A [`MethodDeclaration`] is owned by the module's method table. Its [`MethodBody`] is a
//! plain value: normalization produces a new body which the owner writes back through
//! [`crate::metadata::module::Module::replace_body`], so two detectors looking at the same
//! method never observe a half-rewritten instruction stream.

use std::fmt;

use bitflags::bitflags;

use crate::{
    assembly::Instruction,
    metadata::{
        token::Token,
        typesystem::{wellknown, TypeRef},
    },
};

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    /// Method modifier flags (ECMA-335 §II.23.1.10)
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

/// Return and parameter types of a method, as fully qualified type names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Return type
    pub return_type: String,
    /// Parameter types, in order
    pub params: Vec<String>,
}

impl MethodSignature {
    /// Creates a new signature.
    pub fn new(return_type: impl Into<String>, params: &[&str]) -> Self {
        Self {
            return_type: return_type.into(),
            params: params.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// `System.Void()` - no parameters, no return value.
    #[must_use]
    pub fn void() -> Self {
        Self::new(wellknown::VOID, &[])
    }

    /// Returns true if the signature is exactly `return_type(params...)`.
    #[must_use]
    pub fn is(&self, return_type: &str, params: &[&str]) -> bool {
        self.return_type == return_type
            && self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| a == b)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.return_type, self.params.join(","))
    }
}

/// A reference to a method, as carried by `call`/`callvirt`/`newobj` operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    /// Method name
    pub name: String,
    /// Type declaring the method
    pub declaring_type: TypeRef,
    /// Method signature
    pub signature: MethodSignature,
}

impl MethodRef {
    /// Creates a new method reference.
    pub fn new(declaring_type: TypeRef, name: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            signature,
        }
    }

    /// Structural method identity: same name and signature on a matching declaring type.
    #[must_use]
    pub fn matches(&self, other: &MethodRef) -> bool {
        self.name == other.name
            && self.signature == other.signature
            && self.declaring_type.matches(&other.declaring_type)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}({})",
            self.signature.return_type,
            self.declaring_type.full_name(),
            self.name,
            self.signature.params.join(",")
        )
    }
}

/// The CIL body of a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Instruction stream, in execution-layout order
    pub instructions: Vec<Instruction>,
    /// Declared local variable types
    pub locals: Vec<String>,
}

impl MethodBody {
    /// Creates a body from instructions and local variable types.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>, locals: Vec<String>) -> Self {
        Self {
            instructions,
            locals,
        }
    }

    /// Number of declared local variables.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

/// A method declared on a type.
#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    /// Token of this method
    pub token: Token,
    /// Method name
    pub name: String,
    /// Declaring type
    pub declaring_type: Token,
    /// Modifier flags
    pub modifiers: MethodModifiers,
    /// Method signature
    pub signature: MethodSignature,
    /// Method body, `None` for abstract, extern and runtime methods
    pub body: Option<MethodBody>,
}

impl MethodDeclaration {
    /// Returns true if the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodModifiers::STATIC)
    }

    /// Returns true if the method has a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Returns true for instance constructors.
    #[must_use]
    pub fn is_ctor(&self) -> bool {
        !self.is_static() && self.name == wellknown::CTOR
    }

    /// Returns the instructions of the body, empty when there is none.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        self.body
            .as_ref()
            .map_or(&[], |body| body.instructions.as_slice())
    }

    /// Number of declared locals, zero when there is no body.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.body.as_ref().map_or(0, MethodBody::local_count)
    }

    /// Builds a structural reference to this method given its declaring type.
    #[must_use]
    pub fn as_ref(&self, declaring_type: TypeRef) -> MethodRef {
        MethodRef::new(declaring_type, self.name.clone(), self.signature.clone())
    }
}
