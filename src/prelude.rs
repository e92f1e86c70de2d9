//! # dotresolve Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotresolve library. Import this module to get quick access to the essential
//! types for detecting resolvers and recovering their resources.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotresolve operations
pub use crate::Error;

/// The result type used throughout dotresolve
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Resolver engine, its configuration and what it reports back
pub use crate::deobfuscation::{ResolverConfig, ResolverEngine, ResolverOutcome};

/// Detection protocol and its results
pub use crate::deobfuscation::{
    ResolverCandidate, ResolverDetector, ResolverPayload, ResolverVariant,
};

/// Built-in detectors and the initializer locator they share
pub use crate::deobfuscation::{InitializerLocator, ReactorDetector, SmartAssemblyDetector};

/// Recovered and encrypted resources
pub use crate::deobfuscation::{EncryptedResource, NamedResource};

/// Event logging
pub use crate::deobfuscation::{Event, EventKind, EventLog};

// ================================================================================================
// Collaborators
// ================================================================================================

/// Collaborator traits and their built-in implementations
pub use crate::deobfuscation::{
    AssemblyLookup, AssemblyRegistry, Collaborators, DecrypterOracle, EmbeddedAssemblyInfo,
    FillerStripper, LocalTypesOracle, MethodNormalizer, NoopNormalizer,
};

// ================================================================================================
// Module Model
// ================================================================================================

/// Metadata token type for referencing declarations
pub use crate::metadata::token::Token;

/// Modules and their resources
pub use crate::metadata::module::{EmbeddedResource, ManifestResourceAttributes, Module};

/// Types and fields
pub use crate::metadata::typesystem::{
    wellknown, FieldDeclaration, FieldRef, TypeDeclaration, TypeRef,
};

/// Methods
pub use crate::metadata::method::{
    MethodBody, MethodDeclaration, MethodModifiers, MethodRef, MethodSignature,
};

/// Assembly name handling
pub use crate::metadata::identity::simplify_assembly_name;

// ================================================================================================
// Instructions
// ================================================================================================

/// Decoded instructions and pattern matching
pub use crate::assembly::{find_sequence, Instruction, OpCode, Operand, PatternScanner};

// ================================================================================================
// Primitives
// ================================================================================================

/// Payload codecs
pub use crate::utils::decompress::{DecompressError, Decompression};
