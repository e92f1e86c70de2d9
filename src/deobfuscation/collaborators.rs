//! Services the resolver detectors depend on but do not implement themselves.
//!
//! - [`MethodNormalizer`] rewrites obfuscator indirection out of a method body so literal
//!   operands become visible, and decrypts hidden string literals.
//! - [`DecrypterOracle`] judges whether a method is shaped like a resource decryption routine.
//! - [`AssemblyLookup`] maps a simple assembly name to embedded-assembly metadata discovered
//!   by a sibling detector.
//!
//! Each trait ships with a built-in implementation good enough for unobfuscated or lightly
//! obfuscated inputs; hosts with a full deobfuscation pipeline plug in their own.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    assembly::{OpCode, Operand},
    metadata::{
        identity::simplify_assembly_name,
        method::{MethodBody, MethodDeclaration},
        module::Module,
    },
    Result,
};

/// Method body normalization and string decryption.
///
/// Both operations are value transforms: they take a body and return the rewritten body,
/// leaving the caller to store it. Implementations must be idempotent, applying either
/// operation to its own output returns that output unchanged.
pub trait MethodNormalizer: Send + Sync {
    /// Removes obfuscator-inserted indirection from `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collaborator`] if the body cannot be normalized.
    fn normalize(&self, body: &MethodBody) -> Result<MethodBody>;

    /// Replaces encrypted string loads in `body` with their plaintext literals.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collaborator`] if a string cannot be decrypted.
    fn decrypt_strings(&self, body: &MethodBody) -> Result<MethodBody>;
}

/// Normalizer that strips filler instructions and leaves strings untouched.
#[derive(Debug, Clone)]
pub struct FillerStripper {
    filler: Vec<OpCode>,
}

impl Default for FillerStripper {
    fn default() -> Self {
        Self::new(vec![OpCode::Nop])
    }
}

impl FillerStripper {
    /// Creates a stripper removing the given opcodes.
    #[must_use]
    pub fn new(filler: Vec<OpCode>) -> Self {
        Self { filler }
    }
}

impl MethodNormalizer for FillerStripper {
    fn normalize(&self, body: &MethodBody) -> Result<MethodBody> {
        let instructions = body
            .instructions
            .iter()
            .filter(|instr| !self.filler.contains(&instr.opcode))
            .cloned()
            .collect();
        Ok(MethodBody::new(instructions, body.locals.clone()))
    }

    fn decrypt_strings(&self, body: &MethodBody) -> Result<MethodBody> {
        Ok(body.clone())
    }
}

/// Normalizer that returns every body unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNormalizer;

impl MethodNormalizer for NoopNormalizer {
    fn normalize(&self, body: &MethodBody) -> Result<MethodBody> {
        Ok(body.clone())
    }

    fn decrypt_strings(&self, body: &MethodBody) -> Result<MethodBody> {
        Ok(body.clone())
    }
}

/// Heuristic recognizing resource decryption routines.
pub trait DecrypterOracle: Send + Sync {
    /// Returns true if `method` is consistent with decrypting an embedded resource.
    ///
    /// # Arguments
    ///
    /// * `module` - The module declaring `method`.
    /// * `method` - The candidate method.
    /// * `extra_types` - Additional local types the routine is expected to use.
    /// * `strict` - Additionally require the body to name an embedded resource of `module`.
    fn looks_like_decrypter(
        &self,
        module: &Module,
        method: &MethodDeclaration,
        extra_types: &[&str],
        strict: bool,
    ) -> bool;
}

/// Oracle judging a method by the types of its local variables.
///
/// A decryption routine reads the resource into a byte array through a stream, and runs it
/// through a crypto stream built from a symmetric algorithm. All of these show up as locals.
#[derive(Debug, Clone)]
pub struct LocalTypesOracle {
    required: Vec<String>,
    ciphers: Vec<String>,
}

impl Default for LocalTypesOracle {
    fn default() -> Self {
        Self {
            required: [
                "System.Byte[]",
                "System.IO.BinaryReader",
                "System.IO.MemoryStream",
                "System.Security.Cryptography.CryptoStream",
                "System.Security.Cryptography.ICryptoTransform",
            ]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
            ciphers: [
                "System.Security.Cryptography.RijndaelManaged",
                "System.Security.Cryptography.AesManaged",
                "System.Security.Cryptography.SymmetricAlgorithm",
            ]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
        }
    }
}

impl LocalTypesOracle {
    /// Creates an oracle with the default local type vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn names_resource(module: &Module, body: &MethodBody) -> bool {
        body.instructions.iter().any(|instr| match &instr.operand {
            Operand::String(name) if instr.opcode == OpCode::Ldstr => {
                module.resource(name).is_some()
            }
            _ => false,
        })
    }
}

impl DecrypterOracle for LocalTypesOracle {
    fn looks_like_decrypter(
        &self,
        module: &Module,
        method: &MethodDeclaration,
        extra_types: &[&str],
        strict: bool,
    ) -> bool {
        if !method.is_static() {
            return false;
        }
        let Some(body) = method.body.as_ref() else {
            return false;
        };

        let has_local = |name: &str| body.locals.iter().any(|local| local == name);

        if !self.required.iter().all(|t| has_local(t)) {
            return false;
        }
        if !extra_types.iter().all(|t| has_local(t)) {
            return false;
        }
        if !self.ciphers.iter().any(|t| has_local(t)) {
            return false;
        }

        !strict || Self::names_resource(module, body)
    }
}

/// Metadata about an assembly embedded as a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAssemblyInfo {
    /// Full display name of the embedded assembly
    pub assembly_name: String,
    /// Simple name, the lookup key
    pub simple_name: String,
    /// File extension the assembly is saved with (`.dll`, `.exe`)
    pub extension: String,
    /// Name of the embedded resource holding the assembly
    pub resource_name: String,
    /// Whether the resource data is compressed
    pub is_compressed: bool,
}

impl EmbeddedAssemblyInfo {
    /// Creates an entry; the simple name is derived from `assembly_name`.
    pub fn new(assembly_name: impl Into<String>, resource_name: impl Into<String>) -> Self {
        let assembly_name = assembly_name.into();
        let simple_name = simplify_assembly_name(&assembly_name).to_string();
        Self {
            assembly_name,
            simple_name,
            extension: ".dll".to_string(),
            resource_name: resource_name.into(),
            is_compressed: false,
        }
    }
}

/// Lookup of embedded assemblies by simple name.
pub trait AssemblyLookup: Send + Sync {
    /// Finds the embedded assembly with the given simple name.
    fn find(&self, simple_name: &str) -> Option<EmbeddedAssemblyInfo>;
}

/// Concurrent registry of embedded assemblies.
///
/// Populated through `&self`, so one registry can be shared between the detector filling it
/// and the resolver detectors reading it.
#[derive(Debug, Default)]
pub struct AssemblyRegistry {
    entries: DashMap<String, Arc<EmbeddedAssemblyInfo>>,
}

impl AssemblyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `info` under its simple name, replacing any previous entry.
    pub fn register(&self, info: EmbeddedAssemblyInfo) {
        self.entries
            .insert(info.simple_name.clone(), Arc::new(info));
    }

    /// Number of registered assemblies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AssemblyLookup for AssemblyRegistry {
    fn find(&self, simple_name: &str) -> Option<EmbeddedAssemblyInfo> {
        self.entries
            .get(simple_name)
            .map(|entry| entry.value().as_ref().clone())
    }
}

/// The set of collaborators handed to the resolver detectors.
#[derive(Clone)]
pub struct Collaborators {
    /// Method body normalizer and string decrypter
    pub normalizer: Arc<dyn MethodNormalizer>,
    /// Resource decrypter heuristic
    pub oracle: Arc<dyn DecrypterOracle>,
    /// Embedded assembly lookup
    pub assemblies: Arc<dyn AssemblyLookup>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            normalizer: Arc::new(FillerStripper::default()),
            oracle: Arc::new(LocalTypesOracle::new()),
            assemblies: Arc::new(AssemblyRegistry::new()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
