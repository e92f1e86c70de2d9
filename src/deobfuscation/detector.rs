//! The shared resolver detection protocol.
//!
//! Every supported obfuscator variant implements [`ResolverDetector`]. The engine asks each
//! configured detector to [`classify`](ResolverDetector::classify) each type, and drives the
//! first accepted [`ResolverCandidate`] through
//! [`locate_initializer`](ResolverDetector::locate_initializer) and
//! [`recover`](ResolverDetector::recover). New variants are added by implementing the trait
//! and tagging them with a new [`ResolverVariant`].

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::{
    deobfuscation::{
        collaborators::EmbeddedAssemblyInfo,
        events::EventLog,
        resource::{EncryptedResource, NamedResource},
    },
    metadata::{module::Module, token::Token, typesystem::TypeDeclaration},
    Result,
};

/// Supported resolver variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum ResolverVariant {
    /// .NET Reactor v4: AES encrypted, QuickLZ compressed resource behind an
    /// `AssemblyResolve`/`ResourceResolve` handler
    Reactor,
    /// SmartAssembly: handler loading an embedded assembly that carries the resources
    SmartAssembly,
}

impl ResolverVariant {
    /// Human-readable name of the obfuscator.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reactor => ".NET Reactor",
            Self::SmartAssembly => "SmartAssembly",
        }
    }
}

impl fmt::Display for ResolverVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a detector found behind the handler.
#[derive(Debug, Clone)]
pub enum ResolverPayload {
    /// An embedded assembly carrying the resources
    Assembly(EmbeddedAssemblyInfo),
    /// An encrypted embedded resource
    Encrypted(EncryptedResource),
}

/// A detected resolver.
///
/// Produced once per successful detection. Apart from the located initializer and the
/// encrypted resource state, nothing changes after construction.
#[derive(Debug, Clone)]
pub struct ResolverCandidate {
    variant: ResolverVariant,
    type_token: Token,
    type_name: String,
    handler: Token,
    init_method: Option<Token>,
    payload: ResolverPayload,
}

impl ResolverCandidate {
    /// Creates a candidate for `handler` on `ty`.
    #[must_use]
    pub fn new(
        variant: ResolverVariant,
        ty: &TypeDeclaration,
        handler: Token,
        payload: ResolverPayload,
    ) -> Self {
        Self {
            variant,
            type_token: ty.token,
            type_name: ty.full_name(),
            handler,
            init_method: None,
            payload,
        }
    }

    /// Returns true if a handler method was detected.
    #[must_use]
    pub fn detected(&self) -> bool {
        !self.handler.is_null()
    }

    /// The variant that produced this candidate.
    #[must_use]
    pub fn variant(&self) -> ResolverVariant {
        self.variant
    }

    /// The resolver type.
    #[must_use]
    pub fn type_token(&self) -> Token {
        self.type_token
    }

    /// Full name of the resolver type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The handler method.
    #[must_use]
    pub fn handler(&self) -> Token {
        self.handler
    }

    /// The initializer method, once located.
    #[must_use]
    pub fn init_method(&self) -> Option<Token> {
        self.init_method
    }

    pub(crate) fn set_init_method(&mut self, method: Token) {
        self.init_method = Some(method);
    }

    /// What the detector found behind the handler.
    #[must_use]
    pub fn payload(&self) -> &ResolverPayload {
        &self.payload
    }

    /// The embedded assembly matched by the handler (SmartAssembly).
    #[must_use]
    pub fn resource_info(&self) -> Option<&EmbeddedAssemblyInfo> {
        match &self.payload {
            ResolverPayload::Assembly(info) => Some(info),
            ResolverPayload::Encrypted(_) => None,
        }
    }

    /// The encrypted resource handle (.NET Reactor).
    #[must_use]
    pub fn encrypted_resource(&self) -> Option<&EncryptedResource> {
        match &self.payload {
            ResolverPayload::Encrypted(handle) => Some(handle),
            ResolverPayload::Assembly(_) => None,
        }
    }

    pub(crate) fn encrypted_resource_mut(&mut self) -> Option<&mut EncryptedResource> {
        match &mut self.payload {
            ResolverPayload::Encrypted(handle) => Some(handle),
            ResolverPayload::Assembly(_) => None,
        }
    }

    /// Returns true if the handler's encrypted resource was located.
    #[must_use]
    pub fn found_resource(&self) -> bool {
        self.encrypted_resource()
            .is_some_and(EncryptedResource::found_resource)
    }
}

impl fmt::Display for ResolverCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resolver {} (handler {})",
            self.variant, self.type_name, self.handler
        )
    }
}

/// Detection protocol implemented by each resolver variant.
pub trait ResolverDetector: Send + Sync {
    /// The variant this detector recognizes.
    fn variant(&self) -> ResolverVariant;

    /// Tests `ty` against the variant's structural signature.
    ///
    /// Returns `None` when the type does not match; that is the common case, not an error.
    fn classify(&self, module: &Module, ty: &TypeDeclaration) -> Option<ResolverCandidate>;

    /// Locates the candidate's initializer and prepares it for recovery.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ResolverInitMissing`] if the variant requires a companion
    /// method that the type does not have, and propagates collaborator failures.
    fn locate_initializer(
        &self,
        module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<()>;

    /// Recovers the resource hidden behind the candidate.
    ///
    /// Returns `None` when the candidate has no encrypted resource. Calling this again on an
    /// already recovered candidate returns the same resource.
    ///
    /// # Errors
    ///
    /// Propagates collaborator, decryption and decompression failures unchanged.
    fn recover(
        &self,
        module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<Option<NamedResource>>;
}
