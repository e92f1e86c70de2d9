//! Resource resolver detection and recovery.
//!
//! Obfuscators hide a module's resources behind a generated resolver: a type whose static
//! handler answers the runtime's resource or assembly resolve requests by decrypting a
//! hidden payload. This module finds that type, locates the method that wires it up, and
//! turns the payload back into a plain named resource.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Resolver Pipeline                         │
//! ├───────────────────────────────────────────────────────────────┤
//! │  Input: Module                                                │
//! │           │                                                   │
//! │           ▼                                                   │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ Detection: types × detectors, first match wins          │  │
//! │  │  • field shape (ResolverFieldShape)                     │  │
//! │  │  • handler signature + decrypter oracle                 │  │
//! │  │  • ldstr/call scan against embedded assemblies          │  │
//! │  └──────────────────────────┬──────────────────────────────┘  │
//! │                             ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ Initialization: InitializerLocator, normalization,      │  │
//! │  │ string decryption, key material                         │  │
//! │  └──────────────────────────┬──────────────────────────────┘  │
//! │                             ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ Recovery: AES-CBC decrypt → QuickLZ/Deflate decompress  │  │
//! │  └──────────────────────────┬──────────────────────────────┘  │
//! │                             ▼                                 │
//! │  Output: ResolverOutcome (candidate, resource, events)        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`ResolverEngine`] - Drives the pipeline over one module or many in parallel
//! - [`ResolverDetector`] - The protocol every variant implements
//! - [`ReactorDetector`], [`SmartAssemblyDetector`] - The supported variants
//! - [`InitializerLocator`] - Finds the resolver's setup method
//! - [`Collaborators`] - Normalizer, decrypter oracle and assembly lookup
//! - [`EventLog`] - What each stage did
//!
//! # Usage
//!
//! ```rust
//! use dotresolve::deobfuscation::{ResolverConfig, ResolverEngine, ResolverVariant};
//!
//! let engine = ResolverEngine::new(
//!     ResolverConfig::default().with_variants(vec![ResolverVariant::Reactor]),
//! );
//! assert_eq!(engine.config().variants.len(), 1);
//! ```

mod collaborators;
mod config;
mod detector;
mod engine;
mod events;
mod fields;
mod initializer;
mod resolvers;
mod resource;

pub use collaborators::{
    AssemblyLookup, AssemblyRegistry, Collaborators, DecrypterOracle, EmbeddedAssemblyInfo,
    FillerStripper, LocalTypesOracle, MethodNormalizer, NoopNormalizer,
};
pub use config::ResolverConfig;
pub use detector::{ResolverCandidate, ResolverDetector, ResolverPayload, ResolverVariant};
pub use engine::{ResolverEngine, ResolverOutcome};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use fields::{classify, FieldTypes, ResolverFieldShape};
pub use initializer::InitializerLocator;
pub use resolvers::{create_detector, ReactorDetector, SmartAssemblyDetector};
pub use resource::{EncryptedResource, NamedResource};
