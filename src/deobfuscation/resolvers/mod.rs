//! Resolver detectors, one per supported obfuscator.
//!
//! # Supported Variants
//!
//! - [`ReactorDetector`] - .NET Reactor v4 encrypted resource resolver
//! - [`SmartAssemblyDetector`] - SmartAssembly embedded-assembly resource resolver

mod reactor;
mod smartassembly;

use std::sync::Arc;

pub use reactor::ReactorDetector;
pub use smartassembly::SmartAssemblyDetector;

use crate::deobfuscation::{
    collaborators::Collaborators,
    config::ResolverConfig,
    detector::{ResolverDetector, ResolverVariant},
};

/// Creates the detector for `variant`.
#[must_use]
pub fn create_detector(
    variant: ResolverVariant,
    config: &ResolverConfig,
    collaborators: &Collaborators,
) -> Arc<dyn ResolverDetector> {
    match variant {
        ResolverVariant::Reactor => Arc::new(ReactorDetector::new(collaborators, config)),
        ResolverVariant::SmartAssembly => {
            Arc::new(SmartAssemblyDetector::new(collaborators, config))
        }
    }
}
