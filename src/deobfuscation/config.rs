//! Configuration for the resolver engine.
//!
//! This module provides [`ResolverConfig`], controlling which resolver variants are
//! detected, how instruction patterns tolerate filler and what the recovery stage does
//! with a detected resolver.

use strum::IntoEnumIterator;

use crate::{
    assembly::OpCode, deobfuscation::detector::ResolverVariant, utils::decompress::Decompression,
};

/// Configuration for the resolver engine.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Detectors to run, in priority order (default: every variant).
    pub variants: Vec<ResolverVariant>,

    /// Opcodes skipped between pattern elements and stripped by the default normalizer
    /// (default: `nop`).
    pub filler: Vec<OpCode>,

    /// Require the decrypter oracle to also see an embedded resource name in the handler
    /// (default: false).
    pub strict_decrypter_check: bool,

    /// Codec of the encrypted payload (default: QuickLZ).
    pub decompression: Decompression,

    /// Run initialization and recovery after detection (default: true).
    pub recover: bool,

    /// Write the recovered resource back into the module (default: true).
    pub merge_resources: bool,

    /// Maximum number of locals an initializer candidate may declare (default: 1).
    pub max_initializer_locals: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            variants: ResolverVariant::iter().collect(),
            filler: vec![OpCode::Nop],
            strict_decrypter_check: false,
            decompression: Decompression::QuickLz,
            recover: true,
            merge_resources: true,
            max_initializer_locals: 1,
        }
    }
}

impl ResolverConfig {
    /// Creates a new configuration with default settings.
    ///
    /// # Returns
    ///
    /// A new `ResolverConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that only detects resolvers.
    ///
    /// Initializers are not located, no method body is rewritten and no resource is
    /// recovered, so the module is left untouched.
    #[must_use]
    pub fn detection_only() -> Self {
        Self {
            recover: false,
            merge_resources: false,
            ..Self::default()
        }
    }

    /// Sets the detectors to run.
    ///
    /// # Arguments
    ///
    /// * `variants` - The resolver variants, in priority order.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_variants(mut self, variants: Vec<ResolverVariant>) -> Self {
        self.variants = variants;
        self
    }

    /// Sets the payload codec.
    #[must_use]
    pub fn with_decompression(mut self, decompression: Decompression) -> Self {
        self.decompression = decompression;
        self
    }

    /// Sets the filler opcodes.
    #[must_use]
    pub fn with_filler(mut self, filler: Vec<OpCode>) -> Self {
        self.filler = filler;
        self
    }

    /// Enables or disables the strict decrypter check.
    #[must_use]
    pub fn with_strict_decrypter_check(mut self, strict: bool) -> Self {
        self.strict_decrypter_check = strict;
        self
    }

    /// Enables or disables writing recovered resources back into the module.
    #[must_use]
    pub fn with_merge_resources(mut self, merge: bool) -> Self {
        self.merge_resources = merge;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runs_every_variant() {
        let config = ResolverConfig::default();
        assert_eq!(
            config.variants,
            vec![ResolverVariant::Reactor, ResolverVariant::SmartAssembly]
        );
        assert_eq!(config.filler, vec![OpCode::Nop]);
        assert_eq!(config.max_initializer_locals, 1);
        assert!(config.recover);
        assert!(config.merge_resources);
        assert!(!config.strict_decrypter_check);
    }

    #[test]
    fn test_detection_only() {
        let config = ResolverConfig::detection_only();
        assert!(!config.recover);
        assert!(!config.merge_resources);
        assert_eq!(config.variants.len(), 2);
    }

    #[test]
    fn test_builders() {
        let config = ResolverConfig::new()
            .with_variants(vec![ResolverVariant::SmartAssembly])
            .with_decompression(Decompression::Deflate)
            .with_filler(vec![OpCode::Nop, OpCode::Break])
            .with_strict_decrypter_check(true)
            .with_merge_resources(false);
        assert_eq!(config.variants, vec![ResolverVariant::SmartAssembly]);
        assert_eq!(config.decompression, Decompression::Deflate);
        assert_eq!(config.filler.len(), 2);
        assert!(config.strict_decrypter_check);
        assert!(!config.merge_resources);
    }
}
