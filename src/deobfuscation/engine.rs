//! Resolver engine.
//!
//! The [`ResolverEngine`] is the entry point for finding and undoing obfuscator-generated
//! resource resolvers. For each module it runs:
//!
//! 1. **Detection**: every type, in declaration order, is offered to every configured
//!    detector in priority order; the first accepted candidate wins
//! 2. **Initialization**: the detector locates the resolver's initializer and prepares the
//!    handler (normalization, string decryption, key material)
//! 3. **Recovery**: the hidden resource is decrypted and decompressed
//! 4. **Merge**: the recovered resource is written back into the module
//!
//! Stages 2 to 4 are skipped by [`ResolverConfig::detection_only`].

use std::{fmt, sync::Arc};

use rayon::prelude::*;

use crate::{
    deobfuscation::{
        collaborators::{Collaborators, FillerStripper},
        config::ResolverConfig,
        detector::{ResolverCandidate, ResolverDetector},
        events::{EventKind, EventLog},
        resolvers::create_detector,
        resource::NamedResource,
    },
    metadata::module::Module,
    Result,
};

/// What the engine did with one module.
#[derive(Debug, Clone)]
pub struct ResolverOutcome {
    candidate: Option<ResolverCandidate>,
    resource: Option<NamedResource>,
    merged: bool,
    events: EventLog,
}

impl ResolverOutcome {
    /// Returns true if a resolver was detected.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.candidate.as_ref().is_some_and(ResolverCandidate::detected)
    }

    /// The detected resolver, if any.
    #[must_use]
    pub fn candidate(&self) -> Option<&ResolverCandidate> {
        self.candidate.as_ref()
    }

    /// The recovered resource, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&NamedResource> {
        self.resource.as_ref()
    }

    /// Returns true if the recovered resource was written back into the module.
    #[must_use]
    pub fn merged(&self) -> bool {
        self.merged
    }

    /// Events recorded while processing the module.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

/// Detects resource resolvers and recovers the resources they hide.
///
/// # Example
///
/// ```rust
/// use dotresolve::deobfuscation::{ResolverConfig, ResolverEngine};
/// use dotresolve::metadata::module::Module;
///
/// let engine = ResolverEngine::new(ResolverConfig::detection_only());
/// let mut module = Module::new("clean.dll");
///
/// let outcome = engine.process(&mut module)?;
/// assert!(!outcome.detected());
/// # Ok::<(), dotresolve::Error>(())
/// ```
pub struct ResolverEngine {
    config: ResolverConfig,
    collaborators: Collaborators,
    detectors: Vec<Arc<dyn ResolverDetector>>,
}

impl Default for ResolverEngine {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl ResolverEngine {
    /// Creates an engine with the built-in collaborators.
    ///
    /// The default normalizer strips the configured filler opcodes.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        let collaborators = Collaborators {
            normalizer: Arc::new(FillerStripper::new(config.filler.clone())),
            ..Collaborators::default()
        };
        Self::with_collaborators(config, collaborators)
    }

    /// Creates an engine using the given collaborators.
    ///
    /// One detector is created per entry of [`ResolverConfig::variants`], in that order.
    #[must_use]
    pub fn with_collaborators(config: ResolverConfig, collaborators: Collaborators) -> Self {
        let detectors = config
            .variants
            .iter()
            .map(|variant| create_detector(*variant, &config, &collaborators))
            .collect();

        Self {
            config,
            collaborators,
            detectors,
        }
    }

    /// Appends a detector; it runs after the configured ones.
    pub fn register_detector(&mut self, detector: Arc<dyn ResolverDetector>) {
        self.detectors.push(detector);
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The collaborators handed to the built-in detectors.
    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Detects the resolver of `module` without changing it.
    #[must_use]
    pub fn detect(&self, module: &Module) -> Option<ResolverCandidate> {
        self.find_candidate(module).map(|(_, candidate)| candidate)
    }

    /// Runs the full pipeline on `module`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ResolverInitMissing`] if a detected resolver lacks a companion
    /// its variant requires, and propagates collaborator, decryption and decompression
    /// failures. A module without a resolver is not an error.
    pub fn process(&self, module: &mut Module) -> Result<ResolverOutcome> {
        let log = EventLog::new();
        self.run(module, &log).map(|(candidate, resource, merged)| ResolverOutcome {
            candidate,
            resource,
            merged,
            events: log,
        })
    }

    /// Runs the full pipeline on `module`, recording into `log`.
    ///
    /// Unlike [`process`](Self::process) the caller keeps the events of a failed run; the
    /// error is logged before it is returned.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    pub fn process_with_log(&self, module: &mut Module, log: &EventLog) -> Result<ResolverOutcome> {
        let (candidate, resource, merged) = self.run(module, log)?;
        Ok(ResolverOutcome {
            candidate,
            resource,
            merged,
            events: log.clone(),
        })
    }

    /// Processes many modules in parallel, one job per module.
    ///
    /// Results are returned in the order of `modules`.
    pub fn process_modules(&self, modules: &mut [Module]) -> Vec<Result<ResolverOutcome>> {
        modules
            .par_iter_mut()
            .map(|module| self.process(module))
            .collect()
    }

    fn find_candidate(&self, module: &Module) -> Option<(&dyn ResolverDetector, ResolverCandidate)> {
        module.types().iter().find_map(|ty| {
            self.detectors.iter().find_map(|detector| {
                detector
                    .classify(module, ty)
                    .map(|candidate| (detector.as_ref(), candidate))
            })
        })
    }

    fn run(
        &self,
        module: &mut Module,
        log: &EventLog,
    ) -> Result<(Option<ResolverCandidate>, Option<NamedResource>, bool)> {
        log.info(format!(
            "scanning {} types of {} with {} detectors",
            module.types().len(),
            module.name(),
            self.detectors.len()
        ));

        let Some((detector, mut candidate)) = self.find_candidate(module) else {
            log.record(EventKind::DetectionComplete)
                .message(format!("no resource resolver in {}", module.name()));
            return Ok((None, None, false));
        };

        log.record(EventKind::ResolverDetected)
            .method(candidate.handler())
            .message(candidate.to_string());
        log.record(EventKind::DetectionComplete)
            .message(format!("{} uses a {} resolver", module.name(), candidate.variant()));

        if !self.config.recover {
            return Ok((Some(candidate), None, false));
        }

        if let Err(err) = detector.locate_initializer(module, &mut candidate, log) {
            log.error(err.to_string());
            return Err(err);
        }

        let resource = match detector.recover(module, &mut candidate, log) {
            Ok(resource) => resource,
            Err(err) => {
                log.error(err.to_string());
                return Err(err);
            }
        };

        let mut merged = false;
        if let Some(resource) = &resource {
            if self.config.merge_resources {
                let replaced = module.upsert_resource(&resource.name, resource.data.clone());
                log.record(EventKind::ResourceMerged).message(format!(
                    "{} resource '{}' ({} bytes)",
                    if replaced { "replaced" } else { "added" },
                    resource.name,
                    resource.size()
                ));
                merged = true;
            }
        }

        Ok((Some(candidate), resource, merged))
    }
}

impl fmt::Debug for ResolverEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverEngine")
            .field("config", &self.config)
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.variant()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
