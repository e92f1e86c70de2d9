//! .NET Reactor v4 resource resolver.
//!
//! The protector moves the module's resources into one AES encrypted, QuickLZ compressed
//! embedded resource and installs a resolve handler that decrypts it on first use. The
//! generated type is recognized by:
//!
//! - a base type of exactly `System.Object`
//! - three fields, `{ bool, object, object }` or `{ bool, Assembly, string[] }`
//! - a static handler `Assembly(object, ResolveEventArgs)` or `Assembly(object, object)` the
//!   decrypter oracle accepts
//!
//! The type must also have an initializer (see [`InitializerLocator`]); a handler without one
//! is an unsupported build and aborts recovery.

use std::sync::Arc;

use crate::{
    deobfuscation::{
        collaborators::{Collaborators, DecrypterOracle, MethodNormalizer},
        config::ResolverConfig,
        detector::{ResolverCandidate, ResolverDetector, ResolverPayload, ResolverVariant},
        events::{EventKind, EventLog},
        fields::ResolverFieldShape,
        initializer::InitializerLocator,
        resource::{EncryptedResource, NamedResource},
    },
    metadata::{
        method::MethodSignature,
        module::Module,
        typesystem::{wellknown, TypeDeclaration},
    },
    utils::decompress::Decompression,
    Error, Result,
};

/// Local types a handler uses on top of the oracle's decrypter vocabulary.
const EXTRA_DECRYPTER_TYPES: &[&str] = &[wellknown::STRING];

/// Detector for the .NET Reactor v4 encrypted resource resolver.
pub struct ReactorDetector {
    normalizer: Arc<dyn MethodNormalizer>,
    oracle: Arc<dyn DecrypterOracle>,
    locator: InitializerLocator,
    strict: bool,
    decompression: Decompression,
}

impl ReactorDetector {
    /// Creates the detector from the engine's collaborators and configuration.
    #[must_use]
    pub fn new(collaborators: &Collaborators, config: &ResolverConfig) -> Self {
        Self {
            normalizer: Arc::clone(&collaborators.normalizer),
            oracle: Arc::clone(&collaborators.oracle),
            locator: InitializerLocator::new(
                Arc::clone(&collaborators.normalizer),
                config.max_initializer_locals,
            ),
            strict: config.strict_decrypter_check,
            decompression: config.decompression,
        }
    }

    fn is_handler_signature(signature: &MethodSignature) -> bool {
        signature.is(
            wellknown::ASSEMBLY,
            &[wellknown::OBJECT, wellknown::RESOLVE_EVENT_ARGS],
        ) || signature.is(wellknown::ASSEMBLY, &[wellknown::OBJECT, wellknown::OBJECT])
    }

    /// Normalizes the handler, decrypts its strings and reads the decrypter state.
    fn prepare(
        &self,
        module: &mut Module,
        handle: &mut EncryptedResource,
        log: &EventLog,
    ) -> Result<()> {
        let token = handle.method();
        let body = module
            .method(token)
            .and_then(|m| m.body.clone())
            .ok_or_else(|| malformed_error!("handler {} has no body", token))?;

        let normalized = self.normalizer.normalize(&body)?;
        if normalized != body {
            log.record(EventKind::MethodNormalized)
                .method(token)
                .message(format!("normalized resolver handler {token}"));
        }
        let decrypted = self.normalizer.decrypt_strings(&normalized)?;
        if decrypted != normalized {
            log.record(EventKind::StringsDecrypted).method(token);
        }
        if decrypted != body {
            module.replace_body(token, decrypted)?;
        }

        handle.init(module)?;
        match handle.resource_name() {
            Some(name) => log.info(format!("handler {token} reads resource '{name}'")),
            None => log.warn(format!("handler {token} names no embedded resource")),
        }
        Ok(())
    }
}

impl ResolverDetector for ReactorDetector {
    fn variant(&self) -> ResolverVariant {
        ResolverVariant::Reactor
    }

    fn classify(&self, module: &Module, ty: &TypeDeclaration) -> Option<ResolverCandidate> {
        if !ty.derives_from_object() {
            return None;
        }
        ResolverFieldShape::detect(&ty.fields)?;

        let handler = module
            .methods_of(ty)
            .filter(|m| m.is_static() && m.has_body())
            .filter(|m| Self::is_handler_signature(&m.signature))
            .find(|m| {
                self.oracle
                    .looks_like_decrypter(module, m, EXTRA_DECRYPTER_TYPES, self.strict)
            })?;

        Some(ResolverCandidate::new(
            ResolverVariant::Reactor,
            ty,
            handler.token,
            ResolverPayload::Encrypted(EncryptedResource::new(handler.token)),
        ))
    }

    fn locate_initializer(
        &self,
        module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<()> {
        let module_name = module.name().to_string();
        let type_name = candidate.type_name().to_string();
        let missing = |what: &'static str| Error::ResolverInitMissing {
            module: module_name.clone(),
            type_name: type_name.clone(),
            missing: what,
        };

        let ctor = InitializerLocator::constructor(module, candidate.type_token())
            .ok_or_else(|| missing("instance constructor"))?;
        let init = self
            .locator
            .locate(module, candidate.type_token(), &ctor, log)?
            .ok_or_else(|| missing("initializer method"))?;

        candidate.set_init_method(init);
        log.record(EventKind::InitializerLocated)
            .method(init)
            .message(format!("initializer of {}", candidate.type_name()));

        match candidate.encrypted_resource_mut() {
            Some(handle) if !handle.is_initialized() => self.prepare(module, handle, log),
            _ => Ok(()),
        }
    }

    fn recover(
        &self,
        module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<Option<NamedResource>> {
        let Some(handle) = candidate.encrypted_resource_mut() else {
            return Ok(None);
        };
        if let Some(done) = handle.recovered() {
            return Ok(Some(done.clone()));
        }
        // Only `locate_initializer` prepares the handle.
        if !handle.is_initialized() {
            return Ok(None);
        }
        let Some(name) = handle.resource_name().map(str::to_string) else {
            return Ok(None);
        };

        let plaintext = handle.decrypt(module)?;
        log.record(EventKind::ResourceDecrypted)
            .method(handle.method())
            .message(format!("decrypted '{name}' ({} bytes)", plaintext.len()));

        let data = self.decompression.decompress(&plaintext)?;
        let resource = NamedResource::new(name, data);
        log.record(EventKind::ResourceRecovered).message(format!(
            "recovered '{}' ({} bytes)",
            resource.name,
            resource.size()
        ));

        handle.set_recovered(resource.clone());
        Ok(Some(resource))
    }
}
