//! SmartAssembly resource resolver.
//!
//! SmartAssembly stores a module's resources in a separate embedded assembly and hooks
//! resource resolution to load it. The resolver type keeps the loaded assembly in a field,
//! and its handler names the embedded assembly with a string literal passed straight to a
//! call:
//!
//! ```text
//! ldstr "Resources, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
//! call  Assembly Loader::Load(string)
//! ```
//!
//! The literal is reduced to a simple name and looked up among the embedded assemblies
//! already discovered for the module.

use std::sync::Arc;

use crate::{
    assembly::{OpCode, PatternScanner},
    deobfuscation::{
        collaborators::{AssemblyLookup, Collaborators, EmbeddedAssemblyInfo},
        config::ResolverConfig,
        detector::{ResolverCandidate, ResolverDetector, ResolverPayload, ResolverVariant},
        events::{EventKind, EventLog},
        initializer::InitializerLocator,
        resource::NamedResource,
    },
    metadata::{
        identity::simplify_assembly_name,
        method::MethodDeclaration,
        module::Module,
        typesystem::{wellknown, TypeDeclaration},
    },
    Result,
};

const LOAD_PATTERN: &[OpCode] = &[OpCode::Ldstr, OpCode::Call];

/// Detector for the SmartAssembly embedded-assembly resource resolver.
pub struct SmartAssemblyDetector {
    assemblies: Arc<dyn AssemblyLookup>,
    scanner: PatternScanner,
    locator: InitializerLocator,
}

impl SmartAssemblyDetector {
    /// Creates the detector from the engine's collaborators and configuration.
    #[must_use]
    pub fn new(collaborators: &Collaborators, config: &ResolverConfig) -> Self {
        Self {
            assemblies: Arc::clone(&collaborators.assemblies),
            scanner: PatternScanner::new(config.filler.clone()),
            locator: InitializerLocator::new(
                Arc::clone(&collaborators.normalizer),
                config.max_initializer_locals,
            ),
        }
    }

    /// Returns the first embedded assembly named by a `ldstr`/`call` pair in `method`.
    fn find_loaded_assembly(&self, method: &MethodDeclaration) -> Option<EmbeddedAssemblyInfo> {
        self.scanner
            .find_all(method.instructions(), LOAD_PATTERN)
            .find_map(|found| {
                let name = found.instructions[0].as_string()?;
                found.instructions[1].as_method()?;
                self.assemblies.find(simplify_assembly_name(name))
            })
    }
}

impl ResolverDetector for SmartAssemblyDetector {
    fn variant(&self) -> ResolverVariant {
        ResolverVariant::SmartAssembly
    }

    fn classify(&self, module: &Module, ty: &TypeDeclaration) -> Option<ResolverCandidate> {
        ty.find_static_field_of_type(wellknown::ASSEMBLY)?;

        module
            .methods_of(ty)
            .filter(|m| m.is_static() && m.has_body())
            .find_map(|m| {
                let info = self.find_loaded_assembly(m)?;
                Some(ResolverCandidate::new(
                    ResolverVariant::SmartAssembly,
                    ty,
                    m.token,
                    ResolverPayload::Assembly(info),
                ))
            })
    }

    /// Looks for an initializer, which this variant does not require.
    fn locate_initializer(
        &self,
        module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<()> {
        let Some(ctor) = InitializerLocator::constructor(module, candidate.type_token()) else {
            return Ok(());
        };
        if let Some(init) = self
            .locator
            .locate(module, candidate.type_token(), &ctor, log)?
        {
            candidate.set_init_method(init);
            log.record(EventKind::InitializerLocated)
                .method(init)
                .message(format!("initializer of {}", candidate.type_name()));
        }
        Ok(())
    }

    /// The resources live in the embedded assembly, there is nothing to decrypt here.
    fn recover(
        &self,
        _module: &mut Module,
        candidate: &mut ResolverCandidate,
        log: &EventLog,
    ) -> Result<Option<NamedResource>> {
        if let Some(info) = candidate.resource_info() {
            log.info(format!(
                "resources of {} are in embedded assembly '{}' (resource '{}')",
                candidate.type_name(),
                info.simple_name,
                info.resource_name
            ));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Instruction,
        deobfuscation::collaborators::AssemblyRegistry,
        metadata::{
            method::{MethodBody, MethodModifiers, MethodSignature},
            typesystem::TypeRef,
        },
        test::fixtures::{assembly_load_ref, instr},
    };

    fn module_with_handler(instructions: Vec<Instruction>, field_type: &str) -> (Module, crate::metadata::token::Token) {
        let mut module = Module::new("app.exe");
        let ty = module.add_type("SA", "Resolver", Some(TypeRef::object()));
        module.add_field(ty, "asm", field_type, true, None).unwrap();
        module
            .add_method(
                ty,
                "Handler",
                MethodModifiers::STATIC,
                MethodSignature::new(
                    wellknown::ASSEMBLY,
                    &[wellknown::OBJECT, wellknown::RESOLVE_EVENT_ARGS],
                ),
                Some(MethodBody::new(instructions, Vec::new())),
            )
            .unwrap();
        (module, ty)
    }

    fn detector_with(names: &[&str]) -> SmartAssemblyDetector {
        let registry = AssemblyRegistry::new();
        for name in names {
            registry.register(EmbeddedAssemblyInfo::new(*name, format!("{name}.resources")));
        }
        let collaborators = Collaborators {
            assemblies: Arc::new(registry),
            ..Collaborators::default()
        };
        SmartAssemblyDetector::new(&collaborators, &ResolverConfig::default())
    }

    #[test]
    fn test_detects_known_assembly() {
        let (module, ty) = module_with_handler(
            vec![
                Instruction::ldstr("Unknown, Version=1.0.0.0"),
                Instruction::call(assembly_load_ref()),
                Instruction::ldstr("Payload, Version=2.0.0.0, Culture=neutral"),
                instr(OpCode::Nop),
                Instruction::call(assembly_load_ref()),
                instr(OpCode::Ret),
            ],
            wellknown::ASSEMBLY,
        );

        let candidate = detector_with(&["Payload"])
            .classify(&module, module.type_def(ty).unwrap())
            .unwrap();
        assert_eq!(candidate.variant(), ResolverVariant::SmartAssembly);
        assert_eq!(candidate.resource_info().unwrap().resource_name, "Payload.resources");
    }

    #[test]
    fn test_requires_assembly_field() {
        let (module, ty) = module_with_handler(
            vec![Instruction::ldstr("Payload"), Instruction::call(assembly_load_ref())],
            wellknown::OBJECT,
        );
        assert!(detector_with(&["Payload"])
            .classify(&module, module.type_def(ty).unwrap())
            .is_none());
    }

    #[test]
    fn test_instance_assembly_field_rejects() {
        let (mut module, ty) = module_with_handler(
            vec![Instruction::ldstr("Payload"), Instruction::call(assembly_load_ref())],
            wellknown::ASSEMBLY,
        );
        module.type_def_mut(ty).unwrap().fields[0].is_static = false;

        assert!(detector_with(&["Payload"])
            .classify(&module, module.type_def(ty).unwrap())
            .is_none());
    }

    #[test]
    fn test_unknown_names_reject() {
        let (module, ty) = module_with_handler(
            vec![Instruction::ldstr("Payload"), Instruction::call(assembly_load_ref())],
            wellknown::ASSEMBLY,
        );
        assert!(detector_with(&["Other"])
            .classify(&module, module.type_def(ty).unwrap())
            .is_none());
    }

    #[test]
    fn test_missing_initializer_is_not_fatal() {
        let (mut module, ty) = module_with_handler(
            vec![Instruction::ldstr("Payload"), Instruction::call(assembly_load_ref())],
            wellknown::ASSEMBLY,
        );
        let detector = detector_with(&["Payload"]);
        let mut candidate = detector
            .classify(&module, module.type_def(ty).unwrap())
            .unwrap();

        let log = EventLog::new();
        detector
            .locate_initializer(&mut module, &mut candidate, &log)
            .unwrap();
        assert!(candidate.init_method().is_none());
        assert!(detector
            .recover(&mut module, &mut candidate, &log)
            .unwrap()
            .is_none());
    }
}
