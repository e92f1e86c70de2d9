//! Initializer location for detected resolvers.
//!
//! A resolver type sets itself up in a companion method before its handler can run: the
//! method flips a static boolean flag of the type and constructs an instance through the
//! type's own constructor. [`InitializerLocator`] finds that method by structure alone:
//!
//! - static, `System.Void()`, with a body and at most `max_locals` locals
//! - stores to a `System.Boolean` static field declared on the resolver type
//! - calls `newobj` on the resolver type's instance constructor
//!
//! Both uses must appear in the same body. Candidates are normalized before they are
//! scanned and the normalized body is written back into the module.

use std::sync::Arc;

use crate::{
    assembly::{Instruction, OpCode},
    deobfuscation::{
        collaborators::MethodNormalizer,
        events::{EventKind, EventLog},
    },
    metadata::{
        method::{MethodRef, MethodSignature},
        module::Module,
        token::Token,
        typesystem::{wellknown, TypeRef},
    },
    Result,
};

/// Locates the initializer method of a resolver type.
#[derive(Clone)]
pub struct InitializerLocator {
    normalizer: Arc<dyn MethodNormalizer>,
    max_locals: usize,
}

impl InitializerLocator {
    /// Creates a locator normalizing candidates with `normalizer`.
    #[must_use]
    pub fn new(normalizer: Arc<dyn MethodNormalizer>, max_locals: usize) -> Self {
        Self {
            normalizer,
            max_locals,
        }
    }

    /// Reference to the instance constructor of `ty`, if it declares one.
    #[must_use]
    pub fn constructor(module: &Module, ty: Token) -> Option<MethodRef> {
        let owner = module.type_def(ty)?;
        let ctor = module.methods_of(owner).find(|m| m.is_ctor())?;
        module.method_ref(ctor.token)
    }

    /// Finds the first method of `ty` that both sets a static boolean flag of `ty` and
    /// constructs `ty` through `ctor`.
    ///
    /// Returns `Ok(None)` when no method qualifies; the caller decides whether that is fatal.
    ///
    /// # Errors
    ///
    /// Propagates normalizer failures, and returns [`crate::Error::Malformed`] if `ty` is not
    /// a type of `module`.
    pub fn locate(
        &self,
        module: &mut Module,
        ty: Token,
        ctor: &MethodRef,
        log: &EventLog,
    ) -> Result<Option<Token>> {
        let owner = module
            .type_def(ty)
            .ok_or_else(|| malformed_error!("type {} is not part of this module", ty))?;
        let owner_ref = owner.as_ref();
        let void = MethodSignature::void();

        let candidates: Vec<Token> = module
            .methods_of(owner)
            .filter(|m| m.is_static() && m.has_body())
            .filter(|m| m.signature == void)
            .filter(|m| m.local_count() <= self.max_locals)
            .map(|m| m.token)
            .collect();

        for token in candidates {
            let Some(body) = module.method(token).and_then(|m| m.body.clone()) else {
                continue;
            };

            let normalized = self.normalizer.normalize(&body)?;
            if normalized != body {
                module.replace_body(token, normalized.clone())?;
                log.record(EventKind::MethodNormalized)
                    .method(token)
                    .message(format!("normalized initializer candidate {token}"));
            }

            if Self::qualifies(&normalized.instructions, &owner_ref, ctor) {
                return Ok(Some(token));
            }
        }

        Ok(None)
    }

    fn qualifies(instructions: &[Instruction], owner: &TypeRef, ctor: &MethodRef) -> bool {
        let mut sets_flag = false;
        let mut constructs_self = false;

        for instr in instructions {
            match instr.opcode {
                OpCode::Stsfld => {
                    if let Some(field) = instr.as_field() {
                        if field.field_type == wellknown::BOOLEAN
                            && field.declaring_type.matches(owner)
                        {
                            sets_flag = true;
                        }
                    }
                }
                OpCode::Newobj => {
                    if instr.as_method().is_some_and(|called| called.matches(ctor)) {
                        constructs_self = true;
                    }
                }
                _ => {}
            }
        }

        sets_flag && constructs_self
    }
}

impl std::fmt::Debug for InitializerLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializerLocator")
            .field("max_locals", &self.max_locals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Operand,
        deobfuscation::collaborators::{FillerStripper, NoopNormalizer},
        metadata::{
            method::{MethodBody, MethodModifiers},
            typesystem::FieldRef,
        },
        test::fixtures::{instr, ResolverTypeBuilder},
    };

    fn locator() -> InitializerLocator {
        InitializerLocator::new(Arc::new(NoopNormalizer), 1)
    }

    #[test]
    fn test_requires_both_uses() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let flag_only = builder.add_init_method("FlagOnly", vec![builder.set_flag()], 0);
        let ctor_only = builder.add_init_method("CtorOnly", vec![builder.construct_self()], 0);
        let (mut module, ty) = builder.build();

        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        let found = locator()
            .locate(&mut module, ty, &ctor, &EventLog::new())
            .unwrap();
        assert!(found.is_none());
        assert_ne!(flag_only, ctor_only);
    }

    #[test]
    fn test_first_qualifying_method_wins() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let both = vec![builder.set_flag(), builder.construct_self()];
        builder.add_init_method("Partial", vec![builder.set_flag()], 0);
        let first = builder.add_init_method("First", both.clone(), 1);
        builder.add_init_method("Second", both, 0);
        let (mut module, ty) = builder.build();

        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        let found = locator()
            .locate(&mut module, ty, &ctor, &EventLog::new())
            .unwrap();
        assert_eq!(found, Some(first));
    }

    #[test]
    fn test_candidate_filters() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let both = vec![builder.set_flag(), builder.construct_self()];
        // too many locals
        builder.add_init_method("Heavy", both.clone(), 2);
        let (mut module, ty) = builder.build();

        // instance method and wrong signature
        let owner = module.type_def(ty).unwrap().as_ref();
        module
            .add_method(
                ty,
                "Instance",
                MethodModifiers::empty(),
                MethodSignature::void(),
                Some(MethodBody::new(both.clone(), Vec::new())),
            )
            .unwrap();
        module
            .add_method(
                ty,
                "WithArg",
                MethodModifiers::STATIC,
                MethodSignature::new(wellknown::VOID, &[wellknown::OBJECT]),
                Some(MethodBody::new(both, Vec::new())),
            )
            .unwrap();

        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        assert!(ctor.declaring_type.matches(&owner));
        let found = locator()
            .locate(&mut module, ty, &ctor, &EventLog::new())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_flag_on_other_type_does_not_count() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let foreign_flag = Instruction::stsfld(FieldRef::new(
            TypeRef::new("Obf", "Other", "app.exe"),
            "flag",
            wellknown::BOOLEAN,
        ));
        builder.add_init_method("Init", vec![foreign_flag, builder.construct_self()], 0);
        let (mut module, ty) = builder.build();

        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        let found = locator()
            .locate(&mut module, ty, &ctor, &EventLog::new())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_structural_match_across_scope_case() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let mut flag = builder.set_flag();
        if let Operand::Field(field) = &mut flag.operand {
            field.declaring_type.scope = "APP.EXE".to_string();
        }
        let init = builder.add_init_method("Init", vec![flag, builder.construct_self()], 0);
        let (mut module, ty) = builder.build();

        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        let found = locator()
            .locate(&mut module, ty, &ctor, &EventLog::new())
            .unwrap();
        assert_eq!(found, Some(init));
    }

    #[test]
    fn test_candidates_are_normalized_in_place() {
        let mut builder = ResolverTypeBuilder::reactor("Obf", "R");
        let body = vec![
            instr(OpCode::Nop),
            builder.set_flag(),
            instr(OpCode::Nop),
            builder.construct_self(),
        ];
        let init = builder.add_init_method("Init", body, 0);
        let (mut module, ty) = builder.build();

        let log = EventLog::new();
        let ctor = InitializerLocator::constructor(&module, ty).unwrap();
        let found = InitializerLocator::new(Arc::new(FillerStripper::default()), 1)
            .locate(&mut module, ty, &ctor, &log)
            .unwrap();

        assert_eq!(found, Some(init));
        assert_eq!(module.method(init).unwrap().instructions().len(), 2);
        assert_eq!(log.count_kind(EventKind::MethodNormalized), 1);
    }
}
