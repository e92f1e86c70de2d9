//! End-to-end resolver detection and recovery through the public API.
//!
//! Every test builds a module the way a binary reader would populate it, runs the engine (or
//! a single detector) and checks both the reported outcome and the state of the module
//! afterwards.

use std::{io::Write, sync::Arc};

use dotresolve::{
    prelude::*,
    utils::crypto::aes_cbc_encrypt,
};
use flate2::{write::DeflateEncoder, Compression};

const KEY: [u8; 32] = [
    0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77, 0x81,
    0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14, 0xdf, 0xf4,
];
const IV: [u8; 16] = [0x5a; 16];

const RESOURCE: &str = "a7f3c0de.resources";

fn decrypter_locals() -> Vec<String> {
    [
        "System.Byte[]",
        "System.IO.BinaryReader",
        "System.IO.MemoryStream",
        "System.Security.Cryptography.CryptoStream",
        "System.Security.Cryptography.ICryptoTransform",
        "System.Security.Cryptography.AesManaged",
        wellknown::STRING,
    ]
    .iter()
    .map(|t| (*t).to_string())
    .collect()
}

fn handler_signature() -> MethodSignature {
    MethodSignature::new(wellknown::ASSEMBLY, &[wellknown::OBJECT, wellknown::OBJECT])
}

/// Declares a type deriving from `System.Object` with static fields and an instance ctor.
fn add_resolver_type(module: &mut Module, name: &str, field_types: &[&str]) -> Result<Token> {
    let ty = module.add_type("Obf", name, Some(TypeRef::object()));
    for (index, field_type) in field_types.iter().enumerate() {
        module.add_field(ty, format!("f{index}"), *field_type, true, None)?;
    }
    module.add_method(
        ty,
        wellknown::CTOR,
        MethodModifiers::SPECIAL_NAME | MethodModifiers::RTSPECIAL_NAME,
        MethodSignature::void(),
        Some(MethodBody::new(vec![Instruction::simple(OpCode::Ret)], Vec::new())),
    )?;
    Ok(ty)
}

/// Declares the holder of the AES key and IV field initializers.
fn add_key_holder(module: &mut Module) -> Result<TypeRef> {
    let holder = module.add_type("", "<PrivateImplementationDetails>", Some(TypeRef::object()));
    module.add_field(holder, "k", wellknown::BYTE_ARRAY, true, Some(KEY.to_vec()))?;
    module.add_field(holder, "v", wellknown::BYTE_ARRAY, true, Some(IV.to_vec()))?;
    Ok(TypeRef::new("", "<PrivateImplementationDetails>", module.name()))
}

fn add_handler(module: &mut Module, ty: Token, keys: &TypeRef, resource: &str) -> Result<Token> {
    let body = vec![
        Instruction::simple(OpCode::Nop),
        Instruction::ldtoken_field(FieldRef::new(keys.clone(), "k", wellknown::BYTE_ARRAY)),
        Instruction::simple(OpCode::Nop),
        Instruction::ldtoken_field(FieldRef::new(keys.clone(), "v", wellknown::BYTE_ARRAY)),
        Instruction::ldstr(resource),
        Instruction::simple(OpCode::Ldnull),
        Instruction::simple(OpCode::Ret),
    ];
    module.add_method(
        ty,
        "b",
        MethodModifiers::STATIC,
        handler_signature(),
        Some(MethodBody::new(body, decrypter_locals())),
    )
}

fn add_initializer(module: &mut Module, ty: Token) -> Result<Token> {
    let owner = TypeRef::new("Obf", module.type_def(ty).map_or("", |t| t.name.as_str()), module.name());
    let body = vec![
        Instruction::newobj(MethodRef::new(
            owner.clone(),
            wellknown::CTOR,
            MethodSignature::void(),
        )),
        Instruction::simple(OpCode::Nop),
        Instruction::stsfld(FieldRef::new(owner, "f0", wellknown::BOOLEAN)),
        Instruction::simple(OpCode::Ret),
    ];
    module.add_method(
        ty,
        "a",
        MethodModifiers::STATIC,
        MethodSignature::void(),
        Some(MethodBody::new(body, Vec::new())),
    )
}

/// A complete .NET Reactor protected module hiding `stored` (already compressed).
fn reactor_module(stored: &[u8]) -> Result<Module> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, RESOURCE)?;
    add_initializer(&mut module, ty)?;

    let ciphertext = aes_cbc_encrypt(&KEY, &IV, stored).unwrap();
    module.add_resource(EmbeddedResource::new(RESOURCE, ciphertext));
    Ok(module)
}

fn quicklz_stored(data: &[u8]) -> Vec<u8> {
    let mut stream = vec![0x0C, (3 + data.len()) as u8, data.len() as u8];
    stream.extend_from_slice(data);
    stream
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_object_pair_type_is_detected() -> Result<()> {
    let module = reactor_module(&quicklz_stored(b"payload"))?;
    let engine = ResolverEngine::new(ResolverConfig::detection_only());

    let candidate = engine.detect(&module).unwrap();
    assert!(candidate.detected());
    assert_eq!(candidate.variant(), ResolverVariant::Reactor);
    assert_eq!(candidate.type_name(), "Obf.c");
    assert_eq!(module.method(candidate.handler()).unwrap().name, "b");
    Ok(())
}

#[test]
fn test_four_fields_are_not_a_resolver() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[
            wellknown::BOOLEAN,
            wellknown::OBJECT,
            wellknown::OBJECT,
            wellknown::OBJECT,
        ],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, RESOURCE)?;
    add_initializer(&mut module, ty)?;

    let outcome = ResolverEngine::default().process(&mut module)?;
    assert!(!outcome.detected());
    assert!(outcome.candidate().is_none());
    Ok(())
}

#[test]
fn test_missing_initializer_names_the_type() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, RESOURCE)?;

    match ResolverEngine::default().process(&mut module) {
        Err(Error::ResolverInitMissing {
            module,
            type_name,
            missing,
        }) => {
            assert_eq!(module, "protected.exe");
            assert_eq!(type_name, "Obf.c");
            assert_eq!(missing, "initializer method");
        }
        other => panic!("expected ResolverInitMissing, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_unresolved_resource_recovers_nothing() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, "not-embedded")?;
    add_initializer(&mut module, ty)?;

    let config = ResolverConfig::default();
    let detector = ReactorDetector::new(&Collaborators::default(), &config);
    let log = EventLog::new();
    let mut candidate = detector
        .classify(&module, module.type_def(ty).unwrap())
        .unwrap();
    detector.locate_initializer(&mut module, &mut candidate, &log)?;
    assert!(!candidate.found_resource());

    let before = module.clone();
    assert!(detector.recover(&mut module, &mut candidate, &log)?.is_none());
    assert_eq!(module.resources(), before.resources());
    for (after, before) in module.methods().iter().zip(before.methods()) {
        assert_eq!(after.body, before.body);
    }
    assert!(!log.has(EventKind::ResourceDecrypted));
    Ok(())
}

#[test]
fn test_recover_before_initializer_leaves_module_untouched() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, "not-embedded")?;

    let config = ResolverConfig::default();
    let collaborators = Collaborators {
        normalizer: Arc::new(FillerStripper::new(config.filler.clone())),
        ..Collaborators::default()
    };
    let detector = ReactorDetector::new(&collaborators, &config);
    let log = EventLog::new();
    let mut candidate = detector
        .classify(&module, module.type_def(ty).unwrap())
        .unwrap();

    let before = module.clone();
    assert!(detector.recover(&mut module, &mut candidate, &log)?.is_none());
    assert!(candidate.init_method().is_none());
    assert_eq!(module.resources(), before.resources());
    for (after, before) in module.methods().iter().zip(before.methods()) {
        assert_eq!(after.body, before.body);
    }
    assert!(!log.has(EventKind::MethodNormalized));
    Ok(())
}

#[test]
fn test_detection_is_stable_across_runs() -> Result<()> {
    let module = reactor_module(&quicklz_stored(b"payload"))?;
    let engine = ResolverEngine::default();

    let first = engine.detect(&module).unwrap();
    let second = engine.detect(&module).unwrap();
    assert_eq!(first.type_token(), second.type_token());
    assert_eq!(first.handler(), second.handler());
    Ok(())
}

#[test]
fn test_first_qualifying_type_wins_over_later_one() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let keys = add_key_holder(&mut module)?;
    let shape = [wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT];

    let decoy = add_resolver_type(&mut module, "decoy", &shape)?;
    add_handler(&mut module, decoy, &keys, RESOURCE)?;
    let real = add_resolver_type(&mut module, "real", &shape)?;
    add_handler(&mut module, real, &keys, RESOURCE)?;
    add_initializer(&mut module, real)?;

    let candidate = ResolverEngine::default()
        .detect(&module)
        .unwrap();
    assert_eq!(candidate.type_token(), decoy);
    Ok(())
}

#[test]
fn test_recovers_quicklz_payload_and_merges_it() -> Result<()> {
    let mut module = reactor_module(&quicklz_stored(b"hidden resources"))?;

    let outcome = ResolverEngine::default().process(&mut module)?;
    let resource = outcome.resource().unwrap();
    assert_eq!(resource.name, RESOURCE);
    assert_eq!(resource.data, b"hidden resources");
    assert!(outcome.merged());
    assert_eq!(module.resource(RESOURCE).unwrap().data, b"hidden resources");
    assert_eq!(module.resources().len(), 1);

    let events = outcome.events();
    assert!(events.has(EventKind::ResolverDetected));
    assert!(events.has(EventKind::InitializerLocated));
    assert!(events.has(EventKind::MethodNormalized));
    assert!(events.has(EventKind::ResourceRecovered));
    Ok(())
}

#[test]
fn test_recovers_compressed_quicklz_payload() -> Result<()> {
    let stream = [
        0x0D, 21, 16, 0x10, 0, 0, 0x80, b'a', b'b', b'c', b'd', 0x10, b'd', b'a', b'b', b'c',
        b'd', b'X', b'Y', b'Z', b'W',
    ];
    let mut module = reactor_module(&stream)?;

    let outcome = ResolverEngine::default().process(&mut module)?;
    assert_eq!(
        outcome.resource().map(|r| r.data.as_slice()),
        Some(&b"abcdabcdabcdXYZW"[..])
    );
    Ok(())
}

#[test]
fn test_deflate_round_trip_is_bit_exact() -> Result<()> {
    let plaintext: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
    let mut module = reactor_module(&deflate(&plaintext))?;

    let engine = ResolverEngine::new(
        ResolverConfig::default().with_decompression(Decompression::Deflate),
    );
    let outcome = engine.process(&mut module)?;
    assert_eq!(outcome.resource().unwrap().data, plaintext);
    assert_eq!(module.resource(RESOURCE).unwrap().data, plaintext);
    Ok(())
}

#[test]
fn test_corrupt_ciphertext_is_reported() -> Result<()> {
    let mut module = reactor_module(&quicklz_stored(b"payload"))?;
    module.upsert_resource(RESOURCE, vec![0u8; 15]);

    let log = EventLog::new();
    let result = ResolverEngine::default().process_with_log(&mut module, &log);
    assert!(matches!(result, Err(Error::Decryption(_))));
    assert_eq!(log.errors().count(), 1);
    Ok(())
}

#[test]
fn test_strict_check_needs_embedded_resource_name() -> Result<()> {
    let mut module = Module::new("protected.exe");
    let ty = add_resolver_type(
        &mut module,
        "c",
        &[wellknown::BOOLEAN, wellknown::OBJECT, wellknown::OBJECT],
    )?;
    let keys = add_key_holder(&mut module)?;
    add_handler(&mut module, ty, &keys, "not-embedded")?;

    let lenient = ResolverEngine::new(ResolverConfig::detection_only());
    assert!(lenient.detect(&module).is_some());

    let strict = ResolverEngine::new(
        ResolverConfig::detection_only().with_strict_decrypter_check(true),
    );
    assert!(strict.detect(&module).is_none());
    Ok(())
}

fn smartassembly_module(filler: OpCode) -> Result<(Module, Token)> {
    let mut module = Module::new("app.exe");
    let ty = add_resolver_type(&mut module, "SA", &[wellknown::ASSEMBLY])?;
    let load = MethodRef::new(
        TypeRef::new("System.Reflection", "Assembly", "mscorlib"),
        "Load",
        MethodSignature::new(wellknown::ASSEMBLY, &[wellknown::STRING]),
    );
    let handler = module.add_method(
        ty,
        "Resolve",
        MethodModifiers::STATIC,
        handler_signature(),
        Some(MethodBody::new(
            vec![
                Instruction::ldstr("Payload, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"),
                Instruction::simple(filler),
                Instruction::call(load),
                Instruction::simple(OpCode::Ret),
            ],
            Vec::new(),
        )),
    )?;
    Ok((module, handler))
}

fn smartassembly_engine(config: ResolverConfig) -> ResolverEngine {
    let registry = AssemblyRegistry::new();
    registry.register(EmbeddedAssemblyInfo::new(
        "Payload, Version=1.0.0.0",
        "Payload.dll.resources",
    ));
    let collaborators = Collaborators {
        normalizer: Arc::new(FillerStripper::new(config.filler.clone())),
        assemblies: Arc::new(registry),
        ..Collaborators::default()
    };
    ResolverEngine::with_collaborators(config, collaborators)
}

#[test]
fn test_smartassembly_resolver_end_to_end() -> Result<()> {
    let (mut module, handler) = smartassembly_module(OpCode::Nop)?;
    let before = module.resources().to_vec();

    let outcome = smartassembly_engine(ResolverConfig::default()).process(&mut module)?;
    let candidate = outcome.candidate().unwrap();
    assert_eq!(candidate.variant(), ResolverVariant::SmartAssembly);
    assert_eq!(candidate.handler(), handler);
    assert_eq!(
        candidate.resource_info().unwrap().resource_name,
        "Payload.dll.resources"
    );
    assert!(candidate.init_method().is_none());
    assert!(outcome.resource().is_none());
    assert!(!outcome.merged());
    assert_eq!(module.resources(), before.as_slice());
    Ok(())
}

#[test]
fn test_filler_set_is_configurable() -> Result<()> {
    let (module, _) = smartassembly_module(OpCode::Break)?;

    assert!(smartassembly_engine(ResolverConfig::detection_only())
        .detect(&module)
        .is_none());

    let config = ResolverConfig::detection_only().with_filler(vec![OpCode::Nop, OpCode::Break]);
    assert!(smartassembly_engine(config).detect(&module).is_some());
    Ok(())
}

#[test]
fn test_variant_selection() -> Result<()> {
    let module = reactor_module(&quicklz_stored(b"payload"))?;
    let engine = ResolverEngine::new(
        ResolverConfig::detection_only().with_variants(vec![ResolverVariant::SmartAssembly]),
    );
    assert!(engine.detect(&module).is_none());
    Ok(())
}

#[test]
fn test_process_modules_in_parallel() -> Result<()> {
    let mut modules = Vec::new();
    for i in 0..16u8 {
        if i % 4 == 0 {
            modules.push(Module::new(format!("clean{i}.dll")));
        } else {
            modules.push(reactor_module(&quicklz_stored(&[i; 8]))?);
        }
    }

    let results = ResolverEngine::default().process_modules(&mut modules);
    assert_eq!(results.len(), modules.len());
    for (i, (result, module)) in results.iter().zip(&modules).enumerate() {
        let outcome = result.as_ref().unwrap();
        if i % 4 == 0 {
            assert!(!outcome.detected());
        } else {
            assert_eq!(module.resource(RESOURCE).unwrap().data, vec![i as u8; 8]);
        }
    }
    Ok(())
}
