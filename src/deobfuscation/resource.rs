//! Encrypted resource handle of a detected resolver.
//!
//! The handler method of an encrypted-resource resolver names the embedded resource it reads
//! with a string literal and loads its AES key and IV from static fields with initial data.
//! Once the handler body has been normalized and its strings decrypted, [`EncryptedResource::init`]
//! reads those three pieces; [`EncryptedResource::decrypt`] then produces the compressed
//! plaintext.

use crate::{
    assembly::{OpCode, Operand},
    metadata::{module::Module, token::Token},
    utils::crypto::{aes_cbc_decrypt, is_aes_key_len, AES_BLOCK_SIZE},
    Error, Result,
};

/// A recovered resource: name and plaintext bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedResource {
    /// Resource name
    pub name: String,
    /// Recovered bytes
    pub data: Vec<u8>,
}

impl NamedResource {
    /// Creates a named resource.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Size of the recovered data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Decrypter state for the resource behind a resolver handler.
#[derive(Debug, Clone)]
pub struct EncryptedResource {
    method: Token,
    initialized: bool,
    resource_name: Option<String>,
    key: Vec<u8>,
    iv: Vec<u8>,
    recovered: Option<NamedResource>,
}

impl EncryptedResource {
    /// Creates an uninitialized handle for the handler method `method`.
    #[must_use]
    pub fn new(method: Token) -> Self {
        Self {
            method,
            initialized: false,
            resource_name: None,
            key: Vec::new(),
            iv: Vec::new(),
            recovered: None,
        }
    }

    /// The handler method.
    #[must_use]
    pub fn method(&self) -> Token {
        self.method
    }

    /// Returns true once [`init`](Self::init) ran.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns true if the handler names an embedded resource of the module.
    #[must_use]
    pub fn found_resource(&self) -> bool {
        self.resource_name.is_some()
    }

    /// Name of the encrypted embedded resource, if found.
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// The resource recovered by an earlier call, if any.
    #[must_use]
    pub fn recovered(&self) -> Option<&NamedResource> {
        self.recovered.as_ref()
    }

    pub(crate) fn set_recovered(&mut self, resource: NamedResource) {
        self.recovered = Some(resource);
    }

    /// Reads the resource name, key and IV from the handler body.
    ///
    /// The resource is the first string literal naming an embedded resource of `module`.
    /// Key and IV are the first two field-initializer arrays loaded through `ldtoken`. A
    /// handler that names no resource leaves the handle without one; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the handler is not a method of `module`, and
    /// [`Error::Decryption`] if a resource was found but no usable key and IV were.
    pub fn init(&mut self, module: &Module) -> Result<()> {
        let handler = module
            .method(self.method)
            .ok_or_else(|| malformed_error!("handler {} is not part of this module", self.method))?;
        let instructions = handler.instructions();

        self.initialized = true;
        self.resource_name = instructions.iter().find_map(|instr| match &instr.operand {
            Operand::String(name)
                if instr.opcode == OpCode::Ldstr && module.resource(name).is_some() =>
            {
                Some(name.clone())
            }
            _ => None,
        });
        let Some(resource) = self.resource_name.as_deref() else {
            return Ok(());
        };

        let mut arrays = instructions
            .iter()
            .filter(|instr| instr.opcode == OpCode::Ldtoken)
            .filter_map(|instr| instr.as_field())
            .filter_map(|field| module.resolve_field(field))
            .filter_map(|field| field.initial_data.as_ref());

        let key = arrays.next().ok_or_else(|| {
            Error::Decryption(format!("no key array found for resource '{resource}'"))
        })?;
        let iv = arrays.next().ok_or_else(|| {
            Error::Decryption(format!("no IV array found for resource '{resource}'"))
        })?;

        if !is_aes_key_len(key.len()) {
            return Err(Error::Decryption(format!(
                "key for resource '{resource}' has invalid length {}",
                key.len()
            )));
        }
        if iv.len() != AES_BLOCK_SIZE {
            return Err(Error::Decryption(format!(
                "IV for resource '{resource}' has invalid length {}",
                iv.len()
            )));
        }

        self.key = key.clone();
        self.iv = iv.clone();
        Ok(())
    }

    /// Decrypts the embedded resource with the key and IV read by [`init`](Self::init).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decryption`] if no resource was found, the resource is missing from
    /// `module`, or the ciphertext is rejected.
    pub fn decrypt(&self, module: &Module) -> Result<Vec<u8>> {
        let name = self
            .resource_name
            .as_deref()
            .ok_or_else(|| Error::Decryption("no encrypted resource located".to_string()))?;
        let resource = module.resource(name).ok_or_else(|| {
            Error::Decryption(format!("resource '{name}' is not embedded in the module"))
        })?;

        aes_cbc_decrypt(&self.key, &self.iv, &resource.data).ok_or_else(|| {
            Error::Decryption(format!("ciphertext of resource '{name}' was rejected"))
        })
    }
}
