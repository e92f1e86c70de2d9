//! The in-memory module model consumed by the resolver detectors.
//!
//! A [`Module`] owns its type declarations, the method table (which doubles as the arena of
//! method bodies) and its embedded resources. It is populated by whichever binary reader the
//! host uses, then handed to [`crate::deobfuscation::ResolverEngine`], which is the only
//! writer while a module is being processed.

use bitflags::bitflags;

use crate::{
    metadata::{
        method::{MethodBody, MethodDeclaration, MethodModifiers, MethodRef, MethodSignature},
        token::{Token, TABLE_METHODDEF, TABLE_TYPEDEF},
        typesystem::{FieldDeclaration, FieldRef, TypeDeclaration, TypeRef},
    },
    Result,
};

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// Visibility of a manifest resource (ECMA-335 §II.23.1.9)
    pub struct ManifestResourceAttributes: u32 {
        /// The resource is exported from the assembly
        const PUBLIC = 0x0001;
        /// The resource is private to the assembly
        const PRIVATE = 0x0002;
    }
}

/// A resource embedded in a module.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedResource {
    /// Resource name
    pub name: String,
    /// Visibility flags
    pub flags: ManifestResourceAttributes,
    /// Raw resource bytes
    pub data: Vec<u8>,
}

impl EmbeddedResource {
    /// Creates a private embedded resource.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            flags: ManifestResourceAttributes::PRIVATE,
            data,
        }
    }

    /// Returns the size of the resource data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A loaded module: types, methods and resources.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    types: Vec<TypeDeclaration>,
    methods: Vec<MethodDeclaration>,
    resources: Vec<EmbeddedResource>,
    field_count: u32,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Module name, which is also the scope of every type it declares.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type declarations, in declaration order.
    #[must_use]
    pub fn types(&self) -> &[TypeDeclaration] {
        &self.types
    }

    /// The method table, in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDeclaration] {
        &self.methods
    }

    /// Embedded resources.
    #[must_use]
    pub fn resources(&self) -> &[EmbeddedResource] {
        &self.resources
    }

    /// Looks up a type by token.
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&TypeDeclaration> {
        if token.table() != TABLE_TYPEDEF {
            return None;
        }
        self.types.get(token.index()?)
    }

    /// Looks up a type by token for modification.
    pub fn type_def_mut(&mut self, token: Token) -> Option<&mut TypeDeclaration> {
        if token.table() != TABLE_TYPEDEF {
            return None;
        }
        self.types.get_mut(token.index()?)
    }

    /// Looks up a method by token.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDeclaration> {
        if token.table() != TABLE_METHODDEF {
            return None;
        }
        self.methods.get(token.index()?)
    }

    /// Methods declared on `ty`, in declaration order.
    pub fn methods_of<'a>(
        &'a self,
        ty: &'a TypeDeclaration,
    ) -> impl Iterator<Item = &'a MethodDeclaration> + 'a {
        ty.methods.iter().filter_map(|token| self.method(*token))
    }

    /// Finds the first method called `name` on `ty`.
    #[must_use]
    pub fn find_method<'a>(&'a self, ty: &'a TypeDeclaration, name: &str) -> Option<&'a MethodDeclaration> {
        self.methods_of(ty).find(|m| m.name == name)
    }

    /// Builds a structural reference to the method behind `token`.
    #[must_use]
    pub fn method_ref(&self, token: Token) -> Option<MethodRef> {
        let method = self.method(token)?;
        let owner = self.type_def(method.declaring_type)?;
        Some(method.as_ref(owner.as_ref()))
    }

    /// Resolves a field reference to a field declared in this module.
    #[must_use]
    pub fn resolve_field(&self, field: &FieldRef) -> Option<&FieldDeclaration> {
        self.types
            .iter()
            .find(|ty| ty.is(&field.declaring_type))
            .and_then(|ty| ty.field(&field.name))
    }

    /// Finds an embedded resource by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&EmbeddedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Declares a new type and returns its token.
    pub fn add_type(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: Option<TypeRef>,
    ) -> Token {
        let token = Token::typedef(self.types.len() as u32 + 1);
        self.types.push(TypeDeclaration {
            token,
            namespace: namespace.into(),
            name: name.into(),
            scope: self.name.clone(),
            base,
            fields: Vec::new(),
            methods: Vec::new(),
        });
        token
    }

    /// Declares a field on `owner` and returns its token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `owner` is not a type of this module.
    pub fn add_field(
        &mut self,
        owner: Token,
        name: impl Into<String>,
        field_type: impl Into<String>,
        is_static: bool,
        initial_data: Option<Vec<u8>>,
    ) -> Result<Token> {
        let index = self.type_index(owner)?;
        self.field_count += 1;
        let token = Token::field(self.field_count);
        self.types[index].fields.push(FieldDeclaration {
            token,
            name: name.into(),
            field_type: field_type.into(),
            declaring_type: owner,
            is_static,
            initial_data,
        });
        Ok(token)
    }

    /// Declares a method on `owner` and returns its token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `owner` is not a type of this module.
    pub fn add_method(
        &mut self,
        owner: Token,
        name: impl Into<String>,
        modifiers: MethodModifiers,
        signature: MethodSignature,
        body: Option<MethodBody>,
    ) -> Result<Token> {
        let index = self.type_index(owner)?;
        let token = Token::methoddef(self.methods.len() as u32 + 1);
        self.methods.push(MethodDeclaration {
            token,
            name: name.into(),
            declaring_type: owner,
            modifiers,
            signature,
            body,
        });
        self.types[index].methods.push(token);
        Ok(token)
    }

    /// Appends an embedded resource.
    pub fn add_resource(&mut self, resource: EmbeddedResource) {
        self.resources.push(resource);
    }

    /// Stores `data` under `name`, keeping the flags of an existing resource with that name.
    ///
    /// Returns true if an existing resource was replaced.
    pub fn upsert_resource(&mut self, name: &str, data: Vec<u8>) -> bool {
        if let Some(existing) = self.resources.iter_mut().find(|r| r.name == name) {
            existing.data = data;
            true
        } else {
            self.resources.push(EmbeddedResource::new(name, data));
            false
        }
    }

    /// Replaces the body of the method behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the token does not name a method of this module.
    pub fn replace_body(&mut self, token: Token, body: MethodBody) -> Result<()> {
        let method = token
            .index()
            .filter(|_| token.table() == TABLE_METHODDEF)
            .and_then(|index| self.methods.get_mut(index))
            .ok_or_else(|| malformed_error!("method token {} is not part of this module", token))?;
        method.body = Some(body);
        Ok(())
    }

    fn type_index(&self, token: Token) -> Result<usize> {
        token
            .index()
            .filter(|index| token.table() == TABLE_TYPEDEF && *index < self.types.len())
            .ok_or_else(|| malformed_error!("type token {} is not part of this module", token))
    }
}
