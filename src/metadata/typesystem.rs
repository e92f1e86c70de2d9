//! Type and field declarations, plus the references instructions use to point at them.
//!
//! Declarations ([`TypeDeclaration`], [`FieldDeclaration`]) are owned by a
//! [`crate::metadata::module::Module`]. References ([`TypeRef`], [`FieldRef`]) are what
//! instruction operands carry; the same logical type can therefore show up as several
//! independent values, and must be compared structurally through [`TypeRef::matches`]
//! rather than by address.

use std::fmt;

use crate::metadata::token::Token;

/// Fully qualified names of the framework types the resolver detectors look for.
pub mod wellknown {
    /// `System.Object`, the universal root type.
    pub const OBJECT: &str = "System.Object";
    /// `System.Boolean`.
    pub const BOOLEAN: &str = "System.Boolean";
    /// `System.Void`.
    pub const VOID: &str = "System.Void";
    /// `System.String`.
    pub const STRING: &str = "System.String";
    /// `System.String[]`.
    pub const STRING_ARRAY: &str = "System.String[]";
    /// `System.Byte[]`.
    pub const BYTE_ARRAY: &str = "System.Byte[]";
    /// `System.Reflection.Assembly`, the assembly handle type.
    pub const ASSEMBLY: &str = "System.Reflection.Assembly";
    /// `System.ResolveEventArgs`, second parameter of resolve event handlers.
    pub const RESOLVE_EVENT_ARGS: &str = "System.ResolveEventArgs";
    /// Name of instance constructors.
    pub const CTOR: &str = ".ctor";
}

/// Joins a namespace and a name into a full type name.
pub(crate) fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// A reference to a type, as found in operands and base-type slots.
///
/// `scope` is the name of the module (or assembly) defining the type; together with the
/// full name it forms the structural identity of the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
    /// Defining module or assembly
    pub scope: String,
}

impl TypeRef {
    /// Creates a new type reference.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Reference to `System.Object` in the core library.
    #[must_use]
    pub fn object() -> Self {
        Self::new("System", "Object", "mscorlib")
    }

    /// Returns the namespace-qualified name.
    #[must_use]
    pub fn full_name(&self) -> String {
        join_name(&self.namespace, &self.name)
    }

    /// Structural type identity: same full name, defined in the same scope.
    ///
    /// Scope names are assembly names and compare case-insensitively.
    #[must_use]
    pub fn matches(&self, other: &TypeRef) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.scope.eq_ignore_ascii_case(&other.scope)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.scope, self.full_name())
    }
}

/// A reference to a field, as carried by `ldsfld`/`stsfld`/`ldtoken` operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Field name
    pub name: String,
    /// Fully qualified name of the field's declared type
    pub field_type: String,
    /// Type declaring the field
    pub declaring_type: TypeRef,
}

impl FieldRef {
    /// Creates a new field reference.
    pub fn new(
        declaring_type: TypeRef,
        name: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            declaring_type,
        }
    }
}

/// A field declared on a [`TypeDeclaration`].
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    /// Token of this field
    pub token: Token,
    /// Field name
    pub name: String,
    /// Fully qualified name of the declared type
    pub field_type: String,
    /// Owning type (back reference, not ownership)
    pub declaring_type: Token,
    /// Whether the field is static
    pub is_static: bool,
    /// Initial data mapped through a field RVA, if any
    pub initial_data: Option<Vec<u8>>,
}

/// A type declared in a module.
///
/// Methods are held as tokens into the module's method table; fields are stored inline.
#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    /// Token of this type
    pub token: Token,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
    /// Name of the defining module
    pub scope: String,
    /// Base type, `None` for interfaces and `<Module>`
    pub base: Option<TypeRef>,
    /// Declared fields, in declaration order
    pub fields: Vec<FieldDeclaration>,
    /// Declared methods, in declaration order
    pub methods: Vec<Token>,
}

impl TypeDeclaration {
    /// Returns the namespace-qualified name.
    #[must_use]
    pub fn full_name(&self) -> String {
        join_name(&self.namespace, &self.name)
    }

    /// Returns a structural reference to this declaration.
    #[must_use]
    pub fn as_ref(&self) -> TypeRef {
        TypeRef::new(self.namespace.clone(), self.name.clone(), self.scope.clone())
    }

    /// Returns true if `other` refers to this declaration.
    #[must_use]
    pub fn is(&self, other: &TypeRef) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.scope.eq_ignore_ascii_case(&other.scope)
    }

    /// Returns true if the base type is exactly `System.Object`.
    #[must_use]
    pub fn derives_from_object(&self) -> bool {
        self.base
            .as_ref()
            .is_some_and(|base| base.full_name() == wellknown::OBJECT)
    }

    /// Returns the first field whose declared type is `field_type`.
    #[must_use]
    pub fn find_field_of_type(&self, field_type: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.field_type == field_type)
    }

    /// Returns the first static field declared with `field_type`.
    #[must_use]
    pub fn find_static_field_of_type(&self, field_type: &str) -> Option<&FieldDeclaration> {
        self.fields
            .iter()
            .find(|f| f.is_static && f.field_type == field_type)
    }

    /// Returns the field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for TypeDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(base: Option<TypeRef>) -> TypeDeclaration {
        TypeDeclaration {
            token: Token::typedef(1),
            namespace: "Obf".to_string(),
            name: "Resolver".to_string(),
            scope: "app.exe".to_string(),
            base,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[test]
    fn test_full_name() {
        assert_eq!(TypeRef::new("", "Global", "m").full_name(), "Global");
        assert_eq!(TypeRef::object().full_name(), wellknown::OBJECT);
    }

    #[test]
    fn test_matches_is_structural() {
        let a = TypeRef::new("Obf", "Resolver", "App.exe");
        let b = TypeRef::new("Obf", "Resolver", "app.exe");
        let c = TypeRef::new("Obf", "Resolver", "other.dll");
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&TypeRef::new("Obf", "Helper", "app.exe")));
    }

    #[test]
    fn test_declaration_is() {
        let decl = declaration(Some(TypeRef::object()));
        assert!(decl.is(&decl.as_ref()));
        assert!(decl.is(&TypeRef::new("Obf", "Resolver", "APP.EXE")));
        assert!(!decl.is(&TypeRef::new("", "Resolver", "app.exe")));
    }

    #[test]
    fn test_derives_from_object() {
        assert!(declaration(Some(TypeRef::object())).derives_from_object());
        assert!(!declaration(None).derives_from_object());
        let derived = declaration(Some(TypeRef::new("Obf", "Base", "app.exe")));
        assert!(!derived.derives_from_object());
    }

    #[test]
    fn test_find_static_field_of_type() {
        let mut decl = declaration(Some(TypeRef::object()));
        for (row, is_static) in [(1, false), (2, true)] {
            decl.fields.push(FieldDeclaration {
                token: Token::field(row),
                name: format!("asm{row}"),
                field_type: wellknown::ASSEMBLY.to_string(),
                declaring_type: decl.token,
                is_static,
                initial_data: None,
            });
        }

        assert_eq!(decl.find_field_of_type(wellknown::ASSEMBLY).unwrap().name, "asm1");
        assert_eq!(
            decl.find_static_field_of_type(wellknown::ASSEMBLY).unwrap().name,
            "asm2"
        );
        decl.fields.pop();
        assert!(decl.find_static_field_of_type(wellknown::ASSEMBLY).is_none());
    }
}
