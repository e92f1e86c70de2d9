//! Field-shape classification.
//!
//! Obfuscators reorder the fields of their generated types between builds, but the multiset
//! of declared field types stays fixed. [`FieldTypes`] counts a type's fields by declared
//! type name so a detector can test that multiset against the closed set of shapes it
//! accepts.

use std::collections::HashMap;

use crate::metadata::typesystem::{wellknown, FieldDeclaration};

/// Occurrence count of each declared field type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTypes {
    counts: HashMap<String, usize>,
    total: usize,
}

impl FieldTypes {
    /// Counts `fields` by declared type name.
    #[must_use]
    pub fn new(fields: &[FieldDeclaration]) -> Self {
        let mut counts = HashMap::new();
        for field in fields {
            *counts.entry(field.field_type.clone()).or_insert(0) += 1;
        }
        Self {
            counts,
            total: fields.len(),
        }
    }

    /// Number of fields declared with type `type_name`.
    #[must_use]
    pub fn count(&self, type_name: &str) -> usize {
        self.counts.get(type_name).copied().unwrap_or(0)
    }

    /// Total number of fields counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Counts `fields` if there are exactly `required` of them.
///
/// Returns `None` for any other cardinality, whatever the types involved.
#[must_use]
pub fn classify(fields: &[FieldDeclaration], required: usize) -> Option<FieldTypes> {
    if fields.len() != required {
        return None;
    }
    Some(FieldTypes::new(fields))
}

/// The field layouts of an encrypted-resource resolver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverFieldShape {
    /// `{ bool, object, object }`
    ObjectPair,
    /// `{ bool, Assembly, string[] }`
    AssemblyAndNames,
}

impl ResolverFieldShape {
    /// Number of fields every accepted shape has.
    pub const FIELD_COUNT: usize = 3;

    /// Matches `fields` against the accepted shapes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dotresolve::deobfuscation::{classify, ResolverFieldShape};
    /// use dotresolve::metadata::{module::Module, typesystem::{wellknown, TypeRef}};
    ///
    /// let mut module = Module::new("app.exe");
    /// let ty = module.add_type("", "R", Some(TypeRef::object()));
    /// for field_type in [wellknown::OBJECT, wellknown::BOOLEAN, wellknown::OBJECT] {
    ///     module.add_field(ty, "f", field_type, true, None).unwrap();
    /// }
    ///
    /// let fields = &module.type_def(ty).unwrap().fields;
    /// assert_eq!(ResolverFieldShape::detect(fields), Some(ResolverFieldShape::ObjectPair));
    /// assert!(classify(fields, 4).is_none());
    /// ```
    #[must_use]
    pub fn detect(fields: &[FieldDeclaration]) -> Option<Self> {
        let types = classify(fields, Self::FIELD_COUNT)?;
        if types.count(wellknown::BOOLEAN) != 1 {
            return None;
        }
        if types.count(wellknown::OBJECT) == 2 {
            return Some(Self::ObjectPair);
        }
        if types.count(wellknown::ASSEMBLY) == 1 && types.count(wellknown::STRING_ARRAY) == 1 {
            return Some(Self::AssemblyAndNames);
        }
        None
    }
}
