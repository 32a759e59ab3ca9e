//! Schema declarations.
//!
//! A [`TypeDecl`] is what a schema author writes: a named type, whether it
//! is an entity or a component, its fields and the relationships those
//! fields express. Declarations are turned into
//! [`SchemaDescriptor`](super::SchemaDescriptor)s by the registry.

use serde::{Deserialize, Serialize};

/// Whether a declared type has its own graph identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRole {
    /// Becomes a node.
    Entity,
    /// Value object folded into its owning entity.
    Component,
}

/// Declared value type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "of")]
pub enum FieldType {
    /// A scalar or a list of scalars.
    Scalar,
    /// A reference to another declared type.
    Ref(String),
    /// A list of another declared type.
    List(String),
}

/// Relationship metadata attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeDecl {
    /// Explicit label; `None` means the label is derived from the field name.
    pub label: Option<String>,
    /// Emit a reverse companion edge for this relationship at build time.
    pub reverse: bool,
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub edge: Option<EdgeDecl>,
}

/// Declaration of one schema type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub role: TypeRole,
    /// Ordered identity field names; empty means content identity.
    pub identity_fields: Vec<String>,
    /// Compare identity values case-insensitively.
    pub case_insensitive_identity: bool,
    /// Fields in declaration order.
    pub fields: Vec<FieldDecl>,
}

impl TypeDecl {
    /// Declare an entity type.
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, TypeRole::Entity)
    }

    /// Declare a component type.
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(name, TypeRole::Component)
    }

    fn new(name: impl Into<String>, role: TypeRole) -> Self {
        Self {
            name: name.into(),
            role,
            identity_fields: Vec::new(),
            case_insensitive_identity: false,
            fields: Vec::new(),
        }
    }

    /// Set the identity fields, in order.
    pub fn identity<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Lowercase identity values before hashing.
    pub fn case_insensitive_identity(mut self) -> Self {
        self.case_insensitive_identity = true;
        self
    }

    /// Add a required scalar field.
    pub fn scalar(self, name: impl Into<String>) -> Self {
        self.field(name, FieldType::Scalar, true, None)
    }

    /// Add an optional scalar field.
    pub fn optional_scalar(self, name: impl Into<String>) -> Self {
        self.field(name, FieldType::Scalar, false, None)
    }

    /// Add a field referencing a component type.
    pub fn component_field(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.field(name, FieldType::Ref(type_name.into()), false, None)
    }

    /// Add a list of components.
    pub fn component_list(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.field(name, FieldType::List(type_name.into()), false, None)
    }

    /// Add an entity reference whose label is derived from the field name.
    pub fn entity_field(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.field(
            name,
            FieldType::Ref(type_name.into()),
            false,
            Some(EdgeDecl::default()),
        )
    }

    /// Add a list of entities whose label is derived from the field name.
    pub fn entity_list(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.field(
            name,
            FieldType::List(type_name.into()),
            false,
            Some(EdgeDecl::default()),
        )
    }

    /// Add an entity reference with an explicit edge label.
    pub fn edge(
        self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let edge = EdgeDecl {
            label: Some(label.into()),
            reverse: false,
        };
        self.field(name, FieldType::Ref(type_name.into()), false, Some(edge))
    }

    /// Add a list of entities with an explicit edge label.
    pub fn edge_list(
        self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let edge = EdgeDecl {
            label: Some(label.into()),
            reverse: false,
        };
        self.field(name, FieldType::List(type_name.into()), false, Some(edge))
    }

    /// Mark the named relationship field as bidirectional.
    pub fn reverse(mut self, name: &str) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.edge.get_or_insert_with(EdgeDecl::default).reverse = true;
        }
        self
    }

    /// Mark a previously declared field as required.
    pub fn required(mut self, name: &str) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.required = true;
        }
        self
    }

    /// Add an arbitrary field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        required: bool,
        edge: Option<EdgeDecl>,
    ) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            field_type,
            required,
            edge,
        });
        self
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_entity(&self) -> bool {
        self.role == TypeRole::Entity
    }
}

/// Types that can describe their own schema.
///
/// Implemented by the Rust structs extraction produces, so a registry can be
/// populated with `registry.register::<Invoice>()`.
pub trait Describe {
    fn declare() -> TypeDecl;
}

/// Derive an implicit edge label from a field name (`lives_at` -> `LIVES_AT`).
pub fn implicit_label(field_name: &str) -> String {
    let mut label = String::with_capacity(field_name.len() + 4);
    let mut prev_lower = false;
    for ch in field_name.chars() {
        if ch == '-' || ch == ' ' || ch == '_' {
            if !label.ends_with('_') && !label.is_empty() {
                label.push('_');
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            label.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        label.extend(ch.to_uppercase());
    }
    label.trim_end_matches('_').to_string()
}
