//! Resolved schema descriptors consumed by the graph builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How the builder treats a field, resolved once from its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "of")]
pub enum FieldKind {
    /// Stored as a node property (scalar or list of scalars).
    Scalar,
    /// Flattened into the owning entity.
    Component(String),
    /// Becomes an edge to a node of the named type.
    Entity(String),
    /// Each element flattened into the owning entity.
    ComponentList(String),
    /// One edge per element.
    EntityList(String),
}

impl FieldKind {
    /// The referenced type, if the field is not a scalar.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::Scalar => None,
            FieldKind::Component(t)
            | FieldKind::Entity(t)
            | FieldKind::ComponentList(t)
            | FieldKind::EntityList(t) => Some(t),
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, FieldKind::Entity(_) | FieldKind::EntityList(_))
    }
}

/// Relationship metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub label: String,
    pub reverse: bool,
    /// Label was derived from the field name rather than declared.
    pub implicit: bool,
}

/// A described field: name, kind and whether the schema requires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribedField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Everything the builder needs to know about one schema type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub type_name: String,
    pub is_entity: bool,
    /// Ordered identity fields; empty means content identity.
    pub identity_fields: Vec<String>,
    pub case_insensitive_identity: bool,
    /// Fields in declaration order.
    pub fields: Vec<DescribedField>,
    /// Relationship fields keyed by field name.
    pub edges: BTreeMap<String, EdgeSpec>,
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&DescribedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn edge(&self, field_name: &str) -> Option<&EdgeSpec> {
        self.edges.get(field_name)
    }

    /// Whether ids for this type come from hashing content.
    pub fn uses_content_identity(&self) -> bool {
        self.identity_fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_kind_target() {
        assert_eq!(FieldKind::Scalar.target(), None);
        assert_eq!(FieldKind::EntityList("Item".into()).target(), Some("Item"));
        assert!(FieldKind::Entity("Org".into()).is_relationship());
        assert!(!FieldKind::Component("Address".into()).is_relationship());
    }
}
