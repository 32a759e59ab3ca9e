//! Schema registry and descriptor cache.
//!
//! Declarations are registered up front; descriptors are computed lazily on
//! first `describe` and published into a shared cache. Population happens
//! under the write lock with a re-check, so concurrent first use computes
//! each descriptor exactly once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::descriptor::{DescribedField, EdgeSpec, FieldKind, SchemaDescriptor};
use super::types::{implicit_label, Describe, FieldDecl, FieldType, TypeDecl, TypeRole};
use crate::config::GraphConfig;
use crate::error::{ErrorCode, TesseraError, TesseraResult};

type DescriptorCache = HashMap<String, Arc<SchemaDescriptor>>;

/// Owns schema declarations and the descriptors derived from them.
pub struct SchemaRegistry {
    decls: HashMap<String, TypeDecl>,
    cache: RwLock<DescriptorCache>,
    max_depth: usize,
}

impl SchemaRegistry {
    /// Default bound on schema nesting depth.
    pub const DEFAULT_MAX_DEPTH: usize = 4;

    /// Create an empty registry with the default depth bound.
    pub fn new() -> Self {
        Self::with_max_depth(Self::DEFAULT_MAX_DEPTH)
    }

    /// Create an empty registry with a custom depth bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            decls: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
            max_depth,
        }
    }

    /// Create an empty registry bounded by the configured nesting depth.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self::with_max_depth(config.max_nesting_depth)
    }

    /// Register a type that describes itself.
    pub fn register<T: Describe>(&mut self) -> TesseraResult<&mut Self> {
        self.register_decl(T::declare())
    }

    /// Register a declaration.
    ///
    /// Re-registering an identical declaration is a no-op; a different
    /// declaration under an existing name is a schema error.
    pub fn register_decl(&mut self, decl: TypeDecl) -> TesseraResult<&mut Self> {
        if let Some(existing) = self.decls.get(&decl.name) {
            if *existing != decl {
                return Err(TesseraError::Schema {
                    message: format!("type '{}' is registered twice with different shapes", decl.name),
                    code: ErrorCode::SchemaDuplicateType,
                    type_name: Some(decl.name),
                    field: None,
                });
            }
            return Ok(self);
        }
        self.decls.insert(decl.name.clone(), decl);
        // Declarations changed, so previously published descriptors may be stale.
        if let Ok(cache) = self.cache.get_mut() {
            cache.clear();
        }
        Ok(self)
    }

    /// Look up a raw declaration.
    pub fn decl(&self, type_name: &str) -> Option<&TypeDecl> {
        self.decls.get(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decls.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Change the depth bound, dropping descriptors checked against the old one.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        if max_depth == self.max_depth {
            return;
        }
        self.max_depth = max_depth;
        if let Ok(cache) = self.cache.get_mut() {
            cache.clear();
        }
    }

    /// Describe a type, validating it and every type reachable from it.
    pub fn describe(&self, type_name: &str) -> TesseraResult<Arc<SchemaDescriptor>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|e| TesseraError::internal(e.to_string()))?;
            if let Some(descriptor) = cache.get(type_name) {
                return Ok(Arc::clone(descriptor));
            }
        }

        let mut cache = self
            .cache
            .write()
            .map_err(|e| TesseraError::internal(e.to_string()))?;
        if let Some(descriptor) = cache.get(type_name) {
            return Ok(Arc::clone(descriptor));
        }

        let mut stack = Vec::new();
        self.check_nesting(type_name, &mut stack)?;

        // Describe the whole reachable closure before publishing anything, so a
        // broken nested type fails here rather than midway through a build.
        let mut pending = vec![type_name.to_string()];
        let mut described: DescriptorCache = HashMap::new();
        while let Some(name) = pending.pop() {
            if cache.contains_key(&name) || described.contains_key(&name) {
                continue;
            }
            let descriptor = self.build_descriptor(&name)?;
            for field in &descriptor.fields {
                if let Some(target) = field.kind.target() {
                    pending.push(target.to_string());
                }
            }
            debug!(type_name = %name, fields = descriptor.fields.len(), "described schema type");
            described.insert(name, Arc::new(descriptor));
        }
        cache.extend(described);

        cache
            .get(type_name)
            .cloned()
            .ok_or_else(|| TesseraError::unknown_type(type_name))
    }

    /// Describe every registered type.
    pub fn describe_all(&self) -> TesseraResult<Vec<Arc<SchemaDescriptor>>> {
        self.type_names()
            .into_iter()
            .map(|name| self.describe(name))
            .collect()
    }

    fn lookup(&self, type_name: &str) -> TesseraResult<&TypeDecl> {
        self.decls
            .get(type_name)
            .ok_or_else(|| TesseraError::unknown_type(type_name))
    }

    /// Reject cycles and nesting deeper than the configured bound.
    fn check_nesting(&self, type_name: &str, stack: &mut Vec<String>) -> TesseraResult<()> {
        if let Some(pos) = stack.iter().position(|t| t == type_name) {
            let mut chain: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
            chain.push(type_name);
            return Err(TesseraError::Schema {
                message: format!("cyclic schema reference: {}", chain.join(" -> ")),
                code: ErrorCode::SchemaCycle,
                type_name: Some(type_name.to_string()),
                field: None,
            });
        }
        // The root sits at depth 0.
        if stack.len() > self.max_depth {
            return Err(TesseraError::Schema {
                message: format!(
                    "type '{}' is nested {} levels deep (max {})",
                    type_name,
                    stack.len(),
                    self.max_depth
                ),
                code: ErrorCode::SchemaDepthExceeded,
                type_name: Some(type_name.to_string()),
                field: None,
            });
        }

        let decl = self.lookup(type_name)?;
        stack.push(type_name.to_string());
        for field in &decl.fields {
            if let FieldType::Ref(target) | FieldType::List(target) = &field.field_type {
                self.check_nesting(target, stack)?;
            }
        }
        stack.pop();
        Ok(())
    }

    fn build_descriptor(&self, type_name: &str) -> TesseraResult<SchemaDescriptor> {
        let decl = self.lookup(type_name)?;

        if decl.role == TypeRole::Component && !decl.identity_fields.is_empty() {
            return Err(TesseraError::invalid_identity(
                &decl.name,
                &decl.identity_fields[0],
                "is declared on a component, which has no identity",
            ));
        }
        for name in &decl.identity_fields {
            validate_identity_field(decl, name)?;
        }

        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut edges = std::collections::BTreeMap::new();
        for field in &decl.fields {
            let kind = self.resolve_kind(decl, field)?;
            if kind.is_relationship() {
                let declared = field.edge.clone().unwrap_or_default();
                let spec = match declared.label {
                    Some(label) if !label.trim().is_empty() => EdgeSpec {
                        label,
                        reverse: declared.reverse,
                        implicit: false,
                    },
                    _ => EdgeSpec {
                        label: implicit_label(&field.name),
                        reverse: declared.reverse,
                        implicit: true,
                    },
                };
                edges.insert(field.name.clone(), spec);
            }
            fields.push(DescribedField {
                name: field.name.clone(),
                kind,
                required: field.required,
            });
        }

        Ok(SchemaDescriptor {
            type_name: decl.name.clone(),
            is_entity: decl.is_entity(),
            identity_fields: decl.identity_fields.clone(),
            case_insensitive_identity: decl.case_insensitive_identity,
            fields,
            edges,
        })
    }

    fn resolve_kind(&self, owner: &TypeDecl, field: &FieldDecl) -> TesseraResult<FieldKind> {
        let (target, is_list) = match &field.field_type {
            FieldType::Scalar => {
                if field.edge.is_some() {
                    return Err(TesseraError::Schema {
                        message: format!(
                            "relationship field '{}.{}' must reference an entity type",
                            owner.name, field.name
                        ),
                        code: ErrorCode::SchemaInvalidRelationship,
                        type_name: Some(owner.name.clone()),
                        field: Some(field.name.clone()),
                    });
                }
                return Ok(FieldKind::Scalar);
            }
            FieldType::Ref(target) => (target, false),
            FieldType::List(target) => (target, true),
        };

        let target_decl = self.lookup(target)?;
        match (target_decl.role, is_list) {
            (TypeRole::Entity, false) => Ok(FieldKind::Entity(target.clone())),
            (TypeRole::Entity, true) => Ok(FieldKind::EntityList(target.clone())),
            (TypeRole::Component, _) if field.edge.is_some() => Err(TesseraError::Schema {
                message: format!(
                    "relationship field '{}.{}' targets component '{}', which has no identity",
                    owner.name, field.name, target
                ),
                code: ErrorCode::SchemaInvalidRelationship,
                type_name: Some(owner.name.clone()),
                field: Some(field.name.clone()),
            }),
            (TypeRole::Component, false) => Ok(FieldKind::Component(target.clone())),
            (TypeRole::Component, true) => Ok(FieldKind::ComponentList(target.clone())),
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_identity_field(decl: &TypeDecl, name: &str) -> TesseraResult<()> {
    let field = decl
        .get_field(name)
        .ok_or_else(|| TesseraError::invalid_identity(&decl.name, name, "does not exist"))?;
    if field.field_type != FieldType::Scalar || field.edge.is_some() {
        return Err(TesseraError::invalid_identity(
            &decl.name,
            name,
            "must be a scalar field",
        ));
    }
    if !field.required {
        return Err(TesseraError::invalid_identity(
            &decl.name,
            name,
            "must be a required field",
        ));
    }
    Ok(())
}
