//! Stable node identity.
//!
//! Ids have the form `TypeName:<hex>` where `<hex>` is a prefix of the
//! SHA-256 digest of the normalized identity values. The normalization and
//! field-ordering rules below are part of the external contract: exporters
//! key off these ids, so changing them changes every id.
//!
//! - Declared identity: the identity fields' values, in declaration order,
//!   joined with [`FIELD_SEPARATOR`].
//! - Content identity: every non-empty property as `name` [`PAIR_SEPARATOR`]
//!   `value`, sorted by name, joined with [`FIELD_SEPARATOR`].
//!
//! Strings are trimmed (and lowercased for case-insensitive types), integral
//! floats are written without a fractional part, lists join their elements
//! with [`LIST_SEPARATOR`].
//!
//! Values are compared by their normalized text only. JSON types carry no
//! tag, so `"3360"`, `3360`, `3360.0` and `["3360"]` all normalize to `3360`
//! and yield the same id. Property merging compares scalars the same way.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::GraphConfig;
use crate::error::{TesseraError, TesseraResult};
use crate::graph::Properties;
use crate::schema::SchemaDescriptor;

/// Separates identity values (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\u{1f}';
/// Separates a property name from its value in content identity (record separator).
pub const PAIR_SEPARATOR: char = '\u{1e}';
/// Separates list elements (group separator).
pub const LIST_SEPARATOR: char = '\u{1d}';

/// Computes node ids from descriptors and property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolver {
    hash_length: usize,
}

impl IdentityResolver {
    /// Create a resolver keeping `hash_length` hex characters of the digest.
    pub fn new(hash_length: usize) -> Self {
        Self {
            hash_length: hash_length.clamp(
                GraphConfig::MIN_ID_HASH_LENGTH,
                GraphConfig::MAX_ID_HASH_LENGTH,
            ),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.id_hash_length)
    }

    pub fn hash_length(&self) -> usize {
        self.hash_length
    }

    /// Resolve the id of an entity from its properties.
    ///
    /// Identity fields are top-level scalars, so they are read from the same
    /// property map the node stores.
    pub fn resolve(
        &self,
        descriptor: &SchemaDescriptor,
        properties: &Properties,
    ) -> TesseraResult<String> {
        let key = if descriptor.uses_content_identity() {
            content_key(properties)
        } else {
            declared_key(descriptor, properties)?
        };
        Ok(self.format_id(&descriptor.type_name, &key))
    }

    fn format_id(&self, type_name: &str, key: &str) -> String {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        format!("{}:{}", type_name, &digest[..self.hash_length])
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

fn declared_key(descriptor: &SchemaDescriptor, properties: &Properties) -> TesseraResult<String> {
    let mut parts = Vec::with_capacity(descriptor.identity_fields.len());
    for field in &descriptor.identity_fields {
        let value = match properties.get(field) {
            None | Some(Value::Null) => {
                return Err(TesseraError::missing_identity(&descriptor.type_name, field))
            }
            Some(value) => value,
        };
        let mut normalized = normalize(value)
            .ok_or_else(|| TesseraError::empty_identity(&descriptor.type_name, field))?;
        if descriptor.case_insensitive_identity {
            normalized = normalized.to_lowercase();
        }
        parts.push(normalized);
    }
    Ok(join(parts, FIELD_SEPARATOR))
}

fn content_key(properties: &Properties) -> String {
    // BTreeMap iteration is already sorted by property name.
    let parts = properties.iter().filter_map(|(name, value)| {
        normalize(value).map(|v| format!("{}{}{}", name, PAIR_SEPARATOR, v))
    });
    join(parts, FIELD_SEPARATOR)
}

fn join(parts: impl IntoIterator<Item = String>, sep: char) -> String {
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.push_str(&part);
    }
    out
}

/// Normalized string form of a value, or `None` when the value is empty.
pub fn normalize(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(normalize_number(n)),
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(normalize).collect();
            (!parts.is_empty()).then(|| join(parts, LIST_SEPARATOR))
        }
        // serde_json maps iterate in key order, so this is canonical.
        Value::Object(map) => (!map.is_empty()).then(|| value.to_string()),
    }
}

fn normalize_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}
