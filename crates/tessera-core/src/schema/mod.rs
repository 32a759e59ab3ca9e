//! Schema introspection.
//!
//! Schema authors declare types with [`TypeDecl`] (or implement
//! [`Describe`]); the [`SchemaRegistry`] validates those declarations and
//! publishes one [`SchemaDescriptor`] per type.
//!
//! # Components
//!
//! - `types`: declaration builders and the `Describe` capability
//! - `descriptor`: resolved field kinds and edge specs
//! - `registry`: validation, depth/cycle checks, compute-once cache

mod descriptor;
mod registry;
mod types;

pub use descriptor::{DescribedField, EdgeSpec, FieldKind, SchemaDescriptor};
pub use registry::SchemaRegistry;
pub use types::{implicit_label, Describe, EdgeDecl, FieldDecl, FieldType, TypeDecl, TypeRole};
