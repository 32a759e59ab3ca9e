//! tessera-core - Schema-driven knowledge graph construction.
//!
//! This crate turns validated, schema-typed instances into a directed
//! knowledge graph with deterministic node ids, merges repeated entities
//! within and across extraction units, and reports the property conflicts
//! it resolved along the way.
//!
//! # Example
//!
//! ```ignore
//! use tessera_core::{ExtractionUnit, GraphConfig, GraphPipeline, SchemaRegistry, SourceRef, TypeDecl};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register_decl(TypeDecl::entity("Organization").identity(["name"]).scalar("name"))?
//!     .register_decl(
//!         TypeDecl::entity("Invoice")
//!             .identity(["number"])
//!             .scalar("number")
//!             .edge("issued_by", "Organization", "ISSUED_BY"),
//!     )?;
//!
//! let pipeline = GraphPipeline::new(registry, GraphConfig::default())?;
//! let output = pipeline.run("Invoice", &[
//!     ExtractionUnit::new(SourceRef::page(1), page_one),
//!     ExtractionUnit::new(SourceRef::page(2), page_two),
//! ])?;
//!
//! println!("{} nodes, {} conflicts", output.graph.node_count(), output.conflicts.len());
//! ```

pub mod builder;
pub mod config;
pub mod consolidate;
pub mod dedup;
pub mod error;
pub mod graph;
pub mod identity;
pub mod merge;
pub mod pipeline;
pub mod schema;

// Re-export commonly used types
pub use builder::GraphBuilder;
pub use config::{FailurePolicy, GraphConfig};
pub use consolidate::{add_reverse_edges, Consolidation, Consolidator};
pub use dedup::Deduplicator;
pub use error::{ErrorCode, TesseraError, TesseraResult};
pub use graph::{Edge, EdgeKey, Graph, GraphData, GraphStats, Node, Properties, SourceRef};
pub use identity::IdentityResolver;
pub use merge::{ConflictLog, ConflictPolicy, ConflictSubject, MergeConflict, Resolution};
pub use pipeline::{BatchOutcome, ExtractionUnit, GraphPipeline, PipelineOutput, UnitFailure};
pub use schema::{Describe, SchemaDescriptor, SchemaRegistry, TypeDecl};
