//! Graph construction from validated instances.
//!
//! The builder walks one instance depth-first, driven by the descriptors of
//! its schema:
//!
//! - scalars become properties of the nearest enclosing entity
//! - components are flattened into that entity, keyed `field.sub_field`
//! - elements of a component list are flattened under their index, keyed
//!   `field[i].sub_field`, so each element stays a whole record
//! - entity fields become nodes of their own plus an edge from the enclosing
//!   entity, one edge per element for entity lists
//!
//! A node's id can only be resolved once all of its properties are known, so
//! children are visited first and the edges to them are attached afterwards.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::dedup::Deduplicator;
use crate::error::{TesseraError, TesseraResult};
use crate::graph::{Edge, Graph, Node, Properties, SourceRef};
use crate::identity::IdentityResolver;
use crate::merge::{ConflictLog, MergeConflict};
use crate::schema::{implicit_label, Describe, FieldKind, SchemaDescriptor, SchemaRegistry};

/// Builds one graph per instance.
///
/// Holds only shared read-only state, so one builder can serve many
/// threads at once.
pub struct GraphBuilder<'a> {
    registry: &'a SchemaRegistry,
    config: &'a GraphConfig,
    resolver: IdentityResolver,
    dedup: Deduplicator,
}

/// Edge waiting for its source node's id.
struct PendingEdge {
    label: String,
    reverse: bool,
    target_id: String,
}

/// Mutable state of one build.
struct BuildPass<'b, 'a> {
    builder: &'b GraphBuilder<'a>,
    source: &'b SourceRef,
    graph: Graph,
    log: ConflictLog,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a GraphConfig) -> Self {
        Self {
            registry,
            config,
            resolver: IdentityResolver::from_config(config),
            dedup: Deduplicator::from_config(config),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        self.config
    }

    /// Build the graph of one instance of `root_type`.
    pub fn build(&self, instance: &Value, root_type: &str, source: &SourceRef) -> TesseraResult<Graph> {
        self.build_with_conflicts(instance, root_type, source)
            .map(|(graph, _)| graph)
    }

    /// Build a graph, also returning conflicts between repeated entities.
    pub fn build_with_conflicts(
        &self,
        instance: &Value,
        root_type: &str,
        source: &SourceRef,
    ) -> TesseraResult<(Graph, Vec<MergeConflict>)> {
        let descriptor = self.registry.describe(root_type)?;

        let mut pass = BuildPass {
            builder: self,
            source,
            graph: Graph::new(),
            log: ConflictLog::new(),
        };
        // The root is an entity by convention, even when declared as a component.
        let root_id = pass.visit_entity(&descriptor, instance, (root_type, "$root"))?;

        let BuildPass { graph, log, .. } = pass;
        if self.config.validate_graph {
            graph.validate()?;
        }

        info!(
            root_type = %root_type,
            root_id = %root_id,
            source = %source,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            conflicts = log.len(),
            "Built graph"
        );
        Ok((graph, log.into_vec()))
    }

    /// Build from any serializable value.
    pub fn build_typed<T: Serialize>(
        &self,
        value: &T,
        root_type: &str,
        source: &SourceRef,
    ) -> TesseraResult<Graph> {
        let instance = serde_json::to_value(value)?;
        self.build(&instance, root_type, source)
    }

    /// Build from a value whose type describes itself.
    pub fn build_described<T: Describe + Serialize>(
        &self,
        value: &T,
        source: &SourceRef,
    ) -> TesseraResult<Graph> {
        self.build_typed(value, &T::declare().name, source)
    }

    /// Key of a flattened property. Keys below a list element always keep
    /// their indexed prefix.
    fn property_key(&self, prefix: &str, name: &str) -> String {
        if prefix.is_empty() || !(self.config.prefix_component_fields || prefix.contains('[')) {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    }

    fn truncate(&self, text: &str) -> String {
        let max = self.config.max_string_length;
        if text.chars().count() <= max {
            return text.to_string();
        }
        let suffix = &self.config.truncate_suffix;
        let keep = max.saturating_sub(suffix.chars().count());
        let mut out: String = text.chars().take(keep).collect();
        out.push_str(suffix);
        out
    }

    /// Truncate stored strings in place, including list elements.
    fn truncate_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if s.chars().count() > self.config.max_string_length {
                    *s = self.truncate(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.truncate_value(item)),
            _ => {}
        }
    }

    /// Scalar property value as given; objects are rejected.
    fn scalar_value(&self, type_name: &str, field: &str, value: &Value) -> TesseraResult<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Array(_) | Value::Object(_) => Err(TesseraError::instance_mismatch(
                        type_name,
                        field,
                        "a scalar or a list of scalars",
                    )),
                    other => self.scalar_value(type_name, field, other),
                })
                .collect::<TesseraResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(_) => Err(TesseraError::instance_mismatch(
                type_name,
                field,
                "a scalar or a list of scalars",
            )),
            other => Ok(other.clone()),
        }
    }
}

impl<'b, 'a> BuildPass<'b, 'a> {
    /// Visit an entity and everything below it, returning its id.
    ///
    /// `(owner, field)` names where the value sits, for shape errors.
    fn visit_entity(
        &mut self,
        descriptor: &SchemaDescriptor,
        value: &Value,
        (owner, field): (&str, &str),
    ) -> TesseraResult<String> {
        let object = value
            .as_object()
            .ok_or_else(|| TesseraError::instance_mismatch(owner, field, "an object"))?;

        let mut properties = Properties::new();
        let mut edges = Vec::new();
        self.collect(descriptor, object, "", &mut properties, &mut edges)?;

        // Ids see the full values; only the stored copy is truncated.
        let id = self.builder.resolver.resolve(descriptor, &properties)?;
        properties
            .values_mut()
            .for_each(|value| self.builder.truncate_value(value));
        let node = Node::new(&id, &descriptor.type_name, properties, self.source.clone());
        self.builder
            .dedup
            .absorb_node(&mut self.graph, node, &mut self.log)?;

        for pending in edges {
            let edge = Edge::new(&id, &pending.target_id, &pending.label, self.source.clone());
            if pending.reverse {
                let reverse = edge.reversed(&self.builder.config.reverse_suffix);
                self.builder.dedup.absorb_edge(&mut self.graph, edge, &mut self.log);
                self.builder.dedup.absorb_edge(&mut self.graph, reverse, &mut self.log);
            } else {
                self.builder.dedup.absorb_edge(&mut self.graph, edge, &mut self.log);
            }
        }

        debug!(node_id = %id, type_name = %descriptor.type_name, "Visited entity");
        Ok(id)
    }

    /// Gather the properties and outgoing edges contributed by one object,
    /// recursing into components.
    fn collect(
        &mut self,
        descriptor: &SchemaDescriptor,
        object: &Map<String, Value>,
        prefix: &str,
        properties: &mut Properties,
        edges: &mut Vec<PendingEdge>,
    ) -> TesseraResult<()> {
        let registry = self.builder.registry;
        let type_name = descriptor.type_name.as_str();

        for field in &descriptor.fields {
            let value = match object.get(&field.name) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            let key = self.builder.property_key(prefix, &field.name);

            match &field.kind {
                FieldKind::Scalar => {
                    let scalar = self.builder.scalar_value(type_name, &field.name, value)?;
                    properties.insert(key, scalar);
                }
                FieldKind::Component(target) => {
                    let nested = registry.describe(target)?;
                    let object = value.as_object().ok_or_else(|| {
                        TesseraError::instance_mismatch(type_name, &field.name, "an object")
                    })?;
                    self.collect(&nested, object, &key, properties, edges)?;
                }
                FieldKind::ComponentList(target) => {
                    let nested = registry.describe(target)?;
                    let items = value.as_array().ok_or_else(|| {
                        TesseraError::instance_mismatch(type_name, &field.name, "a list")
                    })?;
                    for (index, item) in items.iter().enumerate() {
                        let object = item.as_object().ok_or_else(|| {
                            TesseraError::instance_mismatch(type_name, &field.name, "a list of objects")
                        })?;
                        let element = format!("{}[{}]", key, index);
                        self.collect(&nested, object, &element, properties, edges)?;
                    }
                }
                FieldKind::Entity(target) => {
                    let nested = registry.describe(target)?;
                    let target_id = self.visit_entity(&nested, value, (type_name, field.name.as_str()))?;
                    edges.push(pending_edge(descriptor, &field.name, target_id));
                }
                FieldKind::EntityList(target) => {
                    let nested = registry.describe(target)?;
                    let items = value.as_array().ok_or_else(|| {
                        TesseraError::instance_mismatch(type_name, &field.name, "a list")
                    })?;
                    for item in items {
                        let target_id = self.visit_entity(&nested, item, (type_name, field.name.as_str()))?;
                        edges.push(pending_edge(descriptor, &field.name, target_id));
                    }
                }
            }
        }
        Ok(())
    }
}

fn pending_edge(descriptor: &SchemaDescriptor, field: &str, target_id: String) -> PendingEdge {
    match descriptor.edge(field) {
        Some(spec) => PendingEdge {
            label: spec.label.clone(),
            reverse: spec.reverse,
            target_id,
        },
        None => PendingEdge {
            label: implicit_label(field),
            reverse: false,
            target_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::Consolidator;
    use crate::error::ErrorCode;
    use crate::schema::TypeDecl;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_decl(
                TypeDecl::component("Address")
                    .scalar("street")
                    .scalar("city"),
            )
            .unwrap()
            .register_decl(
                TypeDecl::entity("Organization")
                    .identity(["name"])
                    .scalar("name")
                    .component_field("address", "Address"),
            )
            .unwrap()
            .register_decl(
                TypeDecl::entity("LineItem")
                    .scalar("description")
                    .scalar("total"),
            )
            .unwrap()
            .register_decl(
                TypeDecl::entity("Invoice")
                    .identity(["number"])
                    .scalar("number")
                    .optional_scalar("notes")
                    .edge("issued_by", "Organization", "ISSUED_BY")
                    .entity_field("sent_to", "Organization")
                    .edge_list("items", "LineItem", "CONTAINS_ITEM"),
            )
            .unwrap();
        registry
    }

    fn invoice() -> Value {
        json!({
            "number": "F-1",
            "issued_by": {"name": "Acme", "address": {"street": "1 Main St", "city": "Springfield"}},
            "sent_to": {"name": "Globex"},
            "items": [
                {"description": "Garden work", "total": 3360},
                {"description": "Disposal", "total": 40},
                {"description": "Garden work", "total": 3360}
            ]
        })
    }

    #[test]
    fn test_build_nodes_and_edges() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let graph = builder.build(&invoice(), "Invoice", &SourceRef::page(1)).unwrap();

        // Invoice, two organizations, two distinct line items.
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.nodes_of_type("LineItem").count(), 2);

        let invoice = graph.nodes_of_type("Invoice").next().unwrap();
        let acme = graph
            .nodes_of_type("Organization")
            .find(|n| n.property_str("name") == Some("Acme"))
            .unwrap();
        assert!(graph.contains_edge(&invoice.id, &acme.id, "ISSUED_BY"));

        let labels: Vec<&str> = graph.edges().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["ISSUED_BY", "SENT_TO", "CONTAINS_ITEM", "CONTAINS_ITEM"]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_components_are_flattened() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);
        let graph = builder.build(&invoice(), "Invoice", &SourceRef::page(1)).unwrap();

        let acme = graph
            .nodes_of_type("Organization")
            .find(|n| n.property_str("name") == Some("Acme"))
            .unwrap();
        assert_eq!(acme.property_str("address.city"), Some("Springfield"));
        assert!(graph.nodes_of_type("Address").next().is_none());

        let config = GraphConfig::default().with_component_prefixes(false);
        let builder = GraphBuilder::new(&registry, &config);
        let graph = builder.build(&invoice(), "Invoice", &SourceRef::page(1)).unwrap();
        let acme = graph
            .nodes_of_type("Organization")
            .find(|n| n.property_str("name") == Some("Acme"))
            .unwrap();
        assert_eq!(acme.property_str("city"), Some("Springfield"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let a = builder.build(&invoice(), "Invoice", &SourceRef::page(1)).unwrap();
        let b = builder.build(&invoice(), "Invoice", &SourceRef::page(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_repeated_entity_merges_within_build() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let instance = json!({
            "number": "F-2",
            "issued_by": {"name": "Acme", "address": {"street": "1 Main St"}},
            "sent_to": {"name": "Acme", "address": {"street": "9 Side Rd", "city": "Shelbyville"}}
        });
        let (graph, conflicts) = builder
            .build_with_conflicts(&instance, "Invoice", &SourceRef::page(1))
            .unwrap();

        assert_eq!(graph.nodes_of_type("Organization").count(), 1);
        let acme = graph.nodes_of_type("Organization").next().unwrap();
        assert_eq!(acme.property_str("address.street"), Some("1 Main St"));
        assert_eq!(acme.property_str("address.city"), Some("Shelbyville"));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "address.street");
    }

    #[test]
    fn test_reverse_flag_adds_companion_edge() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_decl(TypeDecl::entity("Address").identity(["street"]).scalar("street"))
            .unwrap()
            .register_decl(
                TypeDecl::entity("Person")
                    .identity(["name"])
                    .scalar("name")
                    .entity_field("lives_at", "Address")
                    .reverse("lives_at"),
            )
            .unwrap();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let graph = builder
            .build(&json!({"name": "Ann", "lives_at": {"street": "Elm"}}), "Person", &SourceRef::page(1))
            .unwrap();
        let labels: Vec<&str> = graph.edges().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["LIVES_AT", "LIVES_AT_REVERSE"]);
        assert!(graph.edges()[1].is_reverse);
    }

    #[test]
    fn test_long_strings_truncated() {
        let registry = registry();
        let config = GraphConfig {
            max_string_length: 10,
            ..Default::default()
        };
        let builder = GraphBuilder::new(&registry, &config);
        let instance = json!({"number": "F-3", "notes": "a very long note indeed"});

        let graph = builder.build(&instance, "Invoice", &SourceRef::page(1)).unwrap();
        let invoice = graph.nodes().next().unwrap();
        assert_eq!(invoice.property_str("notes"), Some("a very ..."));
    }

    #[test]
    fn test_identity_error_propagates() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let instance = json!({"number": "F-4", "issued_by": {"name": ""}});
        let err = builder.build(&instance, "Invoice", &SourceRef::page(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IdentityEmptyField);
        assert_eq!(err.type_name(), Some("Organization"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_shape_mismatch_is_schema_error() {
        let registry = registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let instance = json!({"number": "F-5", "issued_by": "Acme"});
        let err = builder.build(&instance, "Invoice", &SourceRef::page(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaInstanceMismatch);
        assert_eq!(err.type_name(), Some("Invoice"));
        assert_eq!(err.field(), Some("issued_by"));
    }

    fn contact_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_decl(
                TypeDecl::component("Phone")
                    .optional_scalar("kind")
                    .scalar("number"),
            )
            .unwrap()
            .register_decl(
                TypeDecl::entity("Contact")
                    .identity(["name"])
                    .scalar("name")
                    .component_list("phones", "Phone"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_component_list_elements_keyed_by_index() {
        let registry = contact_registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let instance = json!({
            "name": "Ann",
            "phones": [{"number": "1"}, {"kind": "work", "number": "2"}]
        });
        let graph = builder.build(&instance, "Contact", &SourceRef::page(1)).unwrap();
        let contact = graph.nodes().next().unwrap();
        assert_eq!(contact.property_str("phones[0].number"), Some("1"));
        assert_eq!(contact.property("phones[0].kind"), None);
        assert_eq!(contact.property_str("phones[1].kind"), Some("work"));
        assert_eq!(contact.property_str("phones[1].number"), Some("2"));

        // Element keys keep their index even without component prefixes.
        let config = GraphConfig::default().with_component_prefixes(false);
        let builder = GraphBuilder::new(&registry, &config);
        let graph = builder.build(&instance, "Contact", &SourceRef::page(1)).unwrap();
        let contact = graph.nodes().next().unwrap();
        assert_eq!(contact.property_str("phones[1].kind"), Some("work"));
        assert_eq!(contact.property("kind"), None);
    }

    #[test]
    fn test_component_list_elements_merge_per_element() {
        let registry = contact_registry();
        let config = GraphConfig::default();
        let builder = GraphBuilder::new(&registry, &config);

        let first = json!({
            "name": "Ann",
            "phones": [{"kind": "home", "number": "1"}, {"kind": "work", "number": "2"}]
        });
        let second = json!({"name": "Ann", "phones": [{"kind": "home", "number": "3"}]});
        let graphs = vec![
            builder.build(&first, "Contact", &SourceRef::page(1)).unwrap(),
            builder.build(&second, "Contact", &SourceRef::page(2)).unwrap(),
        ];

        let merged = Consolidator::new(&config).consolidate(graphs).unwrap();

        let contact = merged.graph.nodes().next().unwrap();
        assert_eq!(contact.property_str("phones[0].kind"), Some("home"));
        assert_eq!(contact.property_str("phones[0].number"), Some("1"));
        assert_eq!(contact.property_str("phones[1].kind"), Some("work"));
        assert_eq!(contact.property_str("phones[1].number"), Some("2"));

        let conflicts = merged.conflicts;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "phones[0].number");
        assert_eq!(conflicts[0].values[1], (SourceRef::page(2), json!("3")));
    }

    #[test]
    fn test_identity_uses_untruncated_values() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_decl(TypeDecl::entity("Doc").identity(["title"]).scalar("title"))
            .unwrap();
        let config = GraphConfig {
            max_string_length: 10,
            ..Default::default()
        };
        let builder = GraphBuilder::new(&registry, &config);

        let a = builder
            .build(&json!({"title": "Annual report 2023"}), "Doc", &SourceRef::page(1))
            .unwrap();
        let b = builder
            .build(&json!({"title": "Annual report 2024"}), "Doc", &SourceRef::page(1))
            .unwrap();
        let a = a.nodes().next().unwrap();
        let b = b.nodes().next().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.property_str("title"), Some("Annual ..."));
        assert_eq!(b.property_str("title"), Some("Annual ..."));
    }
}
