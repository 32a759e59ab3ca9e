//! Node, edge and graph types.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dedup::Deduplicator;
use crate::error::{TesseraError, TesseraResult};
use crate::merge::Provenanced;

/// Flattened node or edge properties, keyed by (possibly prefixed) field name.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Marker naming the extraction unit (page, chunk, document) a value came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Provenance for a page, zero-padded so refs sort in page order.
    pub fn page(number: usize) -> Self {
        Self(format!("page:{:05}", number))
    }

    /// Provenance for a chunk of a chunked document.
    pub fn chunk(number: usize) -> Self {
        Self(format!("chunk:{:05}", number))
    }

    /// Placeholder for values whose origin was not recorded.
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One graph entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable id, a pure function of type and identity values.
    pub id: String,
    /// Schema type name.
    #[serde(rename = "type")]
    pub node_type: String,
    pub properties: Properties,
    /// Every extraction unit that contributed to this node.
    pub source_refs: BTreeSet<SourceRef>,
    /// Which unit supplied each property value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_sources: BTreeMap<String, SourceRef>,
}

impl Node {
    /// Create a node whose every property is attributed to `source`.
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        properties: Properties,
        source: SourceRef,
    ) -> Self {
        let property_sources = properties
            .keys()
            .map(|k| (k.clone(), source.clone()))
            .collect();
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties,
            source_refs: BTreeSet::from([source]),
            property_sources,
        }
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    /// Property as a string slice, if it is a string.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_str())
    }
}

/// Identity of an edge: edges with the same key collapse to one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source_id: String,
    pub target_id: String,
    pub label: String,
}

impl EdgeKey {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source_id, self.label, self.target_id)
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    /// Synthesized companion of another edge.
    #[serde(default)]
    pub is_reverse: bool,
    pub source_refs: BTreeSet<SourceRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_sources: BTreeMap<String, SourceRef>,
}

impl Edge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        label: impl Into<String>,
        source: SourceRef,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            label: label.into(),
            properties: Properties::new(),
            is_reverse: false,
            source_refs: BTreeSet::from([source]),
            property_sources: BTreeMap::new(),
        }
    }

    /// Attach relationship metadata, attributed to the edge's first source.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        let source = self
            .source_refs
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(SourceRef::unknown);
        self.property_sources = properties
            .keys()
            .map(|k| (k.clone(), source.clone()))
            .collect();
        self.properties = properties;
        self
    }

    /// The companion edge pointing the other way.
    pub fn reversed(&self, suffix: &str) -> Self {
        Self {
            source_id: self.target_id.clone(),
            target_id: self.source_id.clone(),
            label: format!("{}{}", self.label, suffix),
            properties: self.properties.clone(),
            is_reverse: true,
            source_refs: self.source_refs.clone(),
            property_sources: self.property_sources.clone(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.source_id, &self.target_id, &self.label)
    }
}

impl Provenanced for Node {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn property_sources_mut(&mut self) -> &mut BTreeMap<String, SourceRef> {
        &mut self.property_sources
    }

    fn property_source(&self, field: &str) -> SourceRef {
        self.property_sources
            .get(field)
            .or_else(|| self.source_refs.iter().next())
            .cloned()
            .unwrap_or_else(SourceRef::unknown)
    }

    fn source_refs_mut(&mut self) -> &mut BTreeSet<SourceRef> {
        &mut self.source_refs
    }

    fn source_refs(&self) -> &BTreeSet<SourceRef> {
        &self.source_refs
    }
}

impl Provenanced for Edge {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn property_sources_mut(&mut self) -> &mut BTreeMap<String, SourceRef> {
        &mut self.property_sources
    }

    fn property_source(&self, field: &str) -> SourceRef {
        self.property_sources
            .get(field)
            .or_else(|| self.source_refs.iter().next())
            .cloned()
            .unwrap_or_else(SourceRef::unknown)
    }

    fn source_refs_mut(&mut self) -> &mut BTreeSet<SourceRef> {
        &mut self.source_refs
    }

    fn source_refs(&self) -> &BTreeSet<SourceRef> {
        &self.source_refs
    }
}

/// Serialized form of a graph handed to exporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A directed knowledge graph.
///
/// Nodes are keyed by id and iterate in id order; edges keep insertion
/// order and are unique by [`EdgeKey`]. Mutation goes through the
/// [`Deduplicator`], which merges rather than overwrites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphData", into = "GraphData")]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeKey, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes of one schema type, in id order.
    pub fn nodes_of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.values().filter(move |n| n.node_type == node_type)
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edge_index.get(key).map(|&i| &self.edges[i])
    }

    pub fn contains_edge(&self, source_id: &str, target_id: &str, label: &str) -> bool {
        self.edge_index
            .contains_key(&EdgeKey::new(source_id, target_id, label))
    }

    /// Targets of outgoing edges from `id`, in edge order.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source_id == id)
            .map(|e| e.target_id.as_str())
            .collect()
    }

    /// Union of every node's provenance.
    pub fn source_refs(&self) -> BTreeSet<&SourceRef> {
        self.nodes.values().flat_map(|n| n.source_refs.iter()).collect()
    }

    /// Edges whose endpoints are not both present.
    pub fn orphan_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| !self.nodes.contains_key(&e.source_id) || !self.nodes.contains_key(&e.target_id))
    }

    /// Check that every edge connects two nodes of this graph.
    pub fn validate(&self) -> TesseraResult<()> {
        match self.orphan_edges().next() {
            Some(edge) => Err(TesseraError::internal(format!(
                "edge {} references a node missing from the graph",
                edge.key()
            ))),
            None => Ok(()),
        }
    }

    /// Copy into the serialized form.
    pub fn to_data(&self) -> GraphData {
        GraphData {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn insert_new_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn edge_mut(&mut self, key: &EdgeKey) -> Option<&mut Edge> {
        match self.edge_index.get(key) {
            Some(&i) => self.edges.get_mut(i),
            None => None,
        }
    }

    pub(crate) fn push_new_edge(&mut self, edge: Edge) {
        self.edge_index.insert(edge.key(), self.edges.len());
        self.edges.push(edge);
    }
}

impl From<Graph> for GraphData {
    fn from(graph: Graph) -> Self {
        GraphData {
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges,
        }
    }
}

impl TryFrom<GraphData> for Graph {
    type Error = TesseraError;

    fn try_from(data: GraphData) -> Result<Self, Self::Error> {
        Deduplicator::default().dedupe(data).map(|(graph, _)| graph)
    }
}
