//! Borrowed petgraph projection of a [`Graph`].
//!
//! Traversal consumers (visualizers, path queries) get adjacency lookups
//! without copying node or edge payloads.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::types::{Edge, Graph, Node};

/// The projected graph type.
pub type GraphViewInner<'a> = DiGraph<&'a Node, &'a Edge>;

/// A petgraph view with an id index.
pub struct GraphView<'a> {
    graph: GraphViewInner<'a>,
    index: HashMap<&'a str, NodeIndex>,
}

/// Project `graph` into a petgraph `DiGraph`.
///
/// Nodes are added in id order and edges in insertion order; edges with a
/// missing endpoint are skipped.
pub fn to_digraph(graph: &Graph) -> GraphView<'_> {
    let mut inner = DiGraph::with_capacity(graph.node_count(), graph.edge_count());
    let mut index = HashMap::with_capacity(graph.node_count());

    for node in graph.nodes() {
        let idx = inner.add_node(node);
        index.insert(node.id.as_str(), idx);
    }
    for edge in graph.edges() {
        if let (Some(&s), Some(&t)) = (
            index.get(edge.source_id.as_str()),
            index.get(edge.target_id.as_str()),
        ) {
            inner.add_edge(s, t, edge);
        }
    }

    GraphView {
        graph: inner,
        index,
    }
}

impl<'a> GraphView<'a> {
    pub fn digraph(&self) -> &GraphViewInner<'a> {
        &self.graph
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Outgoing `(target, edge)` pairs of a node.
    pub fn outgoing(&self, id: &str) -> Vec<(&'a Node, &'a Edge)> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Incoming `(source, edge)` pairs of a node.
    pub fn incoming(&self, id: &str) -> Vec<(&'a Node, &'a Edge)> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<(&'a Node, &'a Edge)> {
        let Some(idx) = self.node_index(id) else {
            return Vec::new();
        };
        let mut out: Vec<(&'a Node, &'a Edge)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (self.graph[other], *e.weight())
            })
            .collect();
        // petgraph yields the most recently added edge first.
        out.reverse();
        out
    }
}
