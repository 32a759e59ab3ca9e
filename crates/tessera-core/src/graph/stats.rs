//! Summary statistics for a built graph.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::connected_components;
use serde::{Deserialize, Serialize};

use super::types::Graph;
use super::view::to_digraph;

/// Counts and distributions describing a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// `2 * edges / nodes`, zero for an empty graph.
    pub average_degree: f64,
    /// Node count per schema type.
    pub node_types: BTreeMap<String, usize>,
    /// Edge count per label.
    pub edge_types: BTreeMap<String, usize>,
    /// Distinct extraction units that contributed nodes.
    pub source_units: usize,
    /// Weakly connected components.
    pub connected_components: usize,
}

impl GraphStats {
    pub fn from_graph(graph: &Graph) -> Self {
        let node_count = graph.node_count();
        let edge_count = graph.edge_count();

        let average_degree = if node_count == 0 {
            0.0
        } else {
            2.0 * edge_count as f64 / node_count as f64
        };

        let mut node_types = BTreeMap::new();
        for node in graph.nodes() {
            *node_types.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        let mut edge_types = BTreeMap::new();
        for edge in graph.edges() {
            *edge_types.entry(edge.label.clone()).or_insert(0) += 1;
        }

        let source_units: BTreeSet<_> = graph.source_refs();

        Self {
            node_count,
            edge_count,
            average_degree,
            node_types,
            edge_types,
            source_units: source_units.len(),
            connected_components: connected_components(to_digraph(graph).digraph()),
        }
    }
}
