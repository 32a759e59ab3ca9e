//! Consolidation of per-unit graphs into one graph.
//!
//! Graphs are merged one after another in the order given, which is the
//! source order (page, chunk). That order decides every first-wins
//! resolution, so the same input sequence always yields the same graph and
//! the same conflict report.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::dedup::Deduplicator;
use crate::error::TesseraResult;
use crate::graph::{Edge, Graph};
use crate::merge::{ConflictLog, ConflictPolicy, MergeConflict};

/// Result of a consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consolidation {
    pub graph: Graph,
    /// Disagreements found while merging, in discovery order.
    pub conflicts: Vec<MergeConflict>,
}

/// Merges independently built graphs.
#[derive(Debug, Clone)]
pub struct Consolidator {
    dedup: Deduplicator,
    add_reverse_edges: bool,
    reverse_suffix: String,
    validate_graph: bool,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new(&GraphConfig::default())
    }
}

impl Consolidator {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            dedup: Deduplicator::from_config(config),
            add_reverse_edges: config.add_reverse_edges,
            reverse_suffix: config.reverse_suffix.clone(),
            validate_graph: config.validate_graph,
        }
    }

    /// Override the conflict policy.
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.dedup = Deduplicator::new(policy);
        self
    }

    /// Enable or disable reverse edge synthesis.
    pub fn with_reverse_edges(mut self, enabled: bool) -> Self {
        self.add_reverse_edges = enabled;
        self
    }

    /// Merge `graphs` in order into one graph.
    ///
    /// Only fails when an id is bound to two different types.
    pub fn consolidate<I>(&self, graphs: I) -> TesseraResult<Consolidation>
    where
        I: IntoIterator<Item = Graph>,
    {
        let mut graph = Graph::new();
        let mut log = ConflictLog::new();
        let mut merged = 0usize;

        for incoming in graphs {
            debug!(
                index = merged,
                nodes = incoming.node_count(),
                edges = incoming.edge_count(),
                "Merging graph"
            );
            self.dedup.absorb_graph(&mut graph, incoming, &mut log)?;
            merged += 1;
        }

        let reverse = if self.add_reverse_edges {
            add_reverse_edges(&mut graph, &self.reverse_suffix)
        } else {
            0
        };

        if self.validate_graph {
            graph.validate()?;
        }

        info!(
            graphs = merged,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            reverse_edges = reverse,
            conflicts = log.len(),
            "Consolidated graphs"
        );

        Ok(Consolidation {
            graph,
            conflicts: log.into_vec(),
        })
    }
}

/// Add a reverse companion for every declared edge that lacks one.
///
/// Companions are labeled `label + suffix`, flagged `is_reverse`, and
/// appended after the existing edges. Returns how many were added.
pub fn add_reverse_edges(graph: &mut Graph, suffix: &str) -> usize {
    let companions: Vec<Edge> = graph
        .edges()
        .iter()
        .filter(|e| !e.is_reverse)
        .map(|e| e.reversed(suffix))
        .collect();

    let mut added = 0;
    for edge in companions {
        if graph.edge(&edge.key()).is_none() {
            graph.push_new_edge(edge);
            added += 1;
        }
    }
    added
}
