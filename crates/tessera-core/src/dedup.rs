//! Node and edge deduplication.
//!
//! Records that resolve to the same id (nodes) or the same
//! `(source, target, label)` key (edges) are merged into the record already
//! in the graph instead of replacing it.

use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{TesseraError, TesseraResult};
use crate::graph::{Edge, Graph, GraphData, Node};
use crate::merge::{merge_into, ConflictLog, ConflictPolicy, ConflictSubject, MergeConflict};

/// Merges duplicate nodes and edges into a graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator {
    policy: ConflictPolicy,
}

impl Deduplicator {
    /// Create a deduplicator resolving conflicts with `policy`.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.conflict_policy)
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Insert `node`, or merge it into the node already holding its id.
    ///
    /// Fails when the id is already bound to a different type.
    pub fn absorb_node(
        &self,
        graph: &mut Graph,
        node: Node,
        log: &mut ConflictLog,
    ) -> TesseraResult<()> {
        match graph.node_mut(&node.id) {
            Some(existing) => {
                if existing.node_type != node.node_type {
                    return Err(TesseraError::identity_collision(
                        &node.id,
                        &existing.node_type,
                        &node.node_type,
                    ));
                }
                let subject = ConflictSubject::Node(node.id.clone());
                log.extend(merge_into(existing, &node, self.policy, &subject));
                debug!(node_id = %node.id, "Merged duplicate node");
            }
            None => graph.insert_new_node(node),
        }
        Ok(())
    }

    /// Insert `edge`, or merge it into the edge with the same key.
    pub fn absorb_edge(&self, graph: &mut Graph, edge: Edge, log: &mut ConflictLog) {
        let key = edge.key();
        match graph.edge_mut(&key) {
            Some(existing) => {
                // A declared edge outranks a synthesized companion.
                existing.is_reverse = existing.is_reverse && edge.is_reverse;
                let subject = ConflictSubject::Edge(key);
                log.extend(merge_into(existing, &edge, self.policy, &subject));
            }
            None => graph.push_new_edge(edge),
        }
    }

    /// Absorb every node, then every edge, of `incoming`.
    pub fn absorb_graph(
        &self,
        target: &mut Graph,
        incoming: Graph,
        log: &mut ConflictLog,
    ) -> TesseraResult<()> {
        let data = GraphData::from(incoming);
        for node in data.nodes {
            self.absorb_node(target, node, log)?;
        }
        for edge in data.edges {
            self.absorb_edge(target, edge, log);
        }
        Ok(())
    }

    /// Rebuild a graph from raw data, collapsing duplicate ids and edge keys.
    ///
    /// Running this on the data of an already deduplicated graph returns
    /// the same graph and no conflicts.
    pub fn dedupe(&self, data: GraphData) -> TesseraResult<(Graph, Vec<MergeConflict>)> {
        let mut graph = Graph::new();
        let mut log = ConflictLog::new();
        for node in data.nodes {
            self.absorb_node(&mut graph, node, &mut log)?;
        }
        for edge in data.edges {
            self.absorb_edge(&mut graph, edge, &mut log);
        }
        Ok((graph, log.into_vec()))
    }
}
