//! In-memory knowledge graph model.

mod stats;
mod types;
pub mod view;

pub use stats::GraphStats;
pub use types::{Edge, EdgeKey, Graph, GraphData, Node, Properties, SourceRef};
pub use view::{to_digraph, GraphView};
