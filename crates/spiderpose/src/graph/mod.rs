//! Factor graph over the spider's parts.
//!
//! - [`topology`]: part table, adjacency and edge kinds.
//! - [`node`]: one part's particles, weights and unaries.
//! - [`proposal`]: frozen snapshot read by the message sweep.
//! - [`spider`]: the graph itself and its iteration cycle.

mod node;
mod proposal;
mod spider;
mod topology;

pub use node::GraphNode;
pub use proposal::ProposalSnapshot;
pub use spider::{MarginalRecord, NodeMarginal, SpiderGraph};
pub use topology::{EdgeKind, Layer, PartSpec, Topology, NUM_LIMBS, NUM_NODES, ROOT};

/// Position of a graph in its iteration cycle.
///
/// Legal transitions: `Uninitialized → Initialized` (any initializer), then
/// `Initialized | Jittered → MessagesUpdated → BeliefUpdated → Resampled →
/// Jittered`. Re-initializing is allowed from every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Initialized,
    MessagesUpdated,
    BeliefUpdated,
    Resampled,
    Jittered,
}
