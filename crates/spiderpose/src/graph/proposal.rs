//! Frozen per-sweep copy of every node's particles and unaries.
//!
//! Message computation for sweep `k + 1` reads only the snapshot taken after
//! sweep `k`. The graph holds it behind an [`Arc`](std::sync::Arc) and replaces
//! it as a whole; a snapshot is never mutated.

use nalgebra::{DMatrix, DVector};

use super::node::GraphNode;

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalSnapshot {
    states: Vec<DMatrix<f64>>,
    unaries: Vec<DVector<f64>>,
}

impl ProposalSnapshot {
    /// Copy the current state and unary vector of every node.
    pub fn capture(nodes: &[GraphNode]) -> Self {
        Self {
            states: nodes.iter().map(|n| n.states().clone()).collect(),
            unaries: nodes.iter().map(|n| n.unaries().clone()).collect(),
        }
    }

    #[inline]
    pub fn states(&self, node: usize) -> &DMatrix<f64> {
        &self.states[node]
    }

    #[inline]
    pub fn unaries(&self, node: usize) -> &DVector<f64> {
        &self.unaries[node]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
