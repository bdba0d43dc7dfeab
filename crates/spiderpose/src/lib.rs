//! spiderpose: particle belief propagation for articulated spider poses.
//!
//! A spider is one circular root body and eight rectangular limbs in two
//! layers. Given a label image (0 = background, tag `k` = part `k - 1`), the
//! engine infers every part's pose with particle-based nonparametric belief
//! propagation:
//!
//! 1. **Init**: seed particles uniformly or at pixels carrying each tag.
//! 2. **Messages**: score unaries, then pass messages over the tree, reading
//!    only the frozen proposal of the previous sweep.
//! 3. **Belief**: combine unaries and incoming messages into weights.
//! 4. **Resample**: categorical resampling, optionally keeping the best particle.
//! 5. **Jitter**: Gaussian diversification of the survivors.
//!
//! # Public API
//! - [`SpiderGraph`] and [`GraphConfig`] as primary entry points
//! - [`run_inference`] for a fixed number of iterations with diagnostics
//! - [`JointParticleFilter`] and [`run_joint_filter`] as a whole-spider
//!   particle filter baseline without message passing
//! - [`LabelImage`] as the observation type
//! - [`synth`] for synthetic scenes and accuracy evaluation

mod config;
mod error;
mod graph;
mod joint;
mod label;
mod pose;
mod potential;
mod run;
pub mod sampler;
mod shape;
pub mod synth;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    Algorithm, GraphConfig, InitParams, JitterParams, PairwiseParams, ResampleScheme,
    SpiderGeometry,
};
pub use error::{PbpError, Result};
pub use graph::{
    EdgeKind, GraphNode, Layer, MarginalRecord, NodeMarginal, PartSpec, Phase, ProposalSnapshot,
    SpiderGraph, Topology, NUM_LIMBS, NUM_NODES, ROOT,
};
pub use joint::{run_joint_filter, JointParticleFilter};
pub use label::{LabelImage, BACKGROUND};
pub use pose::{LimbPose, RootPose, SpiderEstimate};
pub use potential::{
    unary_batch, unary_score, PairwiseModel, SpiderFootprint, EPSILON, MESSAGE_FLOOR,
};
pub use run::{run_inference, InferenceReport, InitMode, IterationSummary, RunParams};
pub use shape::{FootprintTemplate, OccupancyMask, Shape, ShapeKind};
