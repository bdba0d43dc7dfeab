//! Spider factor graph and its iteration cycle.
//!
//! One iteration is `update_messages → update_belief → resample → jitter`;
//! [`SpiderGraph::step`] runs all four. Calls out of this order fail with
//! [`PbpError::PhaseOrder`] and leave the graph untouched.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand_distr::Normal;
use rayon::prelude::*;

use super::node::GraphNode;
use super::proposal::ProposalSnapshot;
use super::topology::{EdgeKind, Topology};
use super::Phase;
use crate::config::{Algorithm, GraphConfig};
use crate::error::{PbpError, Result};
use crate::label::LabelImage;
use crate::pose::SpiderEstimate;
use crate::potential::{PairwiseModel, MESSAGE_FLOOR};
use crate::sampler::WeightDomain;
use crate::shape::{Shape, ShapeKind};

/// Precomputed description of one incoming message slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IncomingEdge {
    /// Sending node.
    source: usize,
    kind: EdgeKind,
    /// Slot of the receiving node in the sender's message matrix.
    reverse_slot: usize,
}

/// Read-only view of one node's particle set.
#[derive(Debug, Clone, Copy)]
pub struct NodeMarginal<'a> {
    pub id: usize,
    pub tag: u8,
    pub kind: ShapeKind,
    /// `N×D` particle states.
    pub states: &'a DMatrix<f64>,
    pub weights: &'a DVector<f64>,
}

impl NodeMarginal<'_> {
    /// Owned, serializable copy.
    pub fn to_record(&self) -> MarginalRecord {
        MarginalRecord {
            id: self.id,
            tag: self.tag,
            kind: self.kind,
            particles: self
                .states
                .row_iter()
                .map(|r| r.iter().copied().collect())
                .collect(),
            weights: self.weights.iter().copied().collect(),
        }
    }
}

/// Owned particle set of one node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarginalRecord {
    pub id: usize,
    pub tag: u8,
    pub kind: ShapeKind,
    pub particles: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
}

/// Particle belief propagation over the nine-part spider.
#[derive(Debug, Clone)]
pub struct SpiderGraph {
    config: GraphConfig,
    topology: Topology,
    pairwise: PairwiseModel,
    nodes: Vec<GraphNode>,
    incoming: Vec<Vec<IncomingEdge>>,
    /// Per node: `neighbors × N`, row `k` is the message from the `k`-th neighbor.
    messages: Vec<DMatrix<f64>>,
    proposal: Option<Arc<ProposalSnapshot>>,
    phase: Phase,
    rng: StdRng,
}

impl SpiderGraph {
    /// Build the graph. Particles stay unset until an initializer runs.
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let topology = Topology::spider();
        let n = config.num_particles;

        let nodes: Vec<GraphNode> = topology
            .parts()
            .iter()
            .map(|part| {
                let shape = match part.kind {
                    ShapeKind::Circle => Shape::root(&config.geometry),
                    ShapeKind::Rectangle => Shape::limb(&config.geometry),
                };
                GraphNode::new(part.id, part.tag, shape, n)
            })
            .collect();

        let mut incoming = Vec::with_capacity(topology.len());
        for s in 0..topology.len() {
            let mut slots = Vec::new();
            for &t in topology.neighbors(s) {
                let kind = topology.edge_kind(t, s).ok_or_else(|| {
                    PbpError::InvalidConfig(format!("edge {} -> {} has no kind", t, s))
                })?;
                let reverse_slot = topology.slot_of(t, s).ok_or_else(|| {
                    PbpError::InvalidConfig(format!("edge {} -> {} is not symmetric", s, t))
                })?;
                slots.push(IncomingEdge {
                    source: t,
                    kind,
                    reverse_slot,
                });
            }
            incoming.push(slots);
        }

        let messages = Self::uniform_messages(&topology, n);
        let pairwise = PairwiseModel::new(&config.geometry, config.pairwise);
        let rng = StdRng::seed_from_u64(config.seed);
        tracing::debug!(
            num_particles = n,
            algorithm = config.algorithm.as_str(),
            elitism = config.elitism,
            "spider graph constructed"
        );

        Ok(Self {
            config,
            topology,
            pairwise,
            nodes,
            incoming,
            messages,
            proposal: None,
            phase: Phase::Uninitialized,
            rng,
        })
    }

    fn uniform_messages(topology: &Topology, n: usize) -> Vec<DMatrix<f64>> {
        (0..topology.len())
            .map(|s| DMatrix::from_element(topology.neighbors(s).len(), n, 1.0 / n as f64))
            .collect()
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn pairwise(&self) -> &PairwiseModel {
        &self.pairwise
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: usize) -> &GraphNode {
        &self.nodes[id]
    }

    /// Incoming messages of node `id`, one row per neighbor in
    /// [`Topology::neighbors`] order.
    pub fn messages(&self, id: usize) -> &DMatrix<f64> {
        &self.messages[id]
    }

    /// Snapshot the next message sweep will read.
    pub fn proposal(&self) -> Option<&ProposalSnapshot> {
        self.proposal.as_deref()
    }

    // ── Initialization ─────────────────────────────────────────────────────

    /// Seed every node uniformly over the image, with uniform limb
    /// orientation.
    pub fn init_random(&mut self, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        let [w, h] = self.config.image_size;
        let span = self.config.init.orientation_span();
        let n = self.config.num_particles;
        let mut all = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let dim = node.kind().dim();
            let mut states = DMatrix::<f64>::zeros(n, dim);
            for i in 0..n {
                states[(i, 0)] = self.rng.gen_range(0.0..w as f64);
                states[(i, 1)] = self.rng.gen_range(0.0..h as f64);
                if dim == 3 {
                    states[(i, 2)] = self.rng.gen_range(0.0..span);
                }
            }
            all.push(states);
        }
        self.install(all, image)?;
        tracing::info!(num_particles = n, "particles seeded uniformly");
        Ok(())
    }

    /// Seed every node at pixels carrying its tag, plus Gaussian positional
    /// noise and uniform limb orientation.
    ///
    /// Fails with [`PbpError::MissingTag`] before touching any node if some
    /// tag has no pixel.
    pub fn init_from_observation(&mut self, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        let pixels: Vec<Vec<[u32; 2]>> = self
            .nodes
            .iter()
            .map(|node| {
                let px = image.pixels_with_tag(node.tag());
                if px.is_empty() {
                    Err(PbpError::MissingTag { tag: node.tag() })
                } else {
                    Ok(px)
                }
            })
            .collect::<Result<_>>()?;

        let noise = Normal::new(0.0, self.config.init.position_noise_px)
            .map_err(|err| PbpError::InvalidConfig(format!("init noise: {}", err)))?;
        let span = self.config.init.orientation_span();
        let n = self.config.num_particles;
        let mut all = Vec::with_capacity(self.nodes.len());
        for (node, px) in self.nodes.iter().zip(&pixels) {
            let dim = node.kind().dim();
            let mut states = DMatrix::<f64>::zeros(n, dim);
            for i in 0..n {
                let [x, y] = px[self.rng.gen_range(0..px.len())];
                states[(i, 0)] = x as f64 + noise.sample(&mut self.rng);
                states[(i, 1)] = y as f64 + noise.sample(&mut self.rng);
                if dim == 3 {
                    states[(i, 2)] = self.rng.gen_range(0.0..span);
                }
            }
            all.push(states);
        }
        self.install(all, image)?;
        tracing::info!(num_particles = n, "particles seeded from observation");
        Ok(())
    }

    /// Seed from caller-provided `N×D` state matrices, one per node in
    /// topology order.
    pub fn init_from_states(&mut self, states: Vec<DMatrix<f64>>, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        if states.len() != self.nodes.len() {
            return Err(PbpError::InvalidConfig(format!(
                "expected {} state matrices, got {}",
                self.nodes.len(),
                states.len()
            )));
        }
        self.install(states, image)
    }

    fn install(&mut self, states: Vec<DMatrix<f64>>, image: &LabelImage) -> Result<()> {
        let n = self.config.num_particles;
        for (node, s) in self.nodes.iter().zip(&states) {
            let expected = (n, node.kind().dim());
            if s.shape() != expected {
                return Err(PbpError::StateShape {
                    node: node.index(),
                    expected,
                    got: s.shape(),
                });
            }
        }
        for (node, s) in self.nodes.iter_mut().zip(states) {
            node.set_states(s)?;
        }
        self.nodes
            .par_iter_mut()
            .for_each(|node| node.update_unaries(image));
        self.messages = Self::uniform_messages(&self.topology, n);
        self.proposal = Some(Arc::new(ProposalSnapshot::capture(&self.nodes)));
        self.phase = Phase::Initialized;
        Ok(())
    }

    // ── Iteration cycle ────────────────────────────────────────────────────

    fn require(&self, requested: Phase, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PbpError::PhaseOrder {
                requested,
                current: self.phase,
            })
        }
    }

    /// Recompute unaries, then every message from the frozen proposal, then
    /// replace the proposal with the current particles.
    pub fn update_messages(&mut self, image: &LabelImage) -> Result<()> {
        self.require(Phase::MessagesUpdated, &[Phase::Initialized, Phase::Jittered])?;
        image.ensure_size(self.config.image_size)?;
        let proposal = match &self.proposal {
            Some(p) => Arc::clone(p),
            None => return Err(PbpError::NotInitialized),
        };

        self.nodes
            .par_iter_mut()
            .for_each(|node| node.update_unaries(image));

        let messages: Vec<DMatrix<f64>> = (0..self.nodes.len())
            .into_par_iter()
            .map(|s| self.incoming_messages(s, &proposal))
            .collect();
        self.messages = messages;
        self.proposal = Some(Arc::new(ProposalSnapshot::capture(&self.nodes)));
        self.phase = Phase::MessagesUpdated;
        tracing::debug!("message sweep complete");
        Ok(())
    }

    /// All messages into node `s`:
    ///
    /// `m[t→s][i] = reduce_j psi(x_s[i], x̂_t[j]) · û_t[j] / m[s→t][j]`
    ///
    /// where hats denote the proposal. Each message is normalized to sum to 1
    /// and floored at [`MESSAGE_FLOOR`].
    fn incoming_messages(&self, s: usize, proposal: &ProposalSnapshot) -> DMatrix<f64> {
        let target = &self.nodes[s];
        let n = target.num_particles();
        let edges = &self.incoming[s];
        let mut out = DMatrix::<f64>::zeros(edges.len(), n);

        for (slot, edge) in edges.iter().enumerate() {
            let t = edge.source;
            let psi = self
                .pairwise
                .edge_matrix(edge.kind, target.states(), proposal.states(t));
            let unary_t = proposal.unaries(t);
            let reverse = self.messages[t].row(edge.reverse_slot);
            let src_weight: Vec<f64> = (0..psi.ncols())
                .map(|j| unary_t[j] / reverse[j].max(MESSAGE_FLOOR))
                .collect();

            let mut sum = 0.0;
            for i in 0..n {
                let terms = src_weight.iter().enumerate().map(|(j, w)| psi[(i, j)] * w);
                let v = match self.config.algorithm {
                    Algorithm::SumProduct => terms.sum::<f64>() / src_weight.len() as f64,
                    Algorithm::MaxProduct => terms.fold(0.0, f64::max),
                };
                out[(slot, i)] = v;
                sum += v;
            }

            if sum.is_finite() && sum > 0.0 {
                out.row_mut(slot).iter_mut().for_each(|v| *v = (*v / sum).max(MESSAGE_FLOOR));
            } else {
                tracing::debug!(from = t, to = s, "degenerate message, reset to uniform");
                out.row_mut(slot).fill(1.0 / n as f64);
            }
            tracing::trace!(from = t, to = s, kind = ?edge.kind, "message updated");
        }
        out
    }

    /// Combine unaries and incoming messages into new weights:
    /// `log b_s = log u_s + Σ log m[t→s]`, normalized in the log domain.
    pub fn update_belief(&mut self) -> Result<()> {
        self.require(Phase::BeliefUpdated, &[Phase::MessagesUpdated])?;
        let log_beliefs: Vec<Vec<f64>> = self
            .nodes
            .iter()
            .zip(&self.messages)
            .map(|(node, msgs)| {
                (0..node.num_particles())
                    .map(|i| {
                        node.unaries()[i].ln() + msgs.column(i).iter().map(|m| m.ln()).sum::<f64>()
                    })
                    .collect()
            })
            .collect();

        let mut weights = Vec::with_capacity(log_beliefs.len());
        for lb in &log_beliefs {
            weights.push(crate::sampler::normalize_weights(lb, WeightDomain::Log)?);
        }
        for (node, w) in self.nodes.iter_mut().zip(&weights) {
            node.set_weights(w, WeightDomain::Linear)?;
        }
        self.phase = Phase::BeliefUpdated;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let ess: Vec<f64> = self.nodes.iter().map(|n| n.effective_sample_size()).collect();
            tracing::debug!(?ess, "beliefs updated");
        }
        Ok(())
    }

    /// Resample every node from its belief weights.
    ///
    /// Every node's draw is planned before any node changes, so a failure
    /// leaves all particle sets as they were.
    pub fn resample(&mut self) -> Result<()> {
        self.require(Phase::Resampled, &[Phase::BeliefUpdated])?;
        let scheme = self.config.resample;
        let keep_best = self.config.elitism;
        let mut plans = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            plans.push(node.plan_resample(scheme, keep_best, &mut self.rng)?);
        }
        for (node, plan) in self.nodes.iter_mut().zip(plans) {
            node.apply_resample(plan);
        }
        self.phase = Phase::Resampled;
        Ok(())
    }

    /// Diversify the resampled particles with Gaussian noise.
    pub fn jitter(&mut self) -> Result<()> {
        self.require(Phase::Jittered, &[Phase::Resampled])?;
        let keep_best = self.config.elitism;
        for node in &mut self.nodes {
            let std_devs = self.config.jitter.std_devs(node.kind().dim());
            node.jitter(&std_devs, keep_best, &mut self.rng)?;
        }
        self.phase = Phase::Jittered;
        Ok(())
    }

    /// One full iteration.
    pub fn step(&mut self, image: &LabelImage) -> Result<()> {
        self.update_messages(image)?;
        self.update_belief()?;
        self.resample()?;
        self.jitter()
    }

    // ── Read-out ───────────────────────────────────────────────────────────

    /// Current particle set of every node.
    pub fn marginals(&self) -> Result<Vec<NodeMarginal<'_>>> {
        if self.phase == Phase::Uninitialized {
            return Err(PbpError::NotInitialized);
        }
        Ok(self
            .nodes
            .iter()
            .map(|node| NodeMarginal {
                id: node.index(),
                tag: node.tag(),
                kind: node.kind(),
                states: node.states(),
                weights: node.weights(),
            })
            .collect())
    }

    /// MAP particle of every node.
    pub fn estimate(&self) -> Result<SpiderEstimate> {
        if self.phase == Phase::Uninitialized {
            return Err(PbpError::NotInitialized);
        }
        let states: Vec<Vec<f64>> = self.nodes.iter().map(|n| n.estimate()).collect();
        SpiderEstimate::from_states(&states)
    }
}
