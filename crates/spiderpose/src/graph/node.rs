//! Particle set of one body part.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::ResampleScheme;
use crate::error::{PbpError, Result};
use crate::label::LabelImage;
use crate::potential::{unary_batch, EPSILON};
use crate::sampler::{self, WeightDomain};
use crate::shape::{FootprintTemplate, Shape, ShapeKind};

/// Drawn indices and their renormalized weights, computed before any
/// particle is moved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResamplePlan {
    pub(crate) indices: Vec<usize>,
    pub(crate) weights: Vec<f64>,
}

/// Particles, weights and unaries of one node.
///
/// Invariants: `states` is `N×D`, `weights` and `unaries` have length `N`,
/// `weights` is a probability vector and every unary is at least [`EPSILON`].
#[derive(Debug, Clone)]
pub struct GraphNode {
    index: usize,
    tag: u8,
    shape: Shape,
    template: FootprintTemplate,
    states: DMatrix<f64>,
    weights: DVector<f64>,
    unaries: DVector<f64>,
}

impl GraphNode {
    /// Node with `num_particles` zero states and uniform weights.
    pub fn new(index: usize, tag: u8, shape: Shape, num_particles: usize) -> Self {
        let n = num_particles;
        Self {
            index,
            tag,
            shape,
            template: shape.template(),
            states: DMatrix::zeros(n, shape.state_dim()),
            weights: DVector::from_element(n, 1.0 / n.max(1) as f64),
            unaries: DVector::from_element(n, EPSILON),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    #[inline]
    pub fn num_particles(&self) -> usize {
        self.states.nrows()
    }

    #[inline]
    pub fn states(&self) -> &DMatrix<f64> {
        &self.states
    }

    #[inline]
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    #[inline]
    pub fn unaries(&self) -> &DVector<f64> {
        &self.unaries
    }

    /// Replace the particle states and reset weights to uniform.
    pub fn set_states(&mut self, states: DMatrix<f64>) -> Result<()> {
        let expected = (self.num_particles(), self.shape.state_dim());
        if states.shape() != expected {
            return Err(PbpError::StateShape {
                node: self.index,
                expected,
                got: states.shape(),
            });
        }
        self.states = states;
        self.weights.fill(1.0 / expected.0 as f64);
        Ok(())
    }

    /// Replace the weight vector with a normalized copy of `weights`.
    pub fn set_weights(&mut self, weights: &[f64], domain: WeightDomain) -> Result<()> {
        if weights.len() != self.num_particles() {
            return Err(PbpError::InvalidWeights(format!(
                "node {} expects {} weights, got {}",
                self.index,
                self.num_particles(),
                weights.len()
            )));
        }
        let normalized = sampler::normalize_weights(weights, domain)?;
        self.weights = DVector::from_vec(normalized);
        Ok(())
    }

    /// Recompute the unary vector against `image`.
    pub fn update_unaries(&mut self, image: &LabelImage) {
        self.unaries = unary_batch(&self.template, &self.states, image, self.tag);
    }

    /// Draw `N` particles from the current weights and reindex states,
    /// unaries and weights by the drawn indices. Returns the indices.
    ///
    /// With `keep_best`, slot 0 holds the pre-resample argmax particle.
    pub fn resample<R: Rng + ?Sized>(
        &mut self,
        scheme: ResampleScheme,
        keep_best: bool,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let plan = self.plan_resample(scheme, keep_best, rng)?;
        let idx = plan.indices.clone();
        self.apply_resample(plan);
        Ok(idx)
    }

    /// Draw the resampling indices and the renormalized weights they select
    /// without touching the particle set.
    pub(crate) fn plan_resample<R: Rng + ?Sized>(
        &self,
        scheme: ResampleScheme,
        keep_best: bool,
        rng: &mut R,
    ) -> Result<ResamplePlan> {
        let n = self.num_particles();
        let weights = self.weights.as_slice();
        let indices = match scheme {
            ResampleScheme::Multinomial => sampler::importance_sample(weights, n, keep_best, rng)?,
            ResampleScheme::LowVariance => sampler::low_variance_sample(weights, n, keep_best, rng)?,
        };
        let gathered: Vec<f64> = indices.iter().map(|&i| self.weights[i]).collect();
        let weights = sampler::normalize_weights(&gathered, WeightDomain::Linear)?;
        Ok(ResamplePlan { indices, weights })
    }

    /// Reindex the particle set by a plan from [`Self::plan_resample`].
    pub(crate) fn apply_resample(&mut self, plan: ResamplePlan) {
        let idx = &plan.indices;
        let dim = self.states.ncols();
        self.states = DMatrix::from_fn(idx.len(), dim, |i, d| self.states[(idx[i], d)]);
        self.unaries = DVector::from_fn(idx.len(), |i, _| self.unaries[idx[i]]);
        self.weights = DVector::from_vec(plan.weights);
    }

    /// Add zero-mean Gaussian noise with per-dimension standard deviation
    /// `std_devs`. With `keep_best`, slot 0 is left untouched.
    pub fn jitter<R: Rng + ?Sized>(&mut self, std_devs: &[f64], keep_best: bool, rng: &mut R) -> Result<()> {
        let dim = self.states.ncols();
        if std_devs.len() < dim {
            return Err(PbpError::InvalidConfig(format!(
                "node {} needs {} jitter deviations, got {}",
                self.index,
                dim,
                std_devs.len()
            )));
        }
        let noise: Vec<Normal<f64>> = std_devs[..dim]
            .iter()
            .map(|&sd| Normal::new(0.0, sd))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| PbpError::InvalidConfig(format!("jitter deviation: {}", err)))?;
        let start = usize::from(keep_best);
        for i in start..self.num_particles() {
            for (d, dist) in noise.iter().enumerate() {
                self.states[(i, d)] += dist.sample(rng);
            }
        }
        Ok(())
    }

    /// Index of the maximum-weight particle.
    pub fn best_index(&self) -> usize {
        sampler::argmax(self.weights.as_slice()).unwrap_or(0)
    }

    /// MAP particle state.
    pub fn estimate(&self) -> Vec<f64> {
        let i = self.best_index();
        self.states.row(i).iter().copied().collect()
    }

    pub fn effective_sample_size(&self) -> f64 {
        sampler::effective_sample_size(self.weights.as_slice())
    }

    #[cfg(test)]
    pub(crate) fn weights_mut(&mut self) -> &mut DVector<f64> {
        &mut self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn limb_node(n: usize) -> GraphNode {
        GraphNode::new(
            1,
            2,
            Shape::Rectangle {
                width: 20.0,
                height: 4.0,
            },
            n,
        )
    }

    fn ramp_states(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, 3, |i, d| (i * 10 + d) as f64)
    }

    #[test]
    fn set_states_checks_shape() {
        let mut node = limb_node(4);
        let err = node.set_states(DMatrix::zeros(3, 3)).unwrap_err();
        assert!(matches!(
            err,
            PbpError::StateShape {
                node: 1,
                expected: (4, 3),
                got: (3, 3)
            }
        ));
        assert!(node.set_states(DMatrix::zeros(4, 2)).is_err());
        node.set_states(ramp_states(4)).unwrap();
        assert_relative_eq!(node.weights().sum(), 1.0);
    }

    #[test]
    fn elitist_resample_keeps_best_in_slot_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut node = limb_node(6);
        node.set_states(ramp_states(6)).unwrap();
        node.set_weights(&[0.05, 0.1, 0.05, 0.5, 0.2, 0.1], WeightDomain::Linear)
            .unwrap();
        let best = node.estimate();
        let idx = node.resample(ResampleScheme::Multinomial, true, &mut rng).unwrap();
        assert_eq!(idx.len(), 6);
        assert_eq!(node.num_particles(), 6);
        assert_eq!(idx[0], 3);
        let slot0: Vec<f64> = node.states().row(0).iter().copied().collect();
        assert_eq!(slot0, best);
        assert_eq!(node.estimate(), best);
        assert_relative_eq!(node.weights().sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn resample_rejects_malformed_weights() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut node = limb_node(3);
        assert!(node.set_weights(&[1.0, 2.0], WeightDomain::Linear).is_err());
        assert!(node.set_weights(&[0.0, 0.0, 0.0], WeightDomain::Linear).is_err());
        node.weights = DVector::from_vec(vec![f64::NAN, 0.5, 0.5]);
        assert!(node.resample(ResampleScheme::LowVariance, false, &mut rng).is_err());
    }

    #[test]
    fn planning_a_resample_leaves_the_node_untouched() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut node = limb_node(4);
        node.set_states(ramp_states(4)).unwrap();
        node.set_weights(&[0.1, 0.2, 0.3, 0.4], WeightDomain::Linear).unwrap();
        let before = node.clone();
        let plan = node
            .plan_resample(ResampleScheme::LowVariance, true, &mut rng)
            .unwrap();
        assert_eq!(node.states(), before.states());
        assert_eq!(node.weights(), before.weights());
        assert_eq!(plan.indices[0], 3);

        node.apply_resample(plan.clone());
        for (i, &k) in plan.indices.iter().enumerate() {
            assert_eq!(node.states().row(i), before.states().row(k));
        }
        assert_relative_eq!(node.weights().sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn jitter_spares_elite_and_moves_the_rest() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut node = limb_node(5);
        node.set_states(ramp_states(5)).unwrap();
        let before = node.states().clone();
        node.jitter(&[3.0, 3.0, 0.1], true, &mut rng).unwrap();
        assert_eq!(node.states().row(0), before.row(0));
        for i in 1..5 {
            assert_ne!(node.states().row(i), before.row(i));
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut node = limb_node(3);
        node.set_states(ramp_states(3)).unwrap();
        let before = node.states().clone();
        node.jitter(&[0.0, 0.0, 0.0], false, &mut rng).unwrap();
        assert_eq!(node.states(), &before);
        assert!(node.jitter(&[1.0, 1.0], false, &mut rng).is_err());
    }

    #[test]
    fn unaries_follow_image() {
        let mut node = GraphNode::new(0, 1, Shape::Circle { radius: 5.0 }, 2);
        node.set_states(DMatrix::from_row_slice(2, 2, &[20.0, 20.0, 80.0, 80.0]))
            .unwrap();
        let mut img = LabelImage::new(100, 100);
        Shape::Circle { radius: 8.0 }.stamp(&mut img, &[20.0, 20.0], 1);
        node.update_unaries(&img);
        assert_relative_eq!(node.unaries()[0], 1.0);
        assert_relative_eq!(node.unaries()[1], EPSILON);
    }
}
