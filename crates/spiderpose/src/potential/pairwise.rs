//! Pairwise compatibility of adjacent parts.
//!
//! Each edge scores two soft constraints between an anchor point and a limb:
//! the anchor-to-limb distance should equal a fixed attachment length, and the
//! limb's axis should point along the anchor-to-limb direction.
//!
//! `psi = exp(-beta * |dist - target| - gamma * (1 - |cos(angle)|))`
//!
//! | edge          | anchor                                  | target distance |
//! |---------------|-----------------------------------------|-----------------|
//! | root ↔ limb   | root center                             | radius + width  |
//! | inner ↔ outer | inner center + width/2 along inner axis | width           |

use nalgebra::DMatrix;

use super::{state_rows, EPSILON};
use crate::config::{PairwiseParams, SpiderGeometry};
use crate::graph::EdgeKind;

/// Below this anchor-to-limb distance the direction is undefined.
const MIN_DIRECTION_NORM: f64 = 1e-9;

/// Pairwise potential bound to one body geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairwiseModel {
    pub params: PairwiseParams,
    pub root_radius: f64,
    pub limb_width: f64,
}

impl PairwiseModel {
    pub fn new(geometry: &SpiderGeometry, params: PairwiseParams) -> Self {
        Self {
            params,
            root_radius: geometry.root_radius_px,
            limb_width: geometry.limb_width_px,
        }
    }

    /// Attachment length between the root center and a limb center.
    #[inline]
    pub fn root_limb_distance(&self) -> f64 {
        self.root_radius + self.limb_width
    }

    /// Attachment length between an inner limb's joint and an outer limb center.
    #[inline]
    pub fn inner_outer_distance(&self) -> f64 {
        self.limb_width
    }

    /// Joint point at the far end of an inner limb `(x, y, θ)`.
    #[inline]
    pub fn joint(&self, inner: &[f64]) -> [f64; 2] {
        let (s, c) = inner[2].sin_cos();
        let half = 0.5 * self.limb_width;
        [inner[0] + half * c, inner[1] + half * s]
    }

    /// Root `(x, y)` against limb `(x, y, θ)`.
    #[inline]
    pub fn root_limb(&self, root: &[f64], limb: &[f64]) -> f64 {
        self.attachment([root[0], root[1]], limb, self.root_limb_distance())
    }

    /// Inner limb `(x, y, θ)` against outer limb `(x, y, θ)`.
    #[inline]
    pub fn inner_outer(&self, inner: &[f64], outer: &[f64]) -> f64 {
        self.attachment(self.joint(inner), outer, self.inner_outer_distance())
    }

    /// Score one directed edge. `target` belongs to the receiving node and
    /// `source` to the sending node.
    #[inline]
    pub fn edge_score(&self, kind: EdgeKind, target: &[f64], source: &[f64]) -> f64 {
        match kind {
            EdgeKind::LimbToRoot => self.root_limb(target, source),
            EdgeKind::RootToLimb => self.root_limb(source, target),
            EdgeKind::OuterToInner => self.inner_outer(target, source),
            EdgeKind::InnerToOuter => self.inner_outer(source, target),
        }
    }

    /// Full cross-product: entry `(i, j)` scores target particle `i` against
    /// source particle `j`.
    pub fn edge_matrix(
        &self,
        kind: EdgeKind,
        target: &DMatrix<f64>,
        source: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        let t = state_rows(target);
        let s = state_rows(source);
        DMatrix::from_fn(t.len(), s.len(), |i, j| self.edge_score(kind, &t[i], &s[j]))
    }

    fn attachment(&self, anchor: [f64; 2], limb: &[f64], target_distance: f64) -> f64 {
        let dx = limb[0] - anchor[0];
        let dy = limb[1] - anchor[1];
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < MIN_DIRECTION_NORM {
            return EPSILON;
        }
        let (s, c) = limb[2].sin_cos();
        let alignment = ((dx * c + dy * s) / dist).abs().min(1.0);
        let distance_error = (dist - target_distance).abs();
        (-self.params.beta * distance_error - self.params.gamma * (1.0 - alignment)).exp()
    }
}
