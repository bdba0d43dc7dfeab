//! Joint unary: agreement of a whole rendered spider with the observation.

use std::collections::HashSet;

use super::EPSILON;
use crate::config::SpiderGeometry;
use crate::graph::Topology;
use crate::label::LabelImage;
use crate::shape::{FootprintTemplate, Shape, ShapeKind};
use crate::synth::SpiderPose;

/// Footprint templates and tags of all nine parts.
#[derive(Debug, Clone)]
pub struct SpiderFootprint {
    geometry: SpiderGeometry,
    root: FootprintTemplate,
    limb: FootprintTemplate,
    /// `(kind, tag)` per part in topology order.
    parts: Vec<(ShapeKind, u8)>,
}

impl SpiderFootprint {
    pub fn new(geometry: &SpiderGeometry) -> Self {
        let parts = Topology::spider()
            .parts()
            .iter()
            .map(|p| (p.kind, p.tag))
            .collect();
        Self {
            geometry: *geometry,
            root: Shape::root(geometry).template(),
            limb: Shape::limb(geometry).template(),
            parts,
        }
    }

    pub fn geometry(&self) -> &SpiderGeometry {
        &self.geometry
    }

    /// Fraction of the pose's in-bounds pixels whose observed label equals
    /// the tag the pose would render there, floored at [`EPSILON`].
    ///
    /// Where parts overlap, the later part in topology order owns the pixel,
    /// matching [`render_spider`](crate::synth::render_spider).
    pub fn score(&self, pose: &SpiderPose, image: &LabelImage) -> f64 {
        let states = pose.part_states(&self.geometry);
        let mut owned: HashSet<(i64, i64)> = HashSet::new();
        let mut total = 0usize;
        let mut hits = 0usize;

        for ((kind, tag), state) in self.parts.iter().zip(&states).rev() {
            let template = match kind {
                ShapeKind::Circle => &self.root,
                ShapeKind::Rectangle => &self.limb,
            };
            template.for_each_pixel(state, |x, y| {
                let Some(label) = image.label_at(x, y) else {
                    return;
                };
                if owned.insert((x, y)) {
                    total += 1;
                    if label == *tag {
                        hits += 1;
                    }
                }
            });
        }

        if total == 0 {
            return EPSILON;
        }
        (hits as f64 / total as f64).max(EPSILON)
    }
}
