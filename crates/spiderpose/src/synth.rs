//! Synthetic spider scenes for testing and benchmarking.
//!
//! A [`SpiderPose`] is a body center plus one absolute angle per inner limb
//! and one bend per outer limb. Forward kinematics place every part exactly
//! at the attachment distances of the pairwise model, so a rendered pose is a
//! zero-error configuration for [`PairwiseModel`](crate::PairwiseModel).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use rand::prelude::*;

use crate::config::SpiderGeometry;
use crate::error::{PbpError, Result};
use crate::graph::{Topology, NUM_LIMBS, NUM_NODES};
use crate::label::LabelImage;
use crate::pose::SpiderEstimate;
use crate::shape::{Shape, ShapeKind};

/// Ground-truth articulation of one spider.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpiderPose {
    /// Root center `[x, y]` in pixels.
    pub center: [f64; 2],
    /// Absolute orientation of each inner limb (radians).
    pub inner_angles: [f64; 4],
    /// Bend of each outer limb relative to its inner limb (radians).
    pub outer_bends: [f64; 4],
}

impl SpiderPose {
    /// Limbs on the diagonals, every outer limb bent by `bend`.
    pub fn splayed(center: [f64; 2], bend: f64) -> Self {
        let mut inner_angles = [0.0; 4];
        for (i, a) in inner_angles.iter_mut().enumerate() {
            *a = FRAC_PI_4 + i as f64 * FRAC_PI_2;
        }
        Self {
            center,
            inner_angles,
            outer_bends: [bend; 4],
        }
    }

    /// Random pose fully inside an image of `image_size`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, image_size: [u32; 2], geometry: &SpiderGeometry) -> Result<Self> {
        let reach = Self::reach(geometry);
        let [w, h] = [image_size[0] as f64, image_size[1] as f64];
        if w <= 2.0 * reach || h <= 2.0 * reach {
            return Err(PbpError::InvalidConfig(format!(
                "image {}x{} cannot hold a spider of reach {:.1}px",
                image_size[0], image_size[1], reach
            )));
        }
        let center = [rng.gen_range(reach..w - reach), rng.gen_range(reach..h - reach)];
        let mut pose = Self::splayed(center, 0.0);
        let base = rng.gen_range(0.0..FRAC_PI_2);
        for i in 0..4 {
            pose.inner_angles[i] = base + i as f64 * FRAC_PI_2 + rng.gen_range(-0.3..0.3);
            pose.outer_bends[i] = rng.gen_range(-0.6..0.6);
        }
        Ok(pose)
    }

    /// Largest distance from the root center to any covered pixel.
    pub fn reach(geometry: &SpiderGeometry) -> f64 {
        let r = geometry.root_radius_px;
        let w = geometry.limb_width_px;
        let h = geometry.limb_height_px;
        // Outer limb far end: joint at r + 1.5w, center one width further, half a width more.
        r + 3.0 * w + 0.5 * h
    }

    /// Per-node state vectors in topology order.
    pub fn part_states(&self, geometry: &SpiderGeometry) -> Vec<Vec<f64>> {
        let r = geometry.root_radius_px;
        let w = geometry.limb_width_px;
        let [cx, cy] = self.center;
        let mut states = vec![Vec::new(); NUM_NODES];
        states[0] = vec![cx, cy];
        for i in 0..4 {
            let q = self.inner_angles[i];
            let (sq, cq) = q.sin_cos();
            let inner = [cx + (r + w) * cq, cy + (r + w) * sq];
            let joint = [inner[0] + 0.5 * w * cq, inner[1] + 0.5 * w * sq];
            let a = q + self.outer_bends[i];
            let (sa, ca) = a.sin_cos();
            states[1 + i] = vec![inner[0], inner[1], q];
            states[5 + i] = vec![joint[0] + w * ca, joint[1] + w * sa, a];
        }
        states
    }
}

/// Ground-truth state of one part.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartTruth {
    pub id: usize,
    pub tag: u8,
    pub kind: ShapeKind,
    pub state: Vec<f64>,
}

/// Everything needed to score an estimate against a generated scene.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GroundTruth {
    pub image_size: [u32; 2],
    pub geometry: SpiderGeometry,
    pub pose: SpiderPose,
    pub parts: Vec<PartTruth>,
}

impl GroundTruth {
    pub fn new(pose: SpiderPose, geometry: SpiderGeometry, image_size: [u32; 2]) -> Self {
        let topology = Topology::spider();
        let parts = topology
            .parts()
            .iter()
            .zip(pose.part_states(&geometry))
            .map(|(p, state)| PartTruth {
                id: p.id,
                tag: p.tag,
                kind: p.kind,
                state,
            })
            .collect();
        Self {
            image_size,
            geometry,
            pose,
            parts,
        }
    }

    /// The truth as an estimate, for comparisons.
    ///
    /// Fails with [`PbpError::MalformedPose`] when `parts` does not hold one
    /// well-formed state per node, e.g. after loading hand-edited JSON.
    pub fn as_estimate(&self) -> Result<SpiderEstimate> {
        let states: Vec<Vec<f64>> = self.parts.iter().map(|p| p.state.clone()).collect();
        SpiderEstimate::from_states(&states)
    }
}

/// Scene generation parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneParams {
    /// `[width, height]` in pixels.
    pub image_size: [u32; 2],
    pub geometry: SpiderGeometry,
    /// Randomly tagged rectangles stamped under the spider.
    pub distractor_rects: usize,
    /// Randomly tagged circles stamped under the spider.
    pub distractor_circles: usize,
    /// Draw a random pose instead of the centered splayed one.
    pub random_pose: bool,
    pub seed: u64,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            image_size: [640, 480],
            geometry: SpiderGeometry::default(),
            distractor_rects: 0,
            distractor_circles: 0,
            random_pose: false,
            seed: 0,
        }
    }
}

/// A rendered observation with its ground truth.
#[derive(Debug, Clone)]
pub struct Scene {
    pub image: LabelImage,
    pub truth: GroundTruth,
}

/// Stamp every part of `pose` with its tag. Later parts overwrite earlier ones.
pub fn render_spider(image: &mut LabelImage, pose: &SpiderPose, geometry: &SpiderGeometry) {
    let topology = Topology::spider();
    for (part, state) in topology.parts().iter().zip(pose.part_states(geometry)) {
        let shape = match part.kind {
            ShapeKind::Circle => Shape::root(geometry),
            ShapeKind::Rectangle => Shape::limb(geometry),
        };
        shape.stamp(image, &state, part.tag);
    }
}

/// Render a spider over random distractors.
pub fn generate_scene(params: &SceneParams) -> Result<Scene> {
    let [w, h] = params.image_size;
    if w == 0 || h == 0 {
        return Err(PbpError::InvalidConfig("scene image size must be positive".to_string()));
    }
    let mut rng = StdRng::seed_from_u64(params.seed);
    let g = &params.geometry;
    let pose = if params.random_pose {
        SpiderPose::random(&mut rng, params.image_size, g)?
    } else {
        let center = [w as f64 / 2.0, h as f64 / 2.0];
        let reach = SpiderPose::reach(g);
        if center[0] < reach || center[1] < reach {
            return Err(PbpError::InvalidConfig(format!(
                "image {}x{} cannot hold a spider of reach {:.1}px",
                w, h, reach
            )));
        }
        SpiderPose::splayed(center, 0.3)
    };

    let mut image = LabelImage::new(w, h);
    let tags = 1..=NUM_NODES as u8;
    for _ in 0..params.distractor_rects {
        let shape = Shape::Rectangle {
            width: rng.gen_range(0.25..1.0) * g.limb_width_px,
            height: rng.gen_range(0.4..1.2) * g.limb_height_px,
        };
        let state = [
            rng.gen_range(0.0..w as f64),
            rng.gen_range(0.0..h as f64),
            rng.gen_range(0.0..PI),
        ];
        shape.stamp(&mut image, &state, rng.gen_range(tags.clone()));
    }
    for _ in 0..params.distractor_circles {
        let shape = Shape::Circle {
            radius: rng.gen_range(0.3..1.0) * g.root_radius_px,
        };
        let state = [rng.gen_range(0.0..w as f64), rng.gen_range(0.0..h as f64)];
        shape.stamp(&mut image, &state, rng.gen_range(tags.clone()));
    }
    render_spider(&mut image, &pose, g);

    tracing::debug!(
        center_x = pose.center[0],
        center_y = pose.center[1],
        rects = params.distractor_rects,
        circles = params.distractor_circles,
        "synthetic scene rendered"
    );
    Ok(Scene {
        image,
        truth: GroundTruth::new(pose, *g, params.image_size),
    })
}

/// Per-part distance between an estimate and the truth.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoseError {
    /// Root center error in pixels.
    pub root_px: f64,
    /// Limb center errors in pixels, topology order.
    pub limb_px: Vec<f64>,
    /// Limb axis errors in radians, folded into `[0, π/2]`.
    pub limb_axis_rad: Vec<f64>,
    pub mean_limb_px: f64,
}

/// Compare `estimate` with `truth`.
pub fn pose_error(estimate: &SpiderEstimate, truth: &GroundTruth) -> Result<PoseError> {
    let t = truth.as_estimate()?;
    let root_px = (estimate.root.x - t.root.x).hypot(estimate.root.y - t.root.y);
    let mut limb_px = Vec::with_capacity(NUM_LIMBS);
    let mut limb_axis_rad = Vec::with_capacity(NUM_LIMBS);
    for (e, g) in estimate.limbs.iter().zip(&t.limbs) {
        limb_px.push((e.x - g.x).hypot(e.y - g.y));
        let d = (e.theta - g.theta).rem_euclid(PI);
        limb_axis_rad.push(d.min(PI - d));
    }
    let mean_limb_px = limb_px.iter().sum::<f64>() / limb_px.len() as f64;
    Ok(PoseError {
        root_px,
        limb_px,
        limb_axis_rad,
        mean_limb_px,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PairwiseParams;
    use crate::potential::{unary_score, PairwiseModel};
    use approx::assert_relative_eq;

    #[test]
    fn forward_kinematics_scores_one_on_every_edge() {
        let g = SpiderGeometry::default();
        let model = PairwiseModel::new(&g, PairwiseParams::default());
        let topology = Topology::spider();
        let pose = SpiderPose {
            center: [200.0, 150.0],
            inner_angles: [0.1, 1.7, 3.3, 4.9],
            outer_bends: [0.4, -0.2, 0.0, 0.5],
        };
        let states = pose.part_states(&g);
        for (parent, child) in topology.edges() {
            for (source, target) in [(child, parent), (parent, child)] {
                let kind = topology.edge_kind(source, target).unwrap();
                let s = model.edge_score(kind, &states[target], &states[source]);
                assert_relative_eq!(s, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rendered_parts_cover_their_own_tags() {
        let params = SceneParams {
            image_size: [400, 400],
            ..Default::default()
        };
        let scene = generate_scene(&params).unwrap();
        for part in &scene.truth.parts {
            assert!(scene.image.count_tag(part.tag) > 0, "tag {} missing", part.tag);
        }
        let root = &scene.truth.parts[0];
        let template = Shape::root(&params.geometry).template();
        assert_relative_eq!(unary_score(&template, &root.state, &scene.image, 1), 1.0);
    }

    #[test]
    fn distractors_do_not_hide_the_spider() {
        let params = SceneParams {
            image_size: [400, 400],
            distractor_rects: 12,
            distractor_circles: 6,
            seed: 3,
            ..Default::default()
        };
        let scene = generate_scene(&params).unwrap();
        let root = &scene.truth.parts[0].state;
        assert_eq!(scene.image.label_at(root[0] as i64, root[1] as i64), Some(1));
        let clean = generate_scene(&SceneParams {
            distractor_rects: 0,
            distractor_circles: 0,
            ..params.clone()
        })
        .unwrap();
        let extra: usize = (1..=9).map(|t| scene.image.count_tag(t)).sum();
        let base: usize = (1..=9).map(|t| clean.image.count_tag(t)).sum();
        assert!(extra > base);
    }

    #[test]
    fn random_pose_fits_in_image() {
        let g = SpiderGeometry::default();
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..10 {
            let pose = SpiderPose::random(&mut rng, [400, 300], &g).unwrap();
            let reach = SpiderPose::reach(&g);
            assert!(pose.center[0] >= reach && pose.center[0] <= 400.0 - reach);
            assert!(pose.center[1] >= reach && pose.center[1] <= 300.0 - reach);
        }
        assert!(SpiderPose::random(&mut rng, [100, 100], &g).is_err());
    }

    #[test]
    fn pose_error_of_truth_is_zero() {
        let truth = GroundTruth::new(
            SpiderPose::splayed([150.0, 150.0], 0.2),
            SpiderGeometry::default(),
            [300, 300],
        );
        let err = pose_error(&truth.as_estimate().unwrap(), &truth).unwrap();
        assert_eq!(err.root_px, 0.0);
        assert_eq!(err.mean_limb_px, 0.0);
        let mut flipped = truth.as_estimate().unwrap();
        flipped.limbs[2].theta += PI;
        flipped.root.x += 3.0;
        let err = pose_error(&flipped, &truth).unwrap();
        assert_relative_eq!(err.root_px, 3.0);
        assert!(err.limb_axis_rad[2] < 1e-9);
    }

    #[test]
    fn malformed_truth_json_is_an_error() {
        let truth = GroundTruth::new(
            SpiderPose::splayed([150.0, 150.0], 0.2),
            SpiderGeometry::default(),
            [300, 300],
        );
        let estimate = truth.as_estimate().unwrap();

        let mut json = serde_json::to_value(&truth).unwrap();
        json["parts"][0]["state"] = serde_json::json!([]);
        let broken: GroundTruth = serde_json::from_value(json).unwrap();
        assert!(matches!(
            pose_error(&estimate, &broken),
            Err(PbpError::MalformedPose(_))
        ));

        let mut json = serde_json::to_value(&truth).unwrap();
        json["parts"].as_array_mut().unwrap().truncate(3);
        let short: GroundTruth = serde_json::from_value(json).unwrap();
        assert!(pose_error(&estimate, &short).is_err());
    }
}
