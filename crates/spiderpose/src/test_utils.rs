//! Shared fixtures for graph-level unit tests.

use crate::config::GraphConfig;
use crate::label::LabelImage;
use crate::synth::{render_spider, SpiderPose};

/// Image size used by the fixtures; large enough for a spider at the center.
pub(crate) const FIXTURE_SIZE: [u32; 2] = [320, 320];

/// Default config with 50 particles, a splayed spider at the image center and
/// its rendered label image (no distractors).
pub(crate) fn spider_fixture() -> (GraphConfig, SpiderPose, LabelImage) {
    let config = GraphConfig::new(50, FIXTURE_SIZE);
    let pose = SpiderPose::splayed(
        [FIXTURE_SIZE[0] as f64 / 2.0, FIXTURE_SIZE[1] as f64 / 2.0],
        0.3,
    );
    let mut image = LabelImage::new(FIXTURE_SIZE[0], FIXTURE_SIZE[1]);
    render_spider(&mut image, &pose, &config.geometry);
    (config, pose, image)
}

