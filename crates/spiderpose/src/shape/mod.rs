//! Body-part shapes: state dimensionality, occupancy masks and footprints.

mod template;

pub use template::FootprintTemplate;

use crate::config::SpiderGeometry;
use crate::label::LabelImage;

/// Shape family of a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// State `(x, y)`.
    Circle,
    /// State `(x, y, θ)`.
    Rectangle,
}

impl ShapeKind {
    /// State-vector dimensionality.
    #[inline]
    pub const fn dim(self) -> usize {
        match self {
            Self::Circle => 2,
            Self::Rectangle => 3,
        }
    }
}

/// Concrete shape with its fixed geometry.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Circle { radius: f64 },
    /// `width` runs along the orientation axis, `height` across it.
    Rectangle { width: f64, height: f64 },
}

impl Shape {
    /// Root body shape under `geometry`.
    pub fn root(geometry: &SpiderGeometry) -> Self {
        Self::Circle {
            radius: geometry.root_radius_px,
        }
    }

    /// Limb shape under `geometry`.
    pub fn limb(geometry: &SpiderGeometry) -> Self {
        Self::Rectangle {
            width: geometry.limb_width_px,
            height: geometry.limb_height_px,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Circle { .. } => ShapeKind::Circle,
            Self::Rectangle { .. } => ShapeKind::Rectangle,
        }
    }

    #[inline]
    pub fn state_dim(&self) -> usize {
        self.kind().dim()
    }

    /// Local pixel-offset template used by the batched unary scorer.
    pub fn template(&self) -> FootprintTemplate {
        match *self {
            Self::Circle { radius } => FootprintTemplate::disk(radius),
            Self::Rectangle { width, height } => FootprintTemplate::rectangle(width, height),
        }
    }

    /// Whether the continuous shape placed at `state` covers pixel `(px, py)`.
    #[inline]
    pub fn contains(&self, state: &[f64], px: f64, py: f64) -> bool {
        let (dx, dy) = (px - state[0], py - state[1]);
        match *self {
            Self::Circle { radius } => dx * dx + dy * dy < radius * radius,
            Self::Rectangle { width, height } => {
                let (s, c) = state[2].sin_cos();
                let u = dx * c + dy * s;
                let v = -dx * s + dy * c;
                u.abs() <= width / 2.0 && v.abs() <= height / 2.0
            }
        }
    }

    /// Integer pixel bounding box `[x0, y0, x1, y1]` (inclusive) of the shape
    /// at `state`, clipped to `size`. `None` if nothing is inside the image.
    fn pixel_bounds(&self, state: &[f64], size: [u32; 2]) -> Option<[i64; 4]> {
        let reach = match *self {
            Self::Circle { radius } => radius,
            Self::Rectangle { width, height } => 0.5 * (width * width + height * height).sqrt(),
        };
        let x0 = ((state[0] - reach).floor() as i64).max(0);
        let y0 = ((state[1] - reach).floor() as i64).max(0);
        let x1 = ((state[0] + reach).ceil() as i64).min(size[0] as i64 - 1);
        let y1 = ((state[1] + reach).ceil() as i64).min(size[1] as i64 - 1);
        (x0 <= x1 && y0 <= y1).then_some([x0, y0, x1, y1])
    }

    /// Boolean occupancy mask of the shape placed at `state` on an image of
    /// `size`.
    pub fn mask(&self, state: &[f64], size: [u32; 2]) -> OccupancyMask {
        let mut mask = OccupancyMask::new(size);
        if let Some([x0, y0, x1, y1]) = self.pixel_bounds(state, size) {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if self.contains(state, x as f64, y as f64) {
                        mask.set(x as u32, y as u32);
                    }
                }
            }
        }
        mask
    }

    /// Write `tag` into every covered pixel of `image`. Returns the number of
    /// pixels written.
    pub fn stamp(&self, image: &mut LabelImage, state: &[f64], tag: u8) -> usize {
        let Some([x0, y0, x1, y1]) = self.pixel_bounds(state, image.size()) else {
            return 0;
        };
        let mut written = 0;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if self.contains(state, x as f64, y as f64) {
                    image.set(x, y, tag);
                    written += 1;
                }
            }
        }
        written
    }
}

/// Row-major boolean pixel mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyMask {
    size: [u32; 2],
    data: Vec<bool>,
}

impl OccupancyMask {
    pub fn new(size: [u32; 2]) -> Self {
        Self {
            size,
            data: vec![false; size[0] as usize * size[1] as usize],
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.size[0] && y < self.size[1] && self.data[(y * self.size[0] + x) as usize]
    }

    #[inline]
    fn set(&mut self, x: u32, y: u32) {
        let i = (y * self.size[0] + x) as usize;
        self.data[i] = true;
    }

    /// Number of occupied pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dims_follow_kind() {
        let g = SpiderGeometry::default();
        assert_eq!(Shape::root(&g).state_dim(), 2);
        assert_eq!(Shape::limb(&g).state_dim(), 3);
        assert_eq!(ShapeKind::Rectangle.dim(), 3);
    }

    #[test]
    fn circle_mask_area_is_close_to_pi_r2() {
        let mask = Shape::Circle { radius: 10.0 }.mask(&[50.0, 50.0], [100, 100]);
        let area = mask.count() as f64;
        let expected = std::f64::consts::PI * 100.0;
        assert!((area - expected).abs() / expected < 0.05, "area {area}");
        assert!(mask.get(50, 50));
        assert!(!mask.get(50, 61));
    }

    #[test]
    fn rotated_rectangle_mask_follows_axis() {
        let shape = Shape::Rectangle {
            width: 20.0,
            height: 4.0,
        };
        let mask = shape.mask(&[30.0, 30.0, std::f64::consts::FRAC_PI_2], [60, 60]);
        assert!(mask.get(30, 39));
        assert!(!mask.get(39, 30));
    }

    #[test]
    fn mask_clipped_at_border() {
        let mask = Shape::Circle { radius: 5.0 }.mask(&[0.0, 0.0], [20, 20]);
        assert!(mask.count() > 0);
        let outside = Shape::Circle { radius: 5.0 }.mask(&[-50.0, -50.0], [20, 20]);
        assert_eq!(outside.count(), 0);
    }

    #[test]
    fn stamp_writes_mask_pixels() {
        let shape = Shape::Rectangle {
            width: 10.0,
            height: 2.0,
        };
        let mut img = LabelImage::new(40, 40);
        let state = [20.0, 20.0, 0.3];
        let n = shape.stamp(&mut img, &state, 4);
        assert_eq!(n, shape.mask(&state, [40, 40]).count());
        assert_eq!(img.count_tag(4), n);
    }
}
