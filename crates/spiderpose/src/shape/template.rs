//! Reusable local pixel-offset templates for batched footprint scoring.
//!
//! A template is built once per shape and then placed at every particle:
//! circles translate a fixed set of integer disk offsets, rectangles rotate a
//! half-pixel grid of local `(u, v)` samples by the particle's orientation.

use super::ShapeKind;

/// Precomputed local footprint of one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintTemplate {
    kind: ShapeKind,
    /// Circle: integer `(dx, dy)`; rectangle: local `(u, v)` along/across the axis.
    offsets: Vec<[f64; 2]>,
}

impl FootprintTemplate {
    /// Integer offsets `(dx, dy)` with `dx, dy ∈ [-r, r)` and `dx² + dy² < r²`.
    pub fn disk(radius: f64) -> Self {
        let r = radius.ceil() as i64;
        let r2 = radius * radius;
        let mut offsets = Vec::new();
        for dy in -r..r {
            for dx in -r..r {
                let (fx, fy) = (dx as f64, dy as f64);
                if fx * fx + fy * fy < r2 {
                    offsets.push([fx, fy]);
                }
            }
        }
        Self {
            kind: ShapeKind::Circle,
            offsets,
        }
    }

    /// Grid of `2w × 2h` local samples spanning `[-w/2, w/2] × [-h/2, h/2]`.
    pub fn rectangle(width: f64, height: f64) -> Self {
        let us = linspace(-width / 2.0, width / 2.0, (2.0 * width).round() as usize);
        let vs = linspace(-height / 2.0, height / 2.0, (2.0 * height).round() as usize);
        let mut offsets = Vec::with_capacity(us.len() * vs.len());
        for &v in &vs {
            for &u in &us {
                offsets.push([u, v]);
            }
        }
        Self {
            kind: ShapeKind::Rectangle,
            offsets,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// Number of samples per placement.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Visit the image pixel of every sample when the template is placed at
    /// `state` (`[x, y]` or `[x, y, θ]`).
    ///
    /// Pixels may lie outside the image; callers do the bounds check.
    #[inline]
    pub fn for_each_pixel(&self, state: &[f64], mut f: impl FnMut(i64, i64)) {
        match self.kind {
            ShapeKind::Circle => {
                let cx = state[0].round();
                let cy = state[1].round();
                for o in &self.offsets {
                    f((cx + o[0]) as i64, (cy + o[1]) as i64);
                }
            }
            ShapeKind::Rectangle => {
                let (x, y, theta) = (state[0], state[1], state[2]);
                let (s, c) = theta.sin_cos();
                for o in &self.offsets {
                    let px = x + o[0] * c - o[1] * s;
                    let py = y + o[0] * s + o[1] * c;
                    f(px.round() as i64, py.round() as i64);
                }
            }
        }
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![(start + end) / 2.0],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn disk_offsets_stay_inside_radius() {
        let t = FootprintTemplate::disk(3.0);
        assert!(!t.is_empty());
        let mut seen = Vec::new();
        t.for_each_pixel(&[10.0, 10.0], |x, y| seen.push((x, y)));
        assert_eq!(seen.len(), t.len());
        for (x, y) in seen {
            let (dx, dy) = ((x - 10) as f64, (y - 10) as f64);
            assert!(dx * dx + dy * dy < 9.0);
        }
    }

    #[test]
    fn rectangle_samples_cover_extent() {
        let t = FootprintTemplate::rectangle(8.0, 2.0);
        assert_eq!(t.len(), 16 * 4);
        let (mut min_x, mut max_x) = (i64::MAX, i64::MIN);
        t.for_each_pixel(&[20.0, 20.0, 0.0], |x, _| {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
        });
        assert_eq!((min_x, max_x), (16, 24));
    }

    #[test]
    fn rectangle_rotation_swaps_axes() {
        let t = FootprintTemplate::rectangle(8.0, 2.0);
        let (mut min_y, mut max_y) = (i64::MAX, i64::MIN);
        t.for_each_pixel(&[20.0, 20.0, std::f64::consts::FRAC_PI_2], |_, y| {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        });
        assert_eq!((min_y, max_y), (16, 24));
    }

    #[test]
    fn linspace_includes_endpoints() {
        let v = linspace(-1.0, 1.0, 5);
        assert_relative_eq!(v[0], -1.0);
        assert_relative_eq!(v[2], 0.0);
        assert_relative_eq!(v[4], 1.0);
    }
}
