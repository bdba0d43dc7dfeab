//! Unary likelihood: fraction of a part's footprint carrying its tag.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::{state_rows, EPSILON};
use crate::label::LabelImage;
use crate::shape::FootprintTemplate;

/// Score one particle.
///
/// Out-of-bounds samples count towards neither the matches nor the total.
/// A footprint with no in-bounds sample scores [`EPSILON`].
pub fn unary_score(template: &FootprintTemplate, state: &[f64], image: &LabelImage, tag: u8) -> f64 {
    let mut total = 0usize;
    let mut hits = 0usize;
    template.for_each_pixel(state, |x, y| {
        if let Some(label) = image.label_at(x, y) {
            total += 1;
            if label == tag {
                hits += 1;
            }
        }
    });
    if total == 0 {
        return EPSILON;
    }
    (hits as f64 / total as f64).max(EPSILON)
}

/// Score every row of an `N×D` state matrix in parallel.
pub fn unary_batch(
    template: &FootprintTemplate,
    states: &DMatrix<f64>,
    image: &LabelImage,
    tag: u8,
) -> DVector<f64> {
    let rows = state_rows(states);
    let scores: Vec<f64> = rows
        .par_iter()
        .map(|row| unary_score(template, row, image, tag))
        .collect();
    DVector::from_vec(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use approx::assert_relative_eq;

    fn filled(w: u32, h: u32, tag: u8) -> LabelImage {
        LabelImage::from_raw(w, h, vec![tag; (w * h) as usize]).unwrap()
    }

    #[test]
    fn footprint_on_matching_tag_scores_one() {
        let img = filled(100, 100, 3);
        let circle = Shape::Circle { radius: 10.0 }.template();
        let rect = Shape::Rectangle {
            width: 40.0,
            height: 10.0,
        }
        .template();
        assert_relative_eq!(unary_score(&circle, &[50.0, 50.0], &img, 3), 1.0);
        assert_relative_eq!(unary_score(&rect, &[50.0, 50.0, 0.7], &img, 3), 1.0);
    }

    #[test]
    fn background_and_wrong_tag_score_epsilon() {
        let bg = LabelImage::new(100, 100);
        let other = filled(100, 100, 2);
        let circle = Shape::Circle { radius: 10.0 }.template();
        assert_relative_eq!(unary_score(&circle, &[50.0, 50.0], &bg, 1), EPSILON);
        assert_relative_eq!(unary_score(&circle, &[50.0, 50.0], &other, 1), EPSILON);
    }

    #[test]
    fn out_of_bounds_samples_are_ignored() {
        let img = filled(40, 40, 1);
        let circle = Shape::Circle { radius: 10.0 }.template();
        // Half the disk hangs off the left edge; the visible half is all tag 1.
        assert_relative_eq!(unary_score(&circle, &[0.0, 20.0], &img, 1), 1.0);
        assert_relative_eq!(unary_score(&circle, &[-500.0, 20.0], &img, 1), EPSILON);
    }

    #[test]
    fn partial_overlap_scores_fraction() {
        let mut img = LabelImage::new(60, 60);
        for y in 0..60 {
            for x in 30..60 {
                img.set(x, y, 5);
            }
        }
        let circle = Shape::Circle { radius: 10.0 }.template();
        let s = unary_score(&circle, &[30.0, 30.0], &img, 5);
        assert!(s > 0.4 && s < 0.6, "score {s}");
    }

    #[test]
    fn batch_matches_scalar() {
        let img = filled(80, 80, 2);
        let rect = Shape::Rectangle {
            width: 20.0,
            height: 6.0,
        }
        .template();
        let states = DMatrix::from_row_slice(3, 3, &[40.0, 40.0, 0.0, 2.0, 2.0, 1.0, -90.0, 5.0, 0.0]);
        let batch = unary_batch(&rect, &states, &img, 2);
        assert_eq!(batch.len(), 3);
        for i in 0..3 {
            let row = [states[(i, 0)], states[(i, 1)], states[(i, 2)]];
            assert_relative_eq!(batch[i], unary_score(&rect, &row, &img, 2));
        }
        assert_relative_eq!(batch[0], 1.0);
        assert_relative_eq!(batch[2], EPSILON);
    }
}
