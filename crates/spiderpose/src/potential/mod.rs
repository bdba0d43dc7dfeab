//! Unary, joint and pairwise potentials.
//!
//! Both families are total: degenerate inputs are regularized to
//! [`EPSILON`] instead of producing an error or a non-finite value.

mod joint;
mod pairwise;
mod unary;

pub use joint::SpiderFootprint;
pub use pairwise::PairwiseModel;
pub use unary::{unary_batch, unary_score};

/// Lower bound of unary scores and of degenerate pairwise scores.
pub const EPSILON: f64 = 1e-4;

/// Lower bound of stored message values. Only guards the division by the
/// reverse message; kept far below [`EPSILON`] so it never flattens a message.
pub const MESSAGE_FLOOR: f64 = 1e-300;

/// Copy the rows of an `N×D` state matrix into fixed-size arrays
/// (unused trailing components are zero).
pub(crate) fn state_rows(states: &nalgebra::DMatrix<f64>) -> Vec<[f64; 3]> {
    let d = states.ncols().min(3);
    (0..states.nrows())
        .map(|i| {
            let mut row = [0.0; 3];
            for (k, v) in row.iter_mut().enumerate().take(d) {
                *v = states[(i, k)];
            }
            row
        })
        .collect()
}
