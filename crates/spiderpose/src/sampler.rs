//! Weight normalization and categorical resampling.
//!
//! Every function validates its weight vector first: empty, non-finite,
//! negative or zero-sum inputs are reported as [`PbpError::InvalidWeights`]
//! and never silently repaired.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{PbpError, Result};

/// Interpretation of the values handed to [`normalize_weights`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightDomain {
    /// Non-negative weights; normalized by dividing by their sum.
    Linear,
    /// Log-weights; max-shifted, exponentiated, then normalized.
    Log,
}

/// Turn `weights` into a probability vector.
pub fn normalize_weights(weights: &[f64], domain: WeightDomain) -> Result<Vec<f64>> {
    if weights.is_empty() {
        return Err(PbpError::InvalidWeights("empty weight vector".to_string()));
    }
    match domain {
        WeightDomain::Linear => {
            let sum = checked_sum(weights)?;
            Ok(weights.iter().map(|w| w / sum).collect())
        }
        WeightDomain::Log => {
            if weights.iter().any(|w| w.is_nan() || *w == f64::INFINITY) {
                return Err(PbpError::InvalidWeights(
                    "log-weights contain NaN or +inf".to_string(),
                ));
            }
            let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max == f64::NEG_INFINITY {
                return Err(PbpError::InvalidWeights(
                    "all log-weights are -inf".to_string(),
                ));
            }
            let shifted: Vec<f64> = weights.iter().map(|w| (w - max).exp()).collect();
            let sum: f64 = shifted.iter().sum();
            Ok(shifted.into_iter().map(|w| w / sum).collect())
        }
    }
}

/// Index of the largest weight (first one on ties).
pub fn argmax(weights: &[f64]) -> Option<usize> {
    weights
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &w)| match best {
            Some((_, bw)) if bw >= w => best,
            _ => Some((i, w)),
        })
        .map(|(i, _)| i)
}

/// Effective sample size `1 / Σ w²` of a normalized weight vector.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sq: f64 = weights.iter().map(|w| w * w).sum();
    if sq > 0.0 {
        1.0 / sq
    } else {
        0.0
    }
}

/// Draw `count` indices with replacement from the categorical distribution
/// over `weights`.
///
/// With `keep_best`, slot 0 holds the argmax index and only `count - 1`
/// indices are drawn.
pub fn importance_sample<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    keep_best: bool,
    rng: &mut R,
) -> Result<Vec<usize>> {
    checked_sum(weights)?;
    let dist = WeightedIndex::new(weights)
        .map_err(|err| PbpError::InvalidWeights(err.to_string()))?;
    let mut out = Vec::with_capacity(count);
    if keep_best && count > 0 {
        out.extend(argmax(weights));
    }
    while out.len() < count {
        out.push(dist.sample(rng));
    }
    Ok(out)
}

/// Systematic resampling: one uniform offset, evenly spaced pointers over
/// the cumulative weights.
///
/// `keep_best` has the same meaning as in [`importance_sample`].
pub fn low_variance_sample<R: Rng + ?Sized>(
    weights: &[f64],
    count: usize,
    keep_best: bool,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let sum = checked_sum(weights)?;
    let mut out = Vec::with_capacity(count);
    if keep_best && count > 0 {
        out.extend(argmax(weights));
    }
    let draws = count - out.len();
    if draws == 0 {
        return Ok(out);
    }
    let step = sum / draws as f64;
    let offset = rng.gen_range(0.0..step);
    let mut cumulative = weights[0];
    let mut i = 0;
    for k in 0..draws {
        let pointer = offset + k as f64 * step;
        while pointer >= cumulative && i + 1 < weights.len() {
            i += 1;
            cumulative += weights[i];
        }
        out.push(i);
    }
    Ok(out)
}

fn checked_sum(weights: &[f64]) -> Result<f64> {
    if weights.is_empty() {
        return Err(PbpError::InvalidWeights("empty weight vector".to_string()));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(PbpError::InvalidWeights(format!(
            "weights must be finite and non-negative, found {}",
            bad
        )));
    }
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(PbpError::InvalidWeights("weights sum to zero".to_string()));
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn linear_normalization_sums_to_one() {
        let w = normalize_weights(&[1.0, 3.0, 0.0, 4.0], WeightDomain::Linear).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0);
        assert_relative_eq!(w[1], 0.375);
    }

    #[test]
    fn log_normalization_survives_large_magnitudes() {
        let w = normalize_weights(&[-1000.0, -1001.0, f64::NEG_INFINITY], WeightDomain::Log).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0);
        assert_relative_eq!(w[0] / w[1], std::f64::consts::E, epsilon = 1e-9);
        assert_eq!(w[2], 0.0);
        let w = normalize_weights(&[800.0, 800.0], WeightDomain::Log).unwrap();
        assert_relative_eq!(w[0], 0.5);
    }

    #[test]
    fn malformed_weights_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(normalize_weights(&[], WeightDomain::Linear).is_err());
        assert!(normalize_weights(&[0.0, 0.0], WeightDomain::Linear).is_err());
        assert!(normalize_weights(&[1.0, f64::NAN], WeightDomain::Linear).is_err());
        assert!(normalize_weights(&[1.0, -0.5], WeightDomain::Linear).is_err());
        assert!(normalize_weights(&[f64::NAN], WeightDomain::Log).is_err());
        assert!(importance_sample(&[0.0, 0.0], 2, true, &mut rng).is_err());
        assert!(low_variance_sample(&[f64::NAN, 1.0], 2, false, &mut rng).is_err());
    }

    #[test]
    fn keep_best_puts_argmax_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let w = [0.1, 0.05, 0.6, 0.25];
        for _ in 0..20 {
            let idx = importance_sample(&w, 4, true, &mut rng).unwrap();
            assert_eq!(idx.len(), 4);
            assert_eq!(idx[0], 2);
            let idx = low_variance_sample(&w, 4, true, &mut rng).unwrap();
            assert_eq!(idx.len(), 4);
            assert_eq!(idx[0], 2);
        }
    }

    #[test]
    fn zero_weight_particles_never_drawn() {
        let mut rng = StdRng::seed_from_u64(3);
        let w = [0.0, 0.5, 0.0, 0.5];
        let idx = importance_sample(&w, 200, false, &mut rng).unwrap();
        assert!(idx.iter().all(|&i| i == 1 || i == 3));
        let idx = low_variance_sample(&w, 200, false, &mut rng).unwrap();
        assert!(idx.iter().all(|&i| i == 1 || i == 3));
    }

    #[test]
    fn low_variance_counts_track_weights() {
        let mut rng = StdRng::seed_from_u64(11);
        let w = [0.5, 0.25, 0.25];
        let idx = low_variance_sample(&w, 8, false, &mut rng).unwrap();
        let zeros = idx.iter().filter(|&&i| i == 0).count();
        assert_eq!(zeros, 4);
        assert!(idx.windows(2).all(|p| p[0] <= p[1]));
    }

    #[test]
    fn ess_bounds() {
        assert_relative_eq!(effective_sample_size(&[0.25; 4]), 4.0);
        assert_relative_eq!(effective_sample_size(&[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(argmax(&[0.2, 0.7, 0.7]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
