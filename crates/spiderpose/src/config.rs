//! Inference configuration.
//!
//! All structs are serde-(de)serializable with `#[serde(default)]`, so a JSON
//! overlay only needs to name the fields it changes.

use std::path::Path;
use std::str::FromStr;

use crate::error::{PbpError, Result};

/// Message reduction used when collapsing the source particle dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Average over source particles (`1/N · Σ`).
    #[default]
    SumProduct,
    /// Maximum over source particles.
    MaxProduct,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SumProduct => "sum-product",
            Self::MaxProduct => "max-product",
        }
    }
}

impl FromStr for Algorithm {
    type Err = PbpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "sum-product" | "sum" => Ok(Self::SumProduct),
            "max-product" | "max" => Ok(Self::MaxProduct),
            _ => Err(PbpError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Resampling scheme applied to every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleScheme {
    /// Independent categorical draws.
    #[default]
    Multinomial,
    /// Systematic (low-variance) resampling with a single random offset.
    LowVariance,
}

/// Fixed body geometry shared by every particle of a part.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SpiderGeometry {
    /// Radius of the root circle in pixels.
    pub root_radius_px: f64,
    /// Limb extent along its orientation axis in pixels.
    pub limb_width_px: f64,
    /// Limb extent across its orientation axis in pixels.
    pub limb_height_px: f64,
}

impl Default for SpiderGeometry {
    fn default() -> Self {
        Self {
            root_radius_px: 10.0,
            limb_width_px: 40.0,
            limb_height_px: 10.0,
        }
    }
}

/// Weights of the attachment and alignment penalties in the pairwise potential.
///
/// `psi = exp(-beta * distance_error - gamma * (1 - |cos|))`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PairwiseParams {
    /// Penalty per pixel of attachment-distance error.
    pub beta: f64,
    /// Penalty for full misalignment (`|cos| = 0`).
    pub gamma: f64,
}

impl Default for PairwiseParams {
    fn default() -> Self {
        Self {
            beta: 0.05,
            gamma: 2.0,
        }
    }
}

/// Gaussian diversification applied after resampling.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JitterParams {
    /// Standard deviation of the x and y noise in pixels.
    pub position_std_px: f64,
    /// Standard deviation of the orientation noise in radians (limbs only).
    pub orientation_std_rad: f64,
}

impl Default for JitterParams {
    fn default() -> Self {
        Self {
            position_std_px: 3.0,
            orientation_std_rad: 0.1,
        }
    }
}

impl JitterParams {
    /// Per-dimension standard deviations for a state of dimension `dim`.
    pub fn std_devs(&self, dim: usize) -> Vec<f64> {
        (0..dim)
            .map(|d| {
                if d < 2 {
                    self.position_std_px
                } else {
                    self.orientation_std_rad
                }
            })
            .collect()
    }
}

/// Particle seeding parameters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InitParams {
    /// Standard deviation of the positional noise added to pixels sampled
    /// from the observation.
    pub position_noise_px: f64,
    /// Draw initial limb orientations from `[0, 2π)` instead of `[0, π)`.
    ///
    /// The joint of an inner limb sits at the `+θ` end, so with the half-turn
    /// range a limb whose true orientation lies in `[π, 2π)` starts with its
    /// joint on the root side.
    pub full_turn_orientation: bool,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            position_noise_px: 2.0,
            full_turn_orientation: false,
        }
    }
}

impl InitParams {
    /// Upper bound of the uniform initial orientation.
    pub fn orientation_span(&self) -> f64 {
        if self.full_turn_orientation {
            std::f64::consts::TAU
        } else {
            std::f64::consts::PI
        }
    }
}

/// Complete configuration of a [`SpiderGraph`](crate::SpiderGraph).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Particles per node (N). Fixed for the graph's lifetime.
    pub num_particles: usize,
    /// Observation size `[width, height]` in pixels.
    pub image_size: [u32; 2],
    /// Message reduction variant.
    pub algorithm: Algorithm,
    /// Keep the highest-weight particle through resampling and jitter.
    pub elitism: bool,
    /// Resampling scheme.
    pub resample: ResampleScheme,
    pub geometry: SpiderGeometry,
    pub pairwise: PairwiseParams,
    pub jitter: JitterParams,
    pub init: InitParams,
    /// Seed of the graph-owned random number generator.
    pub seed: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            num_particles: 100,
            image_size: [640, 480],
            algorithm: Algorithm::SumProduct,
            elitism: true,
            resample: ResampleScheme::Multinomial,
            geometry: SpiderGeometry::default(),
            pairwise: PairwiseParams::default(),
            jitter: JitterParams::default(),
            init: InitParams::default(),
            seed: 42,
        }
    }
}

impl GraphConfig {
    /// Default configuration with the given particle count and image size.
    pub fn new(num_particles: usize, image_size: [u32; 2]) -> Self {
        Self {
            num_particles,
            image_size,
            ..Default::default()
        }
    }

    /// Load a configuration overlay from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parse a configuration overlay from a JSON string and validate it.
    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value that the graph relies on.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(PbpError::InvalidConfig(
                "num_particles must be at least 1".to_string(),
            ));
        }
        if self.image_size[0] == 0 || self.image_size[1] == 0 {
            return Err(PbpError::InvalidConfig(format!(
                "image_size must be positive, got {}x{}",
                self.image_size[0], self.image_size[1]
            )));
        }
        let g = &self.geometry;
        let dims = [g.root_radius_px, g.limb_width_px, g.limb_height_px];
        if dims.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(PbpError::InvalidConfig(format!(
                "geometry must be positive and finite, got radius={} width={} height={}",
                g.root_radius_px, g.limb_width_px, g.limb_height_px
            )));
        }
        let p = &self.pairwise;
        if !p.beta.is_finite() || p.beta < 0.0 || !p.gamma.is_finite() || p.gamma < 0.0 {
            return Err(PbpError::InvalidConfig(format!(
                "pairwise beta/gamma must be non-negative, got beta={} gamma={}",
                p.beta, p.gamma
            )));
        }
        let j = &self.jitter;
        if j.position_std_px < 0.0 || j.orientation_std_rad < 0.0 {
            return Err(PbpError::InvalidConfig(
                "jitter standard deviations must be non-negative".to_string(),
            ));
        }
        if self.init.position_noise_px < 0.0 {
            return Err(PbpError::InvalidConfig(
                "init.position_noise_px must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_parses_known_names() {
        assert_eq!("sum-product".parse::<Algorithm>().unwrap(), Algorithm::SumProduct);
        assert_eq!("MAX_PRODUCT".parse::<Algorithm>().unwrap(), Algorithm::MaxProduct);
        assert!(matches!(
            "loopy".parse::<Algorithm>(),
            Err(PbpError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn zero_particles_rejected() {
        let cfg = GraphConfig::new(0, [64, 64]);
        assert!(matches!(cfg.validate(), Err(PbpError::InvalidConfig(_))));
    }

    #[test]
    fn json_overlay_keeps_defaults() {
        let cfg = GraphConfig::from_json_str(
            r#"{"num_particles": 30, "algorithm": "max_product", "pairwise": {"beta": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(cfg.num_particles, 30);
        assert_eq!(cfg.algorithm, Algorithm::MaxProduct);
        assert_eq!(cfg.pairwise.beta, 0.5);
        assert_eq!(cfg.pairwise.gamma, PairwiseParams::default().gamma);
        assert_eq!(cfg.geometry, SpiderGeometry::default());
    }

    #[test]
    fn jitter_std_devs_split_position_and_orientation() {
        let j = JitterParams {
            position_std_px: 4.0,
            orientation_std_rad: 0.2,
        };
        assert_eq!(j.std_devs(2), vec![4.0, 4.0]);
        assert_eq!(j.std_devs(3), vec![4.0, 4.0, 0.2]);
    }
}
