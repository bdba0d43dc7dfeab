//! Whole-spider particle filter.
//!
//! Every particle is a complete [`SpiderPose`] weighted by the joint unary of
//! its rendered footprint ([`SpiderFootprint`]). An iteration resamples,
//! jitters the survivors and reweights; there is no message passing. The
//! filter reads the particle count, image size, geometry, jitter, resampling,
//! elitism, init noise and seed of a [`GraphConfig`]; the pairwise and
//! algorithm settings do not apply.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_8};
use std::time::Instant;

use rand::prelude::*;
use rand_distr::Normal;
use rayon::prelude::*;

use crate::config::{GraphConfig, ResampleScheme};
use crate::error::{PbpError, Result};
use crate::graph::{Topology, ROOT};
use crate::label::LabelImage;
use crate::pose::SpiderEstimate;
use crate::potential::SpiderFootprint;
use crate::run::{InferenceReport, InitMode, IterationSummary, RunParams};
use crate::sampler;
use crate::synth::SpiderPose;

/// Standard deviation of the initial per-limb angle noise.
const INIT_ANGLE_STD: f64 = FRAC_PI_8;

/// Particle filter over whole-spider poses.
#[derive(Debug, Clone)]
pub struct JointParticleFilter {
    config: GraphConfig,
    footprint: SpiderFootprint,
    particles: Vec<SpiderPose>,
    scores: Vec<f64>,
    weights: Vec<f64>,
    rng: StdRng,
}

impl JointParticleFilter {
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let footprint = SpiderFootprint::new(&config.geometry);
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            footprint,
            particles: Vec::new(),
            scores: Vec::new(),
            weights: Vec::new(),
            rng,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        !self.particles.is_empty()
    }

    pub fn particles(&self) -> &[SpiderPose] {
        &self.particles
    }

    /// Joint unary of every particle.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Centers uniform over the image.
    pub fn init_random(&mut self, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        let [w, h] = self.config.image_size;
        let mut particles = Vec::with_capacity(self.config.num_particles);
        for _ in 0..self.config.num_particles {
            let center = [self.rng.gen_range(0.0..w as f64), self.rng.gen_range(0.0..h as f64)];
            particles.push(self.articulate(center)?);
        }
        self.install(particles, image);
        tracing::info!(num_particles = self.particles.len(), "joint particles seeded uniformly");
        Ok(())
    }

    /// Centers at root-tagged pixels plus Gaussian noise.
    pub fn init_from_observation(&mut self, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        let tag = Topology::spider().part(ROOT).tag;
        let pixels = image.pixels_with_tag(tag);
        if pixels.is_empty() {
            return Err(PbpError::MissingTag { tag });
        }
        let noise = Normal::new(0.0, self.config.init.position_noise_px)
            .map_err(|err| PbpError::InvalidConfig(format!("init noise: {}", err)))?;
        let mut particles = Vec::with_capacity(self.config.num_particles);
        for _ in 0..self.config.num_particles {
            let [x, y] = pixels[self.rng.gen_range(0..pixels.len())];
            let center = [
                x as f64 + noise.sample(&mut self.rng),
                y as f64 + noise.sample(&mut self.rng),
            ];
            particles.push(self.articulate(center)?);
        }
        self.install(particles, image);
        tracing::info!(num_particles = self.particles.len(), "joint particles seeded from observation");
        Ok(())
    }

    /// Seed from caller-provided poses. The first step resamples them to the
    /// configured particle count.
    pub fn init_from_poses(&mut self, poses: Vec<SpiderPose>, image: &LabelImage) -> Result<()> {
        image.ensure_size(self.config.image_size)?;
        if poses.is_empty() {
            return Err(PbpError::InvalidConfig("no poses to seed from".to_string()));
        }
        self.install(poses, image);
        Ok(())
    }

    /// Random articulation around `center`: a uniform body rotation, inner
    /// limbs a quarter turn apart, every angle perturbed.
    fn articulate(&mut self, center: [f64; 2]) -> Result<SpiderPose> {
        let noise = Normal::new(0.0, INIT_ANGLE_STD)
            .map_err(|err| PbpError::InvalidConfig(format!("angle noise: {}", err)))?;
        let base = self.rng.gen_range(0.0..FRAC_PI_2);
        let mut pose = SpiderPose::splayed(center, 0.0);
        for i in 0..4 {
            pose.inner_angles[i] = base + i as f64 * FRAC_PI_2 + noise.sample(&mut self.rng);
            pose.outer_bends[i] = noise.sample(&mut self.rng);
        }
        Ok(pose)
    }

    fn install(&mut self, particles: Vec<SpiderPose>, image: &LabelImage) {
        self.particles = particles;
        self.reweight(image);
    }

    /// Score every particle and set weights proportional to the scores.
    fn reweight(&mut self, image: &LabelImage) {
        let footprint = &self.footprint;
        self.scores = self
            .particles
            .par_iter()
            .map(|pose| footprint.score(pose, image))
            .collect();
        // Scores are floored at EPSILON, so the sum is positive.
        let total: f64 = self.scores.iter().sum();
        self.weights = self.scores.iter().map(|s| s / total).collect();
    }

    /// Resample, jitter all but the elite slot, then reweight against `image`.
    ///
    /// Every fallible step runs before the particle set changes.
    pub fn step(&mut self, image: &LabelImage) -> Result<()> {
        if !self.is_initialized() {
            return Err(PbpError::NotInitialized);
        }
        image.ensure_size(self.config.image_size)?;
        let pos = Normal::new(0.0, self.config.jitter.position_std_px)
            .map_err(|err| PbpError::InvalidConfig(format!("jitter deviation: {}", err)))?;
        let ang = Normal::new(0.0, self.config.jitter.orientation_std_rad)
            .map_err(|err| PbpError::InvalidConfig(format!("jitter deviation: {}", err)))?;

        let n = self.config.num_particles;
        let keep_best = self.config.elitism;
        let idx = match self.config.resample {
            ResampleScheme::Multinomial => {
                sampler::importance_sample(&self.weights, n, keep_best, &mut self.rng)?
            }
            ResampleScheme::LowVariance => {
                sampler::low_variance_sample(&self.weights, n, keep_best, &mut self.rng)?
            }
        };

        let mut next: Vec<SpiderPose> = idx.iter().map(|&i| self.particles[i]).collect();
        for pose in next.iter_mut().skip(usize::from(keep_best)) {
            pose.center[0] += pos.sample(&mut self.rng);
            pose.center[1] += pos.sample(&mut self.rng);
            for i in 0..4 {
                pose.inner_angles[i] += ang.sample(&mut self.rng);
                pose.outer_bends[i] += ang.sample(&mut self.rng);
            }
        }
        self.install(next, image);
        Ok(())
    }

    /// Index of the highest-weight particle.
    pub fn best_index(&self) -> Result<usize> {
        sampler::argmax(&self.weights).ok_or(PbpError::NotInitialized)
    }

    pub fn best_pose(&self) -> Result<&SpiderPose> {
        Ok(&self.particles[self.best_index()?])
    }

    /// Part states of the best particle.
    pub fn estimate(&self) -> Result<SpiderEstimate> {
        let pose = self.best_pose()?;
        SpiderEstimate::from_states(&pose.part_states(&self.config.geometry))
    }

    pub fn effective_sample_size(&self) -> f64 {
        sampler::effective_sample_size(&self.weights)
    }
}

/// Initialize `filter` and run `params.iterations` steps on `image`.
///
/// `params.jitter_last` has no effect: every step jitters before it
/// reweights, so the estimate always reads scored particles.
pub fn run_joint_filter(
    filter: &mut JointParticleFilter,
    image: &LabelImage,
    params: &RunParams,
) -> Result<InferenceReport> {
    let total = Instant::now();
    match params.init {
        InitMode::Random => filter.init_random(image)?,
        InitMode::Observation => filter.init_from_observation(image)?,
    }

    let mut iterations = Vec::with_capacity(params.iterations);
    for k in 0..params.iterations {
        let t0 = Instant::now();
        filter.step(image)?;
        let ess = filter.effective_sample_size();
        let summary = IterationSummary {
            iteration: k,
            elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
            min_ess: ess,
            mean_ess: ess,
            max_weight_root: filter.weights().iter().copied().fold(0.0, f64::max),
        };
        tracing::debug!(
            iteration = k,
            elapsed_ms = summary.elapsed_ms,
            ess,
            best_score = filter.scores()[filter.best_index()?],
            "joint filter step complete"
        );
        iterations.push(summary);
    }

    let estimate = filter.estimate()?;
    let total_ms = total.elapsed().as_secs_f64() * 1000.0;
    tracing::info!(
        iterations = params.iterations,
        total_ms,
        root_x = estimate.root.x,
        root_y = estimate.root.y,
        "joint filter finished"
    );
    Ok(InferenceReport {
        iterations,
        estimate,
        total_ms,
    })
}
