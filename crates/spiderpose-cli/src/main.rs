//! spiderpose CLI: synthetic scenes and spider pose inference on label images.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use spiderpose::synth::{self, GroundTruth, PoseError, SceneParams};
use spiderpose::{
    run_inference, run_joint_filter, Algorithm, GraphConfig, InferenceReport, InitMode,
    JointParticleFilter, LabelImage, RunParams, SpiderGraph, Topology,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "spiderpose")]
#[command(about = "Infer articulated spider poses from label images with particle belief propagation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a synthetic spider label image.
    Simulate(CliSimulateArgs),

    /// Run inference on a label image.
    Infer(CliInferArgs),

    /// Print the part table and edge kinds.
    Topology,
}

#[derive(Debug, Clone, Args)]
struct CliSimulateArgs {
    /// Path to write the label image (PNG).
    #[arg(long)]
    out: PathBuf,

    /// Path to write the ground truth (JSON).
    #[arg(long)]
    truth: Option<PathBuf>,

    #[arg(long, default_value = "640")]
    width: u32,

    #[arg(long, default_value = "480")]
    height: u32,

    /// Random seed for pose and distractors.
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Draw a random pose instead of the centered one.
    #[arg(long)]
    random_pose: bool,

    /// Number of randomly tagged distractor rectangles.
    #[arg(long, default_value = "0")]
    distractor_rects: usize,

    /// Number of randomly tagged distractor circles.
    #[arg(long, default_value = "0")]
    distractor_circles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InitArg {
    Random,
    Observation,
}

impl InitArg {
    fn to_core(self) -> InitMode {
        match self {
            Self::Random => InitMode::Random,
            Self::Observation => InitMode::Observation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    /// Particle belief propagation over the part graph.
    Pbp,
    /// Whole-spider particle filter.
    Pf,
}

impl MethodArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pbp => "pbp",
            Self::Pf => "pf",
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliInferArgs {
    /// Path to the input label image (8-bit, pixel value = part tag).
    #[arg(long)]
    image: PathBuf,

    /// Path to write the inference report (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Optional JSON config overlay; command-line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Particles per node.
    #[arg(long)]
    particles: Option<usize>,

    /// Inference method.
    #[arg(long, value_enum, default_value_t = MethodArg::Pbp)]
    method: MethodArg,

    /// Number of iterations.
    #[arg(long, default_value = "5")]
    iterations: usize,

    /// Message reduction: sum-product or max-product.
    #[arg(long)]
    algorithm: Option<String>,

    /// Disable keeping the best particle through resampling.
    #[arg(long)]
    no_elitism: bool,

    /// Particle seeding strategy.
    #[arg(long, value_enum, default_value_t = InitArg::Observation)]
    init: InitArg,

    /// Random seed of the graph.
    #[arg(long)]
    seed: Option<u64>,

    /// Jitter after the final resample as well.
    #[arg(long)]
    jitter_last: bool,

    /// Ground truth (JSON from `simulate --truth`) to score the estimate against.
    #[arg(long)]
    truth: Option<PathBuf>,
}

impl CliInferArgs {
    fn build_config(&self, image_size: [u32; 2]) -> CliResult<GraphConfig> {
        let mut config = match &self.config {
            Some(path) => GraphConfig::from_json_file(path)?,
            None => GraphConfig::default(),
        };
        config.image_size = image_size;
        if let Some(n) = self.particles {
            config.num_particles = n;
        }
        if let Some(name) = &self.algorithm {
            config.algorithm = name.parse::<Algorithm>()?;
        }
        if self.no_elitism {
            config.elitism = false;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(serde::Serialize)]
struct InferOutput<'a> {
    image: String,
    method: &'static str,
    config: &'a GraphConfig,
    #[serde(flatten)]
    report: &'a InferenceReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pose_error: Option<PoseError>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Infer(args) => run_infer(&args),
        Commands::Topology => run_topology(),
    }
}

fn load_labels(path: &Path) -> CliResult<LabelImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(LabelImage::from_gray(img.to_luma8()))
}

// ── simulate ───────────────────────────────────────────────────────────

fn run_simulate(args: &CliSimulateArgs) -> CliResult<()> {
    let params = SceneParams {
        image_size: [args.width, args.height],
        distractor_rects: args.distractor_rects,
        distractor_circles: args.distractor_circles,
        random_pose: args.random_pose,
        seed: args.seed,
        ..Default::default()
    };
    let scene = synth::generate_scene(&params)?;
    scene.image.as_gray().save(&args.out)?;
    tracing::info!(
        "Scene {}x{} written to {} (center {:.1}, {:.1})",
        args.width,
        args.height,
        args.out.display(),
        scene.truth.pose.center[0],
        scene.truth.pose.center[1],
    );

    if let Some(path) = &args.truth {
        let json = serde_json::to_string_pretty(&scene.truth)?;
        std::fs::write(path, &json)?;
        tracing::info!("Ground truth written to {}", path.display());
    }
    Ok(())
}

// ── infer ──────────────────────────────────────────────────────────────

fn run_infer(args: &CliInferArgs) -> CliResult<()> {
    tracing::info!("Loading label image: {}", args.image.display());
    let image = load_labels(&args.image)?;
    let [w, h] = image.size();
    tracing::info!("Image size: {}x{}", w, h);

    let config = args.build_config([w, h])?;
    let params = RunParams {
        iterations: args.iterations,
        init: args.init.to_core(),
        jitter_last: args.jitter_last,
    };
    tracing::info!("Method: {}", args.method.as_str());
    let report = match args.method {
        MethodArg::Pbp => {
            let mut graph = SpiderGraph::new(config.clone())?;
            run_inference(&mut graph, &image, &params)?
        }
        MethodArg::Pf => {
            let mut filter = JointParticleFilter::new(config.clone())?;
            run_joint_filter(&mut filter, &image, &params)?
        }
    };

    let pose_error = match &args.truth {
        Some(path) => {
            let truth: GroundTruth = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            let err = synth::pose_error(&report.estimate, &truth)?;
            tracing::info!(
                "Root error {:.2}px, mean limb error {:.2}px",
                err.root_px,
                err.mean_limb_px
            );
            Some(err)
        }
        None => None,
    };

    let output = InferOutput {
        image: args.image.display().to_string(),
        method: args.method.as_str(),
        config: &config,
        report: &report,
        pose_error,
    };
    let json = serde_json::to_string_pretty(&output)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

// ── topology ───────────────────────────────────────────────────────────

fn run_topology() -> CliResult<()> {
    let topology = Topology::spider();

    println!("spiderpose topology");
    println!("  {:>4}  {:>3}  {:<9}  {:<5}  parent", "node", "tag", "shape", "layer");
    for part in topology.parts() {
        let parent = part
            .parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>4}  {:>3}  {:<9}  {:<5}  {}",
            part.id,
            part.tag,
            format!("{:?}", part.kind),
            format!("{:?}", part.layer),
            parent
        );
    }

    println!("directed edges (source -> target):");
    for target in 0..topology.len() {
        for &source in topology.neighbors(target) {
            if let Some(kind) = topology.edge_kind(source, target) {
                println!("  {} -> {}  {:?}", source, target, kind);
            }
        }
    }
    Ok(())
}
