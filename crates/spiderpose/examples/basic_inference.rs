use spiderpose::synth::{generate_scene, pose_error, SceneParams};
use spiderpose::{run_inference, GraphConfig, LabelImage, RunParams, SpiderGraph};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();

    // With a path, infer on that label image; otherwise on a synthetic scene.
    let (image, truth) = match args.get(1) {
        Some(path) => {
            let gray = image::open(Path::new(path))?.to_luma8();
            (LabelImage::from_gray(gray), None)
        }
        None => {
            let scene = generate_scene(&SceneParams {
                distractor_rects: 8,
                distractor_circles: 4,
                seed: 7,
                ..Default::default()
            })?;
            (scene.image, Some(scene.truth))
        }
    };

    let config = GraphConfig::new(100, image.size());
    let mut graph = SpiderGraph::new(config)?;
    let report = run_inference(&mut graph, &image, &RunParams::default())?;

    let root = report.estimate.root;
    println!(
        "Root at ({:.1}, {:.1}) after {} iterations in {:.1} ms.",
        root.x,
        root.y,
        report.iterations.len(),
        report.total_ms
    );
    if let Some(truth) = truth {
        let err = pose_error(&report.estimate, &truth)?;
        println!(
            "Root error {:.2}px, mean limb error {:.2}px.",
            err.root_px, err.mean_limb_px
        );
    }

    if let Some(out_path) = args.get(2) {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(out_path, json)?;
        println!("Wrote {out_path}");
    }
    Ok(())
}
