use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spiderpose::synth::{generate_scene, Scene, SceneParams};
use spiderpose::{
    unary_batch, EdgeKind, GraphConfig, JointParticleFilter, PairwiseModel, Shape,
    SpiderFootprint, SpiderGeometry, SpiderGraph,
};

fn scene() -> Scene {
    generate_scene(&SceneParams {
        image_size: [640, 480],
        distractor_rects: 10,
        distractor_circles: 5,
        seed: 1,
        ..Default::default()
    })
    .expect("fixed scene parameters are valid")
}

fn random_states(rng: &mut StdRng, n: usize, dim: usize, size: [u32; 2]) -> DMatrix<f64> {
    DMatrix::from_fn(n, dim, |_, d| match d {
        0 => rng.gen_range(0.0..size[0] as f64),
        1 => rng.gen_range(0.0..size[1] as f64),
        _ => rng.gen_range(0.0..std::f64::consts::PI),
    })
}

fn bench_unary(c: &mut Criterion) {
    let scene = scene();
    let size = scene.image.size();
    let geometry = SpiderGeometry::default();
    let mut rng = StdRng::seed_from_u64(42);
    let root = Shape::root(&geometry).template();
    let limb = Shape::limb(&geometry).template();
    let roots = random_states(&mut rng, 200, 2, size);
    let limbs = random_states(&mut rng, 200, 3, size);

    c.bench_function("unary_batch_circle_200", |b| {
        b.iter(|| black_box(unary_batch(&root, black_box(&roots), &scene.image, 1)))
    });
    c.bench_function("unary_batch_rect_200", |b| {
        b.iter(|| black_box(unary_batch(&limb, black_box(&limbs), &scene.image, 2)))
    });
}

fn bench_pairwise(c: &mut Criterion) {
    let geometry = SpiderGeometry::default();
    let model = PairwiseModel::new(&geometry, Default::default());
    let mut rng = StdRng::seed_from_u64(7);
    let inner = random_states(&mut rng, 200, 3, [640, 480]);
    let outer = random_states(&mut rng, 200, 3, [640, 480]);

    c.bench_function("pairwise_matrix_200x200", |b| {
        b.iter(|| black_box(model.edge_matrix(EdgeKind::OuterToInner, black_box(&inner), &outer)))
    });
}

fn bench_message_sweep(c: &mut Criterion) {
    let scene = scene();
    let config = GraphConfig::new(100, scene.image.size());
    let mut graph = SpiderGraph::new(config).expect("default config is valid");
    graph
        .init_from_observation(&scene.image)
        .expect("scene carries every tag");

    c.bench_function("step_n100", |b| {
        b.iter(|| {
            graph.step(&scene.image).expect("phase cycle is complete");
        })
    });
}

fn bench_joint_filter(c: &mut Criterion) {
    let scene = scene();
    let footprint = SpiderFootprint::new(&scene.truth.geometry);
    c.bench_function("joint_score_single_pose", |b| {
        b.iter(|| black_box(footprint.score(black_box(&scene.truth.pose), &scene.image)))
    });

    let config = GraphConfig::new(100, scene.image.size());
    let mut filter = JointParticleFilter::new(config).expect("default config is valid");
    filter
        .init_from_observation(&scene.image)
        .expect("scene carries the root tag");
    c.bench_function("joint_filter_step_n100", |b| {
        b.iter(|| {
            filter.step(&scene.image).expect("filter is initialized");
        })
    });
}

criterion_group!(
    hotpaths,
    bench_unary,
    bench_pairwise,
    bench_message_sweep,
    bench_joint_filter
);
criterion_main!(hotpaths);
