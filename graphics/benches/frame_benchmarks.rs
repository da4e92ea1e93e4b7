//! Benchmarks for the per-frame orchestration core.
//!
//! Run with: `cargo bench -p rtframe-graphics`

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use rtframe_core::math::{DVec3, Mat4};
use rtframe_core::scene::{Instance, Material, Scene, generators};
use rtframe_graphics::types::{TextureDescriptor, TextureUsage};
use rtframe_graphics::{
    CameraState, DummyBackend, Extent2d, FrameScheduler, NullDenoiser, RenderParams,
    RenderSettings, RendererConfig, ResourceRegistry, TextureFormat, TransitionRequest,
    TransitionTracker,
};

// ---------------------------------------------------------------------------
// Transition tracking
// ---------------------------------------------------------------------------

fn bench_build_barriers(c: &mut Criterion) {
    let mut registry = ResourceRegistry::new(Arc::new(DummyBackend::new()));
    let images: Vec<_> = (0..24)
        .map(|i| {
            registry
                .create_image(
                    TextureDescriptor::new_2d(
                        Extent2d::new(256, 256),
                        TextureFormat::Rgba16Float,
                        TextureUsage::SHADER_RESOURCE | TextureUsage::STORAGE,
                    )
                    .with_label(format!("bench_{i}")),
                )
                .unwrap()
        })
        .collect();

    let writes: Vec<_> = images.iter().map(|&i| TransitionRequest::storage(i)).collect();
    let reads: Vec<_> = images.iter().map(|&i| TransitionRequest::read(i)).collect();

    c.bench_function("build_barriers_24_images_alternating", |b| {
        let mut tracker = TransitionTracker::new();
        b.iter(|| {
            black_box(tracker.build_barriers(&writes, 32).unwrap());
            black_box(tracker.build_barriers(&reads, 32).unwrap());
        });
    });

    c.bench_function("build_barriers_24_images_unchanged", |b| {
        let mut tracker = TransitionTracker::new();
        tracker.build_barriers(&reads, 32).unwrap();
        b.iter(|| {
            black_box(tracker.build_barriers(&reads, 32).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Whole frames
// ---------------------------------------------------------------------------

fn bench_scene(static_instances: usize) -> Scene {
    let mut scene = Scene::new();
    let cube = generators::add_cube(&mut scene, 0.5);
    let material = scene.add_material(Material::DEFAULT);
    scene.add_instance(Instance::new(cube, material, DVec3::zeros(), Mat4::identity()));
    scene.template_instance_count = 1;
    for i in 0..static_instances {
        let position = DVec3::new((i % 32) as f64 * 2.0, (i / 32) as f64 * 2.0, 0.0);
        scene.add_instance(Instance::new(cube, material, position, Mat4::identity()));
    }
    scene
}

fn bench_render_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame");

    for &(static_instances, animated) in &[(16usize, 0u32), (800, 512)] {
        let mut scene = bench_scene(static_instances);
        let mut scheduler = FrameScheduler::new(
            Arc::new(DummyBackend::new()),
            RendererConfig::new()
                .with_output_resolution(320, 180)
                .with_animated_pool_size(512),
            &mut scene,
            Box::new(NullDenoiser::new()),
            None,
        )
        .unwrap();

        let mut settings = RenderSettings::default();
        settings.animated_objects = animated > 0;
        settings.animated_object_count = animated;
        settings.pause_animation = false;
        let params = RenderParams::new(settings, CameraState::default());

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{static_instances}_static_{animated}_animated")),
            &params,
            |b, params| {
                b.iter(|| black_box(scheduler.render_frame(&mut scene, params).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build_barriers, bench_render_frame);
criterion_main!(benches);
