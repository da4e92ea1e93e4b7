//! Common utilities for frame integration tests.
//!
//! Every test runs the real scheduler against the recording dummy backend,
//! either with an instantly completing GPU or a "slow" GPU whose fences are
//! only signalled when the test says so.

use std::sync::Arc;

use rtframe_core::math::{DVec3, Mat4};
use rtframe_core::scene::{AlphaMode, Instance, Material, Scene, generators};
use rtframe_graphics::backend::{Command, SubmissionRecord};
use rtframe_graphics::{
    CameraState, CompletionMode, DeviceCapabilities, DummyBackend, FrameReport, FrameScheduler,
    NullDenoiser, RenderParams, RenderSettings, RendererConfig,
};

// ============================================================================
// Logging
// ============================================================================

/// Route scheduler logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();
}

// ============================================================================
// GPU Timing
// ============================================================================

/// How the simulated GPU retires work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpu {
    /// Fences signal at submit time.
    Fast,
    /// Fences signal only when completed explicitly or waited on.
    Slow,
}

impl Gpu {
    pub fn backend(self) -> Arc<DummyBackend> {
        let mode = match self {
            Gpu::Fast => CompletionMode::Immediate,
            Gpu::Slow => CompletionMode::Manual,
        };
        Arc::new(DummyBackend::with_config(DeviceCapabilities::default(), mode))
    }
}

// ============================================================================
// Scenes
// ============================================================================

/// Shape of a generated scene.
#[derive(Debug, Clone, Copy)]
pub struct SceneSpec {
    pub templates: usize,
    pub opaque: usize,
    pub transparent: usize,
    pub emissive: usize,
    pub off: usize,
}

impl SceneSpec {
    pub fn small() -> Self {
        Self {
            templates: 2,
            opaque: 6,
            transparent: 1,
            emissive: 1,
            off: 1,
        }
    }

    pub fn opaque(count: usize) -> Self {
        Self {
            templates: 1,
            opaque: count,
            transparent: 0,
            emissive: 0,
            off: 0,
        }
    }

    /// Instances that can ever be visible, excluding the animated pool.
    pub fn visible_static(&self) -> usize {
        self.opaque + self.transparent + self.emissive
    }
}

/// Build a scene: templates first, then static instances on a grid.
pub fn build_scene(spec: SceneSpec) -> Scene {
    let mut scene = Scene::new();
    let cube = generators::add_cube(&mut scene, 0.5);
    let quad = generators::add_quad(&mut scene, 1.0);
    let opaque = scene.add_material(Material::DEFAULT);
    let glass = scene.add_material(Material::DEFAULT.with_alpha_mode(AlphaMode::Transparent));
    let lamp = scene.add_material(Material::DEFAULT.with_emission(true));
    let off = scene.add_material(Material::DEFAULT.with_alpha_mode(AlphaMode::Off));

    for i in 0..spec.templates {
        let mesh = if i % 2 == 0 { cube } else { quad };
        scene.add_instance(Instance::new(mesh, opaque, DVec3::zeros(), Mat4::identity()));
    }
    scene.template_instance_count = spec.templates;

    let materials = std::iter::repeat_n(opaque, spec.opaque)
        .chain(std::iter::repeat_n(glass, spec.transparent))
        .chain(std::iter::repeat_n(lamp, spec.emissive))
        .chain(std::iter::repeat_n(off, spec.off));
    for (i, material) in materials.enumerate() {
        let position = DVec3::new((i % 32) as f64 * 2.0, (i / 32) as f64 * 2.0, 0.0);
        scene.add_instance(Instance::new(cube, material, position, Mat4::identity()));
    }
    scene
}

// ============================================================================
// Test Context
// ============================================================================

/// A scheduler, its scene and the backend it records into.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub scene: Scene,
    pub scheduler: FrameScheduler,
}

impl TestContext {
    pub fn new(gpu: Gpu, config: RendererConfig, spec: SceneSpec) -> Self {
        init_logging();
        let backend = gpu.backend();
        let mut scene = build_scene(spec);
        let scheduler = FrameScheduler::new(
            backend.clone(),
            config,
            &mut scene,
            Box::new(NullDenoiser::new()),
            None,
        )
        .expect("scheduler initialization");
        backend.clear_submissions();
        Self {
            backend,
            scene,
            scheduler,
        }
    }

    /// Small output and pool, suitable for most tests.
    pub fn small(gpu: Gpu, frames_in_flight: usize) -> Self {
        Self::new(
            gpu,
            RendererConfig::new()
                .with_frames_in_flight(frames_in_flight)
                .with_output_resolution(128, 64)
                .with_animated_pool_size(16),
            SceneSpec::small(),
        )
    }

    pub fn render(&mut self, params: &RenderParams) -> FrameReport {
        self.scheduler
            .render_frame(&mut self.scene, params)
            .expect("frame")
    }
}

/// Default per-frame parameters.
pub fn default_params() -> RenderParams {
    RenderParams::new(RenderSettings::default(), CameraState::default())
}

/// Parameters with the animated pool visible.
pub fn animated_params(count: u32) -> RenderParams {
    let mut params = default_params();
    params.settings.animated_objects = true;
    params.settings.animated_object_count = count;
    params
}

// ============================================================================
// Command Inspection
// ============================================================================

/// Names of the opened annotations, in recording order.
pub fn annotations(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::BeginAnnotation(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Image and buffer transitions recorded in one submission.
pub fn barrier_count(record: &SubmissionRecord) -> usize {
    record
        .commands
        .iter()
        .map(|c| match c {
            Command::Barrier { images, buffers } => images.len() + buffers.len(),
            _ => 0,
        })
        .sum()
}
