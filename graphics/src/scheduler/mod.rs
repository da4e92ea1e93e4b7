//! Per-frame orchestration of the ray-traced pipeline.
//!
//! [`FrameScheduler`] records one frame as a fixed sequence of stages onto
//! the three command streams of a ring-buffer slot:
//!
//! | Stream | Stages |
//! |--------|--------|
//! | `main` | BRDF pre-integration (first frame), TLAS rebuild, ray tracing |
//! | `denoise` | external denoiser |
//! | `compose` | composition, upscaling / TAA, copy to back buffer, UI |
//!
//! # Frame State Machine
//!
//! ```text
//! Acquire → UpdateConstants → RebuildAccelerationStructures → RayTrace
//!         → Denoise → Compose → Upscale → CopyToPresentationTarget
//!         → RenderUi → Submit → Present
//! ```
//!
//! Stages run strictly in this order. Every pass declares the image states
//! it needs; the [`TransitionTracker`] turns them into the minimal barrier
//! batch for that pass.
//!
//! # Module Contents
//!
//! - [`FrameScheduler`] - owns every GPU object of the renderer
//! - [`GlobalConstants`] - the per-frame constant block
//! - [`reset_factor`] / [`HistoryAccumulation`] - temporal history reset
//! - [`UpscaleStage`] - the upscaling strategy chosen at startup
//! - [`Semaphore`] / [`Fence`] - synchronization primitives

mod constants;
mod history;
mod passes;
mod resolution;
mod sync;
mod upscale;

pub use constants::{ConstantInputs, GlobalConstants, hit_distance_params};
pub use history::{HistoryAccumulation, HistoryInputs, HistoryResetThresholds, reset_factor};
pub use passes::{
    Pass, PassProgram, PassPrograms, RAYGEN_VARIANTS, TILE_SIZE, composition_requests,
    ray_tracing_requests, raygen_variant,
};
pub use resolution::{MIN_DYNAMIC_SCALE, ResolutionState, adapt_resolution_scale, rect_size};
pub use sync::{Fence, FenceStatus, Semaphore};
pub use upscale::{ExternalUpscaleStage, TemporalUpsampleStage, UpscaleContext, UpscaleStage};

use std::sync::Arc;
use std::time::{Duration, Instant};

use rtframe_core::scene::{AnimatedPool, Scene};
use rtframe_core::{profile_function, profile_scope};

use crate::accel::{AccelerationStructureBuilder, TlasCounts, TopLevelParams};
use crate::backend::{CommandStream, GraphicsBackend};
use crate::denoiser::{
    CommonSettings, Denoiser, DenoiserResourceTable, methods_for, reblur_settings, relax_settings,
};
use crate::error::{GraphicsError, GraphicsResult};
use crate::params::{CameraState, DenoiserKind, RenderParams, RendererConfig};
use crate::pipeline::{FrameContext, FrameRingBuffer};
use crate::resources::{ImageId, RenderTarget, RenderTargets, ResourceRegistry};
use crate::transition::{
    BufferTransitionRequest, MAX_TRANSITIONS_PER_PASS, TransitionRequest, TransitionTracker,
    record_transitions, resolve_image_barriers,
};
use crate::types::{AccessBits, Extent2d, ImageLayout, ResourceState, TextureDescriptor, TextureUsage};
use crate::upscaler::{Upscaler, min_resolution_scale};

use passes::begin_pass;

/// One step of the frame state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameStage {
    Acquire,
    UpdateConstants,
    RebuildAccelerationStructures,
    RayTrace,
    Denoise,
    Compose,
    Upscale,
    CopyToPresentationTarget,
    RenderUi,
    Submit,
    Present,
}

impl FrameStage {
    pub const ALL: [FrameStage; 11] = [
        Self::Acquire,
        Self::UpdateConstants,
        Self::RebuildAccelerationStructures,
        Self::RayTrace,
        Self::Denoise,
        Self::Compose,
        Self::Upscale,
        Self::CopyToPresentationTarget,
        Self::RenderUi,
        Self::Submit,
        Self::Present,
    ];
}

/// Enforces strictly increasing stage order within one frame.
#[derive(Debug, Default)]
struct StageTracker {
    completed: Vec<FrameStage>,
}

impl StageTracker {
    fn begin_frame(&mut self) {
        self.completed.clear();
    }

    fn enter(&mut self, stage: FrameStage) -> GraphicsResult<()> {
        if let Some(&last) = self.completed.last()
            && stage <= last
        {
            return Err(GraphicsError::Internal(format!(
                "frame stage {stage:?} entered after {last:?}"
            )));
        }
        log::trace!("Stage {:?}", stage);
        self.completed.push(stage);
        Ok(())
    }
}

/// What happened while rendering one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub slot: usize,
    pub swapchain_image: u32,
    pub tlas: TlasCounts,
    pub history: HistoryAccumulation,
    /// Rendered region of the render targets.
    pub rect: Extent2d,
    pub resolution_scale: f32,
    /// Barriers recorded across all passes.
    pub barriers: usize,
    /// Image copied to the back buffer.
    pub final_image: ImageId,
    /// Stages in the order they ran.
    pub stages: Vec<FrameStage>,
}

/// State carried from the previous frame.
#[derive(Debug, Clone, Copy)]
struct PreviousFrame {
    camera: CameraState,
    history: HistoryInputs,
}

/// Owner of every GPU object of the renderer and driver of the frame loop.
///
/// # Thread Safety
///
/// `FrameScheduler` is driven from a single thread. The only blocking point
/// is the ring-buffer fence wait when a slot is reused.
pub struct FrameScheduler {
    backend: Arc<dyn GraphicsBackend>,
    config: RendererConfig,
    registry: ResourceRegistry,
    tracker: TransitionTracker,
    targets: RenderTargets,
    programs: PassPrograms,
    swapchain: Vec<ImageId>,
    accel: AccelerationStructureBuilder,
    pool: AnimatedPool,
    ring: FrameRingBuffer,
    denoiser: Box<dyn Denoiser>,
    denoiser_kind: DenoiserKind,
    upscale: Box<dyn UpscaleStage>,
    resolution: ResolutionState,
    stages: StageTracker,
    previous: Option<PreviousFrame>,
    has_transparent: bool,
    scene_radius: f32,
    frame_index: u64,
    last_frame_end: Option<Instant>,
    shut_down: bool,
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("backend", &self.backend.name())
            .field("frame_index", &self.frame_index)
            .field("frames_in_flight", &self.ring.frames_in_flight())
            .field("denoiser", &self.denoiser.name())
            .field("upscale", &self.upscale.name())
            .field("resolution", &self.resolution)
            .finish()
    }
}

/// Pick the upscale stage and the render ("screen") resolution.
///
/// An engine that cannot serve the requested mode is shut down and the
/// temporal path renders at native resolution.
fn select_upscale_stage(
    upscaler: Option<Box<dyn Upscaler>>,
    config: &RendererConfig,
) -> GraphicsResult<(Box<dyn UpscaleStage>, ResolutionState)> {
    let output = config.output_resolution;
    let native = || {
        (
            Box::new(TemporalUpsampleStage::new()) as Box<dyn UpscaleStage>,
            ResolutionState::new(output, output, MIN_DYNAMIC_SCALE),
        )
    };

    let (Some(mut upscaler), Some(quality)) = (upscaler, config.upscaler_quality) else {
        return Ok(native());
    };

    upscaler.initialize()?;
    match upscaler.optimal_settings(output, quality) {
        Some(settings) => {
            let min_scale = min_resolution_scale(&settings);
            log::info!(
                "{}: {:?}, render {}x{} -> output {}x{}, min scale {:.2}",
                upscaler.name(),
                quality,
                settings.render_resolution.width,
                settings.render_resolution.height,
                output.width,
                output.height,
                min_scale
            );
            Ok((
                Box::new(ExternalUpscaleStage::new(upscaler)),
                ResolutionState::new(output, settings.render_resolution, min_scale),
            ))
        }
        None => {
            log::warn!(
                "{}: unsupported mode {:?} at {}x{}, falling back to native resolution",
                upscaler.name(),
                quality,
                output.width,
                output.height
            );
            upscaler.shutdown();
            Ok(native())
        }
    }
}

fn device_lost(context: &str, err: GraphicsError) -> GraphicsError {
    log::error!("{context} failed: {err}");
    GraphicsError::DeviceLost
}

/// First-frame BRDF pre-integration.
fn integrate_brdf(
    registry: &ResourceRegistry,
    tracker: &mut TransitionTracker,
    programs: &PassPrograms,
    targets: &RenderTargets,
    stream: &mut CommandStream,
) -> GraphicsResult<usize> {
    let lut = targets[RenderTarget::IntegrateBrdf];
    stream.begin_annotation(Pass::IntegrateBrdf.label());
    programs.dispatch(
        registry,
        stream,
        Pass::IntegrateBrdf,
        registry.image(lut)?.descriptor.size,
    )?;
    let count = record_transitions(stream, tracker, registry, &[TransitionRequest::read(lut)], &[])?;
    stream.end_annotation();
    Ok(count)
}

/// Copy `final_image` into the back buffer.
///
/// The back buffer's previous contents are discarded, so its barrier is
/// recorded regardless of the tracked state.
fn copy_to_back_buffer(
    registry: &ResourceRegistry,
    tracker: &mut TransitionTracker,
    stream: &mut CommandStream,
    final_image: ImageId,
    back_buffer: ImageId,
) -> GraphicsResult<usize> {
    let mut barriers = tracker.build_barriers(
        &[TransitionRequest::new(
            final_image,
            AccessBits::COPY_SOURCE,
            ImageLayout::General,
        )],
        MAX_TRANSITIONS_PER_PASS - 1,
    )?;
    barriers.push(tracker.transition_unconditionally(
        back_buffer,
        ResourceState::new(AccessBits::COPY_DESTINATION, ImageLayout::General),
    ));
    let count = barriers.len();
    stream.barrier(resolve_image_barriers(registry, &barriers)?, Vec::new());

    stream.copy_image(registry.image(final_image)?.handle, registry.image(back_buffer)?.handle);
    Ok(count)
}

fn missing_slot(slot: usize) -> GraphicsError {
    GraphicsError::Internal(format!("frame slot {slot} missing"))
}

impl FrameScheduler {
    /// Create every GPU object of the renderer.
    ///
    /// Appends the animated pool to `scene`, builds every BLAS, allocates
    /// render targets and initializes the external engines. Any failure is
    /// fatal.
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        config: RendererConfig,
        scene: &mut Scene,
        mut denoiser: Box<dyn Denoiser>,
        upscaler: Option<Box<dyn Upscaler>>,
    ) -> GraphicsResult<Self> {
        profile_function!();
        config.validate()?;

        let capabilities = backend.capabilities();
        if !capabilities.ray_tracing {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{} has no ray tracing support",
                backend.name()
            )));
        }
        log::info!(
            "Initializing frame scheduler on {} ({} frames in flight)",
            backend.name(),
            config.frames_in_flight
        );

        let (upscale, resolution) = select_upscale_stage(upscaler, &config)?;

        let mut registry = ResourceRegistry::new(backend.clone());
        let mut tracker = TransitionTracker::new();

        let targets = RenderTargets::create(
            &mut registry,
            &mut tracker,
            resolution.screen,
            resolution.output,
            config.output_format,
            capabilities.swapchain_format,
        )?;
        let programs = PassPrograms::create(&mut registry)?;

        let swapchain = backend
            .swapchain_images()
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                registry.import_image(
                    handle,
                    TextureDescriptor::new_2d(
                        resolution.output,
                        capabilities.swapchain_format,
                        TextureUsage::COPY_DST | TextureUsage::COLOR_ATTACHMENT,
                    )
                    .with_label(format!("BackBuffer{index}")),
                )
            })
            .collect::<Vec<_>>();
        if swapchain.is_empty() {
            return Err(GraphicsError::InitializationFailed("swapchain has no images".into()));
        }

        let scene_radius = scene.bounds().radius();
        let pool = AnimatedPool::setup(scene, config.animated_pool_size);
        let accel = AccelerationStructureBuilder::new(
            &mut registry,
            &mut tracker,
            scene,
            config.frames_in_flight,
        )?;
        let ring = FrameRingBuffer::new(
            &mut registry,
            config.frames_in_flight,
            std::mem::size_of::<GlobalConstants>() as u64,
        )?;

        denoiser.initialize(&methods_for(config.denoiser, resolution.screen))?;
        log::info!(
            "Denoiser {} ({}), upscale stage {}",
            denoiser.name(),
            config.denoiser.name(),
            upscale.name()
        );

        Ok(Self {
            backend,
            denoiser_kind: config.denoiser,
            config,
            registry,
            tracker,
            targets,
            programs,
            swapchain,
            accel,
            pool,
            ring,
            denoiser,
            upscale,
            resolution,
            stages: StageTracker::default(),
            previous: None,
            has_transparent: false,
            scene_radius,
            frame_index: 0,
            last_frame_end: None,
            shut_down: false,
        })
    }

    /// Record, submit and present one frame.
    pub fn render_frame(
        &mut self,
        scene: &mut Scene,
        params: &RenderParams,
    ) -> GraphicsResult<FrameReport> {
        profile_function!();
        if self.shut_down {
            return Err(GraphicsError::InvalidParameter("scheduler was shut down".into()));
        }

        let frame_index = self.frame_index;
        let settings = &params.settings;
        self.stages.begin_frame();

        if settings.limit_fps
            && let Some(min_fps) = self.config.min_fps
        {
            self.resolution.adapt(
                min_fps,
                params.timing.frame_time_ms,
                params.timing.smoothed_frame_time_ms,
            );
        }
        self.ensure_denoiser(settings.denoiser)?;

        // Acquire
        self.stages.enter(FrameStage::Acquire)?;
        let slot = self
            .ring
            .acquire_slot(frame_index)
            .map_err(|err| device_lost("Frame slot wait", err))?
            .slot();
        let swapchain_image = {
            let context = self.context(slot)?;
            self.backend
                .acquire_next_image(&context.acquire_semaphore)
                .map_err(|err| device_lost("Swapchain acquire", err.into()))?
        };
        let back_buffer = *self.swapchain.get(swapchain_image as usize).ok_or_else(|| {
            GraphicsError::Internal(format!("swapchain image {swapchain_image} out of range"))
        })?;

        // UpdateConstants
        self.stages.enter(FrameStage::UpdateConstants)?;
        let rect = self.resolution.rect();
        let camera_prev = self.previous.map_or(params.camera, |p| p.camera);
        let constants = GlobalConstants::new(
            params,
            &ConstantInputs {
                world_to_clip_prev: camera_prev.world_to_clip,
                output: self.resolution.output,
                screen: self.resolution.screen,
                rect,
                rect_prev: self.resolution.rect_prev,
                resolution_scale: self.resolution.scale,
                upscaler_active: self.upscale.is_external(),
                frame_index: frame_index as u32,
                has_transparent: self.has_transparent,
            },
        );
        self.ring
            .write_constants(&self.registry, slot, constants.as_bytes())?;
        self.resolution.rect_prev = rect;

        // RebuildAccelerationStructures
        self.stages.enter(FrameStage::RebuildAccelerationStructures)?;
        let mut barriers = 0;
        let animated_instances = if settings.animated_objects_visible(params.timing.timestamp_ms) {
            (settings.animated_object_count as usize).min(self.pool.len())
        } else {
            0
        };
        self.pool.animate(
            scene,
            animated_instances,
            params.timing.frame_time_ms * 0.001 * settings.animation_speed(),
            settings.animated_object_world_scale(),
        );

        let history_curr = HistoryInputs::new(settings, params.sun_elevation(), params.camera.ortho);
        let history_prev = self.previous.map_or(history_curr, |p| p.history);
        let history = HistoryAccumulation::new(
            reset_factor(&history_prev, &history_curr, params.force_history_reset),
            &settings.denoiser_tunables,
        );

        let common = self.common_settings(params, &camera_prev, rect, &history, frame_index);
        let context = self
            .ring
            .context_mut(slot)
            .ok_or_else(|| missing_slot(slot))?;
        let main = &mut context.main;
        if frame_index == 0 {
            barriers += integrate_brdf(
                &self.registry,
                &mut self.tracker,
                &self.programs,
                &self.targets,
                main,
            )?;
        }
        main.begin_annotation("TLAS");
        let tlas = self.accel.rebuild_top_level(
            &self.registry,
            &mut self.tracker,
            main,
            scene,
            &TopLevelParams {
                emission: settings.emission,
                emissive_objects: settings.emissive_objects,
                animated_instances,
            },
            &params.origin(),
            slot,
        )?;
        main.end_annotation();
        self.has_transparent = tlas.has_transparent;

        // RayTrace
        self.stages.enter(FrameStage::RayTrace)?;
        barriers += begin_pass(
            main,
            &mut self.tracker,
            &self.registry,
            Pass::RayTracing.label(),
            &ray_tracing_requests(&self.targets),
            &[BufferTransitionRequest::new(
                self.accel.instance_data(),
                AccessBits::SHADER_RESOURCE,
            )],
        )?;
        self.programs.dispatch_rays(
            &self.registry,
            main,
            raygen_variant(settings.rpp, settings.spec_second_bounce),
            rect,
        )?;
        main.end_annotation();

        // Denoise
        self.stages.enter(FrameStage::Denoise)?;
        let denoise = &mut context.denoise;
        denoise.begin_annotation("Denoising");
        let table = DenoiserResourceTable::new(&self.targets);
        barriers += record_transitions(
            denoise,
            &mut self.tracker,
            &self.registry,
            &table.transition_requests(),
            &[],
        )?;
        let method_settings = match settings.denoiser {
            DenoiserKind::Reblur => reblur_settings(settings, history.max_accumulated),
            DenoiserKind::Relax => relax_settings(
                settings,
                history.max_accumulated,
                history.max_fast_accumulated,
            ),
        };
        for method in &method_settings {
            self.denoiser.set_method_settings(method)?;
        }
        self.denoiser
            .denoise(frame_index as u32, denoise, &common, &table)?;
        denoise.end_annotation();

        // Compose
        self.stages.enter(FrameStage::Compose)?;
        let compose = &mut context.compose;
        barriers += begin_pass(
            compose,
            &mut self.tracker,
            &self.registry,
            Pass::Composition.label(),
            &composition_requests(&self.targets),
            &[],
        )?;
        self.programs
            .dispatch(&self.registry, compose, Pass::Composition, rect)?;
        compose.end_annotation();

        // Upscale
        self.stages.enter(FrameStage::Upscale)?;
        let jitter = if settings.taa {
            params.camera.viewport_jitter
        } else {
            [0.0; 2]
        };
        let final_image = {
            let mut upscale_context = UpscaleContext {
                registry: &self.registry,
                tracker: &mut self.tracker,
                targets: &self.targets,
                programs: &self.programs,
                resolution: &self.resolution,
                frame_index,
                jitter,
                reset: history.is_reset(),
            };
            self.upscale.record(&mut upscale_context, compose)?
        };

        // CopyToPresentationTarget
        self.stages.enter(FrameStage::CopyToPresentationTarget)?;
        barriers += copy_to_back_buffer(
            &self.registry,
            &mut self.tracker,
            compose,
            final_image,
            back_buffer,
        )?;

        // RenderUi
        self.stages.enter(FrameStage::RenderUi)?;
        barriers += record_transitions(
            compose,
            &mut self.tracker,
            &self.registry,
            &[TransitionRequest {
                image: back_buffer,
                state: ResourceState::COLOR_ATTACHMENT,
            }],
            &[],
        )?;
        compose.render_ui();
        barriers += record_transitions(
            compose,
            &mut self.tracker,
            &self.registry,
            &[TransitionRequest {
                image: back_buffer,
                state: ResourceState::PRESENT,
            }],
            &[],
        )?;

        // Submit
        self.stages.enter(FrameStage::Submit)?;
        {
            profile_scope!("submit");
            self.ring.submit(slot)?;
        }

        // Present
        self.stages.enter(FrameStage::Present)?;
        {
            let context = self.context(slot)?;
            self.backend
                .present(&context.release_semaphore, swapchain_image)
                .map_err(|err| device_lost("Present", err.into()))?;
        }
        rtframe_core::frame_mark!();

        self.limit_frame_rate(params);

        self.previous = Some(PreviousFrame {
            camera: params.camera,
            history: history_curr,
        });
        self.frame_index += 1;

        log::debug!(
            "Frame {frame_index}: slot {slot}, image {swapchain_image}, {} world / {} light instances, \
             {barriers} barriers, history factor {:.3}",
            tlas.world,
            tlas.light,
            history.factor
        );

        let report = FrameReport {
            frame_index,
            slot,
            swapchain_image,
            tlas,
            history,
            rect,
            resolution_scale: self.resolution.scale,
            barriers,
            final_image,
            stages: self.stages.completed.clone(),
        };
        crate::profiling::plot_frame(&report);
        Ok(report)
    }

    /// Wait for the GPU and release every resource.
    ///
    /// Further [`render_frame`](Self::render_frame) calls fail.
    pub fn shutdown(&mut self) -> GraphicsResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        log::info!("Shutting down frame scheduler after {} frames", self.frame_index);

        self.ring.wait_idle()?;
        self.backend.wait_idle()?;
        self.denoiser.destroy();
        self.upscale.shutdown();
        self.registry.destroy_all();
        Ok(())
    }

    /// Set the resolution scale, clamped to what the upscale stage accepts.
    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.resolution.set_scale(scale);
    }

    /// Index of the next frame to be rendered.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn resolution(&self) -> &ResolutionState {
        &self.resolution
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &TransitionTracker {
        &self.tracker
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn ring(&self) -> &FrameRingBuffer {
        &self.ring
    }

    pub fn acceleration_structures(&self) -> &AccelerationStructureBuilder {
        &self.accel
    }

    /// The upscale stage chosen at startup.
    pub fn upscale_stage(&self) -> &dyn UpscaleStage {
        self.upscale.as_ref()
    }

    pub fn denoiser_kind(&self) -> DenoiserKind {
        self.denoiser_kind
    }

    /// Swapchain images as registered with the tracker.
    pub fn swapchain_images(&self) -> &[ImageId] {
        &self.swapchain
    }

    fn context(&self, slot: usize) -> GraphicsResult<&FrameContext> {
        self.ring.context(slot).ok_or_else(|| missing_slot(slot))
    }

    /// Re-create the denoiser's methods when the engine kind changed.
    fn ensure_denoiser(&mut self, kind: DenoiserKind) -> GraphicsResult<()> {
        if kind == self.denoiser_kind {
            return Ok(());
        }
        log::info!(
            "Switching denoiser {} -> {}",
            self.denoiser_kind.name(),
            kind.name()
        );
        self.ring.wait_idle()?;
        self.denoiser.destroy();
        self.denoiser
            .initialize(&methods_for(kind, self.resolution.screen))?;
        self.denoiser_kind = kind;
        Ok(())
    }

    fn common_settings(
        &self,
        params: &RenderParams,
        camera_prev: &CameraState,
        rect: Extent2d,
        history: &HistoryAccumulation,
        frame_index: u64,
    ) -> CommonSettings {
        let settings = &params.settings;
        let camera = &params.camera;
        let motion_vector_scale = if settings.motion_vectors_in_world_space {
            [1.0, 1.0]
        } else {
            [1.0 / rect.width as f32, 1.0 / rect.height as f32]
        };
        let camera_jitter = if settings.taa {
            camera.viewport_jitter
        } else {
            [0.0; 2]
        };

        CommonSettings {
            view_to_clip: camera.view_to_clip,
            view_to_clip_prev: camera_prev.view_to_clip,
            world_to_view: camera.world_to_view,
            world_to_view_prev: camera_prev.world_to_view,
            motion_vector_scale,
            camera_jitter,
            resolution_scale: [self.resolution.scale; 2],
            meter_to_units: settings.meter_to_units,
            denoising_range: 4.0 * self.scene_radius / settings.meter_to_units,
            disocclusion_threshold: settings.denoiser_tunables.disocclusion_threshold * 0.01,
            split_screen: settings.separator,
            debug: settings.debug,
            frame_index: frame_index as u32,
            accumulation_mode: history.mode(),
            motion_vectors_in_world_space: settings.motion_vectors_in_world_space,
            radiance_multiplied_by_exposure: true,
        }
    }

    fn limit_frame_rate(&mut self, params: &RenderParams) {
        let settings = &params.settings;
        let max_fps = self.config.max_fps.unwrap_or(settings.max_fps);
        if settings.limit_fps
            && max_fps > 0.0
            && let Some(last) = self.last_frame_end
        {
            profile_scope!("fps_limit");
            let budget = Duration::from_secs_f64(1.0 / max_fps as f64);
            while last.elapsed() < budget {
                std::hint::spin_loop();
            }
        }
        self.last_frame_end = Some(Instant::now());
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("Frame scheduler shutdown failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, DummyBackend};
    use crate::denoiser::NullDenoiser;
    use crate::params::RenderSettings;
    use crate::upscaler::NullUpscaler;
    use rtframe_core::math::{DVec3, Mat4 as M};
    use rtframe_core::scene::{Instance, Material, generators};

    fn scene() -> Scene {
        let mut scene = Scene::new();
        let cube = generators::add_cube(&mut scene, 0.5);
        let material = scene.add_material(Material::DEFAULT);
        for i in 0..4 {
            scene.add_instance(Instance::new(
                cube,
                material,
                DVec3::new(i as f64 * 2.0, 5.0, 0.0),
                M::identity(),
            ));
        }
        scene
    }

    fn scheduler(backend: Arc<DummyBackend>, config: RendererConfig) -> (FrameScheduler, Scene) {
        let mut scene = scene();
        let scheduler = FrameScheduler::new(
            backend,
            config.with_output_resolution(64, 32).with_animated_pool_size(8),
            &mut scene,
            Box::new(NullDenoiser::new()),
            None,
        )
        .unwrap();
        (scheduler, scene)
    }

    fn params() -> RenderParams {
        RenderParams::new(RenderSettings::default(), CameraState::default())
    }

    #[test]
    fn test_stage_tracker_rejects_regression() {
        let mut tracker = StageTracker::default();
        tracker.enter(FrameStage::Acquire).unwrap();
        tracker.enter(FrameStage::RayTrace).unwrap();
        assert!(tracker.enter(FrameStage::Denoise).is_ok());
        assert!(tracker.enter(FrameStage::RayTrace).is_err());
        assert!(tracker.enter(FrameStage::Denoise).is_err());
        tracker.begin_frame();
        assert!(tracker.enter(FrameStage::Acquire).is_ok());
    }

    #[test]
    fn test_frame_runs_every_stage_in_order() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend.clone(), RendererConfig::new());

        let report = scheduler.render_frame(&mut scene, &params()).unwrap();
        assert_eq!(report.stages, FrameStage::ALL);
        assert_eq!(report.frame_index, 0);
        assert_eq!(report.tlas.world, 4);
        assert_eq!(report.rect, Extent2d::new(64, 32));
        assert_eq!(backend.presented(), vec![report.swapchain_image]);
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn test_first_frame_integrates_brdf_once() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend.clone(), RendererConfig::new());
        backend.clear_submissions();

        scheduler.render_frame(&mut scene, &params()).unwrap();
        scheduler.render_frame(&mut scene, &params()).unwrap();

        let count_brdf = |index: usize| {
            backend.submissions()[index]
                .commands
                .iter()
                .filter(|c| matches!(c, Command::BeginAnnotation(name) if name == "IntegrateBRDF"))
                .count()
        };
        assert_eq!(count_brdf(0), 1);
        assert_eq!(count_brdf(1), 0);
        assert_eq!(
            scheduler
                .tracker()
                .state(scheduler.targets()[RenderTarget::IntegrateBrdf]),
            Some(ResourceState::SHADER_RESOURCE)
        );
    }

    #[test]
    fn test_back_buffer_ends_in_present() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend, RendererConfig::new());

        let report = scheduler.render_frame(&mut scene, &params()).unwrap();
        let back_buffer = scheduler.swapchain_images()[report.swapchain_image as usize];
        assert_eq!(
            scheduler.tracker().state(back_buffer),
            Some(ResourceState::PRESENT)
        );
        assert_eq!(
            scheduler.tracker().state(report.final_image),
            Some(ResourceState::new(AccessBits::COPY_SOURCE, ImageLayout::General))
        );
    }

    #[test]
    fn test_unsupported_upscaler_falls_back() {
        let backend = Arc::new(DummyBackend::new());
        let mut scene = scene();
        let scheduler = FrameScheduler::new(
            backend,
            RendererConfig::new()
                .with_output_resolution(64, 32)
                .with_upscaler_quality(crate::params::UpscalerQuality::Quality),
            &mut scene,
            Box::new(NullDenoiser::new()),
            Some(Box::new(NullUpscaler::unsupported())),
        )
        .unwrap();
        assert!(!scheduler.upscale_stage().is_external());
        assert_eq!(scheduler.resolution().screen, Extent2d::new(64, 32));
    }

    #[test]
    fn test_external_upscaler_lowers_screen_resolution() {
        let backend = Arc::new(DummyBackend::new());
        let mut scene = scene();
        let mut scheduler = FrameScheduler::new(
            backend,
            RendererConfig::new()
                .with_output_resolution(64, 32)
                .with_upscaler_quality(crate::params::UpscalerQuality::Performance),
            &mut scene,
            Box::new(NullDenoiser::new()),
            Some(Box::new(NullUpscaler::new())),
        )
        .unwrap();
        assert!(scheduler.upscale_stage().is_external());
        assert_eq!(scheduler.resolution().screen, Extent2d::new(32, 16));

        let report = scheduler.render_frame(&mut scene, &params()).unwrap();
        assert_eq!(report.final_image, scheduler.targets()[RenderTarget::Final]);
    }

    #[test]
    fn test_native_resolution_scale_has_floor() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend, RendererConfig::new());

        scheduler.set_resolution_scale(0.1);
        assert_eq!(scheduler.resolution().scale, MIN_DYNAMIC_SCALE);

        scheduler.set_resolution_scale(0.0);
        let report = scheduler.render_frame(&mut scene, &params()).unwrap();
        assert_eq!(report.resolution_scale, MIN_DYNAMIC_SCALE);
        assert_eq!(report.rect, Extent2d::new(32, 16));
    }

    #[test]
    fn test_denoiser_switch_reinitializes() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend, RendererConfig::new());
        scheduler.render_frame(&mut scene, &params()).unwrap();

        let mut relax = params();
        relax.settings.denoiser = DenoiserKind::Relax;
        let report = scheduler.render_frame(&mut scene, &relax).unwrap();
        assert_eq!(scheduler.denoiser_kind(), DenoiserKind::Relax);
        assert_eq!(report.history.factor, 0.0);
    }

    #[test]
    fn test_render_after_shutdown_fails() {
        let backend = Arc::new(DummyBackend::new());
        let (mut scheduler, mut scene) = scheduler(backend.clone(), RendererConfig::new());
        scheduler.render_frame(&mut scene, &params()).unwrap();
        scheduler.shutdown().unwrap();
        assert_eq!(backend.live_resource_count(), 0);
        assert!(scheduler.render_frame(&mut scene, &params()).is_err());
    }

    #[test]
    fn test_rejects_backend_without_ray_tracing() {
        let backend = Arc::new(DummyBackend::with_config(
            crate::backend::DeviceCapabilities {
                ray_tracing: false,
                ..Default::default()
            },
            crate::backend::CompletionMode::Immediate,
        ));
        let mut scene = scene();
        let result = FrameScheduler::new(
            backend,
            RendererConfig::new(),
            &mut scene,
            Box::new(NullDenoiser::new()),
            None,
        );
        assert!(matches!(result, Err(GraphicsError::FeatureNotSupported(_))));
    }

}
