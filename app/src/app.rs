//! Headless frame loop.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use rtframe_core::math::{DVec3, Vec3};
use rtframe_core::scene::Scene;
use rtframe_graphics::{
    CameraState, DummyBackend, FrameReport, FrameScheduler, FrameTiming, GraphicsError,
    NullDenoiser, NullUpscaler, RenderParams, RenderSettings, TestCase, TestCaseError,
    TestCaseFile, Upscaler,
};

use crate::args::AppArgs;
use crate::scene_gen::{self, SceneLayout};

/// Error type for the driver.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Renderer error: {0}")]
    Graphics(#[from] GraphicsError),
    #[error("{0}")]
    TestCase(#[from] TestCaseError),
}

pub type AppResult<T> = Result<T, AppError>;

/// Weight of the newest frame time in the smoothed frame time.
const FRAME_TIME_SMOOTHING: f32 = 0.1;

/// Frames between two progress log lines.
const LOG_INTERVAL: u64 = 60;

/// Totals over a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub barriers: usize,
    pub blocked_acquires: u64,
    pub elapsed_ms: f64,
}

impl RunSummary {
    pub fn average_fps(&self) -> f64 {
        if self.elapsed_ms <= 0.0 {
            return 0.0;
        }
        self.frames as f64 * 1000.0 / self.elapsed_ms
    }
}

/// Owns the scene and the scheduler and produces one [`RenderParams`] per
/// frame.
pub struct App {
    args: AppArgs,
    scene: Scene,
    scheduler: FrameScheduler,
    settings: RenderSettings,
    replay: Option<TestCase>,
    orbit_radius: f64,
    aspect: f32,
    start_time: Instant,
    last_frame_time: Instant,
    smoothed_frame_time_ms: f32,
}

impl App {
    /// Build the scene and create the scheduler on the dummy backend.
    pub fn new(args: AppArgs) -> AppResult<Self> {
        let config = args.renderer_config();
        config.validate()?;

        let replay = match (&args.test_cases, args.test_case) {
            (Some(path), Some(index)) => {
                let file = TestCaseFile::new(path);
                log::info!(
                    "Replaying test case {index} of {} from {}",
                    file.count()?,
                    path.display()
                );
                Some(file.load(index)?)
            }
            _ => None,
        };

        let mut settings = RenderSettings {
            denoiser: config.denoiser,
            animated_objects: args.animated_objects > 0,
            animated_object_count: args.animated_objects,
            pause_animation: false,
            limit_fps: config.min_fps.is_some() || config.max_fps.is_some(),
            ..RenderSettings::default()
        };
        if let Some(case) = &replay {
            settings = case.settings;
        }

        let layout = SceneLayout::default();
        let mut scene = scene_gen::build(layout);
        let upscaler: Option<Box<dyn Upscaler>> = config
            .upscaler_quality
            .map(|_| Box::new(NullUpscaler::new()) as Box<dyn Upscaler>);
        let aspect =
            config.output_resolution.width as f32 / config.output_resolution.height as f32;

        let scheduler = FrameScheduler::new(
            Arc::new(DummyBackend::new()),
            config,
            &mut scene,
            Box::new(NullDenoiser::new()),
            upscaler,
        )?;

        let now = Instant::now();
        Ok(Self {
            args,
            scene,
            scheduler,
            settings,
            replay,
            orbit_radius: scene_gen::radius(layout),
            aspect,
            start_time: now,
            last_frame_time: now,
            smoothed_frame_time_ms: 0.0,
        })
    }

    fn timing(&mut self) -> FrameTiming {
        let now = Instant::now();
        let frame_time_ms = (now - self.last_frame_time).as_secs_f32() * 1000.0;
        self.last_frame_time = now;
        self.smoothed_frame_time_ms = if self.smoothed_frame_time_ms == 0.0 {
            frame_time_ms
        } else {
            self.smoothed_frame_time_ms
                + (frame_time_ms - self.smoothed_frame_time_ms) * FRAME_TIME_SMOOTHING
        };
        FrameTiming {
            timestamp_ms: (now - self.start_time).as_secs_f64() * 1000.0,
            frame_time_ms,
            smoothed_frame_time_ms: self.smoothed_frame_time_ms,
        }
    }

    /// Camera slowly orbiting the scene center, looking inwards and down.
    fn orbit_camera(&self, timestamp_ms: f64) -> CameraState {
        let angle = timestamp_ms * 0.0001;
        let position = DVec3::new(
            angle.cos() * self.orbit_radius,
            angle.sin() * self.orbit_radius,
            self.orbit_radius * 0.3,
        );
        let forward = Vec3::new(-position.x as f32, -position.y as f32, -position.z as f32);
        CameraState::perspective(
            position,
            forward,
            self.settings.cam_fov,
            self.aspect,
            self.settings.meter_to_units,
        )
    }

    fn frame_params(&mut self) -> RenderParams {
        let frame_index = self.scheduler.frame_index();
        let timing = self.timing();

        if let Some(case) = &self.replay {
            let params = if frame_index == 0 {
                case.params()
            } else {
                RenderParams::new(case.settings, case.camera)
            };
            return params.with_timing(timing);
        }

        let mut camera = self.orbit_camera(timing.timestamp_ms);
        if self.settings.taa {
            camera = camera.with_jitter(frame_index);
        }
        RenderParams::new(self.settings, camera).with_timing(timing)
    }

    /// Render one frame.
    pub fn step(&mut self) -> AppResult<FrameReport> {
        let params = self.frame_params();
        Ok(self.scheduler.render_frame(&mut self.scene, &params)?)
    }

    /// Render `--max-frames` frames and shut the scheduler down.
    pub fn run(&mut self) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();

        for _ in 0..self.args.max_frames {
            let report = self.step()?;
            summary.frames += 1;
            summary.barriers += report.barriers;

            if report.frame_index % LOG_INTERVAL == 0 {
                log::info!(
                    "Frame {}: {}x{} ({:.0}%), {} world / {} light instances, {} barriers",
                    report.frame_index,
                    report.rect.width,
                    report.rect.height,
                    report.resolution_scale * 100.0,
                    report.tlas.world,
                    report.tlas.light,
                    report.barriers
                );
            }
        }

        summary.blocked_acquires = self.scheduler.ring().acquire_count_blocked();
        summary.elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.scheduler.shutdown()?;

        log::info!(
            "Rendered {} frames in {:.1} ms ({:.1} fps), {} blocked acquires",
            summary.frames,
            summary.elapsed_ms,
            summary.average_fps(),
            summary.blocked_acquires
        );
        Ok(summary)
    }
}
