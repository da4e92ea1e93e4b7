//! Renderer configuration and per-frame parameters.
//!
//! - [`RendererConfig`] - startup configuration, validated once
//! - [`RenderSettings`] - user-tweakable settings, persisted in test cases
//! - [`CameraState`] - camera matrices for one frame
//! - [`RenderParams`] - the immutable snapshot the scheduler consumes per frame

mod block;
mod camera;

pub use block::{CameraStateBlock, SettingsBlock};
pub use camera::{CameraState, NEAR_Z};

use rtframe_core::math::{DVec3, Vec3, sun_direction, wave_triangle};
use rtframe_core::scene::{ANIMATED_INSTANCE_MAX_NUM, animation_speed};

use crate::error::{GraphicsError, GraphicsResult};
use crate::pipeline::MAX_FRAMES_IN_FLIGHT;
use crate::types::{Extent2d, TextureFormat};

/// Denoising engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DenoiserKind {
    #[default]
    Reblur = 0,
    Relax = 1,
}

impl DenoiserKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Reblur),
            1 => Some(Self::Relax),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reblur => "REBLUR",
            Self::Relax => "RELAX",
        }
    }
}

/// Denoiser pre-pass blur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PrePassMode {
    Off = 0,
    Simple = 1,
    #[default]
    Advanced = 2,
}

impl PrePassMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Off),
            1 => Some(Self::Simple),
            2 => Some(Self::Advanced),
            _ => None,
        }
    }
}

/// Render-to-output resolution ratio requested from an external upscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpscalerQuality {
    Performance,
    #[default]
    Balanced,
    Quality,
    UltraQuality,
}

impl UpscalerQuality {
    /// Nominal render/output ratio of this mode.
    pub fn ratio(self) -> f32 {
        match self {
            Self::Performance => 0.5,
            Self::Balanced => 0.58,
            Self::Quality => 0.67,
            Self::UltraQuality => 0.77,
        }
    }
}

/// Tuning of the denoising engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenoiserTunables {
    pub blur_radius: f32,
    pub adaptive_radius_scale: f32,
    pub stabilization_strength: f32,
    pub normal_weight_strictness: f32,
    /// Percent of view depth.
    pub disocclusion_threshold: f32,
    /// Percent.
    pub residual_noise_level: f32,
    pub max_accumulated_frames: u32,
    pub max_fast_accumulated_frames: u32,
    pub pre_pass_mode: PrePassMode,
    pub reference_accumulation: bool,
    pub antilag_intensity: bool,
    pub antilag_hit_distance: bool,
    pub anti_firefly: bool,
}

impl Default for DenoiserTunables {
    fn default() -> Self {
        Self {
            blur_radius: 30.0,
            adaptive_radius_scale: 5.0,
            stabilization_strength: 1.0,
            normal_weight_strictness: 1.0,
            disocclusion_threshold: 1.0,
            residual_noise_level: 3.0,
            max_accumulated_frames: 31,
            max_fast_accumulated_frames: 7,
            pre_pass_mode: PrePassMode::Advanced,
            reference_accumulation: false,
            antilag_intensity: true,
            antilag_hit_distance: true,
            anti_firefly: false,
        }
    }
}

/// User-facing render settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub denoiser_tunables: DenoiserTunables,

    pub max_fps: f32,
    /// Horizontal field of view at 16:9, degrees.
    pub cam_fov: f32,
    pub sun_azimuth: f32,
    pub sun_elevation: f32,
    pub sun_angular_diameter: f32,
    pub exposure: f32,
    pub roughness_override: f32,
    pub metalness_override: f32,
    pub emission_intensity: f32,
    pub sky_ambient: f32,
    pub debug: f32,
    pub meter_to_units: f32,
    pub animated_object_scale: f32,
    pub separator: f32,
    pub animation_speed: f32,
    pub diff_hit_dist_scale: f32,
    pub spec_hit_dist_scale: f32,

    pub on_screen: i32,
    pub forced_material: i32,
    pub animated_object_count: u32,
    pub denoiser: DenoiserKind,
    /// Rays per pixel. Zero means half a ray per pixel (checkerboard).
    pub rpp: u32,

    pub limit_fps: bool,
    pub primary_full_brdf: bool,
    pub indirect_full_brdf: bool,
    pub indirect_diffuse: bool,
    pub indirect_specular: bool,
    pub normal_map: bool,
    pub mip: bool,
    pub metal_ambient: bool,
    pub taa: bool,
    pub spec_second_bounce: bool,
    pub diff_second_bounce: bool,
    pub animated_objects: bool,
    pub animate_sun: bool,
    pub blink: bool,
    pub pause_animation: bool,
    pub emission: bool,
    pub motion_vectors_in_world_space: bool,
    pub emissive_objects: bool,
    pub importance_sampling: bool,
    pub specular_lobe_trimming: bool,
    pub blue_noise: bool,
    pub ortho: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            denoiser_tunables: DenoiserTunables::default(),
            max_fps: 60.0,
            cam_fov: 90.0,
            sun_azimuth: -147.0,
            sun_elevation: 45.0,
            sun_angular_diameter: 0.533,
            exposure: 0.00017,
            roughness_override: 0.0,
            metalness_override: 0.0,
            emission_intensity: 2000.0,
            sky_ambient: 0.0,
            debug: 0.0,
            meter_to_units: 1.0,
            animated_object_scale: 1.0,
            separator: 0.0,
            animation_speed: 0.0,
            diff_hit_dist_scale: 3.0,
            spec_hit_dist_scale: 3.0,
            on_screen: 0,
            forced_material: 0,
            animated_object_count: 5,
            denoiser: DenoiserKind::Reblur,
            rpp: 0,
            limit_fps: false,
            primary_full_brdf: true,
            indirect_full_brdf: true,
            indirect_diffuse: true,
            indirect_specular: true,
            normal_map: true,
            mip: true,
            metal_ambient: true,
            taa: true,
            spec_second_bounce: false,
            diff_second_bounce: true,
            animated_objects: false,
            animate_sun: false,
            blink: false,
            pause_animation: true,
            emission: false,
            motion_vectors_in_world_space: true,
            emissive_objects: false,
            importance_sampling: true,
            specular_lobe_trimming: true,
            blue_noise: true,
            ortho: false,
        }
    }
}

impl RenderSettings {
    /// Playback multiplier of object and sun animation.
    pub fn animation_speed(&self) -> f32 {
        animation_speed(self.pause_animation, self.animation_speed)
    }

    /// Sun elevation in degrees, following the day cycle when the sun is
    /// animated.
    pub fn sun_elevation_at(&self, timestamp_ms: f64) -> f32 {
        if self.animate_sun {
            let period = self.animation_speed() as f64 * 0.0001 * timestamp_ms;
            (wave_triangle(period) * 30.0) as f32
        } else {
            self.sun_elevation
        }
    }

    /// Whether the animated pool is visible at `timestamp_ms`.
    ///
    /// Blinking ignores the pause toggle.
    pub fn animated_objects_visible(&self, timestamp_ms: f64) -> bool {
        if !self.animated_objects {
            return false;
        }
        if !self.blink {
            return true;
        }
        let speed = animation_speed(false, self.animation_speed) as f64;
        wave_triangle(0.0003 * timestamp_ms * speed) > 0.5
    }

    /// World-space size of animated objects.
    pub fn animated_object_world_scale(&self) -> f32 {
        self.animated_object_scale * self.meter_to_units / 2.0
    }

    /// Specular lobe trimming parameters handed to shaders and the denoiser.
    pub fn trimming_params(&self) -> Vec3 {
        if self.specular_lobe_trimming {
            Vec3::new(0.85, 0.04, 0.11)
        } else {
            Vec3::new(1.0, 0.0, 0.0001)
        }
    }

    /// Samples per pixel written to the constant block.
    pub fn sample_count(&self) -> u32 {
        if self.rpp == 0 { 1 } else { self.rpp }
    }
}

/// Timing of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTiming {
    /// Milliseconds since the session started.
    pub timestamp_ms: f64,
    /// Duration of the previous frame.
    pub frame_time_ms: f32,
    /// Heavily smoothed frame duration.
    pub smoothed_frame_time_ms: f32,
}

/// Everything the scheduler reads while recording one frame.
///
/// Built once per frame by the caller and never mutated by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub settings: RenderSettings,
    pub camera: CameraState,
    pub timing: FrameTiming,
    /// Discard all temporal history this frame.
    pub force_history_reset: bool,
}

impl RenderParams {
    pub fn new(settings: RenderSettings, camera: CameraState) -> Self {
        Self {
            settings,
            camera,
            timing: FrameTiming::default(),
            force_history_reset: false,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: FrameTiming) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn with_history_reset(mut self, reset: bool) -> Self {
        self.force_history_reset = reset;
        self
    }

    /// Sun elevation for this frame.
    pub fn sun_elevation(&self) -> f32 {
        self.settings.sun_elevation_at(self.timing.timestamp_ms)
    }

    /// Unit vector towards the sun for this frame.
    pub fn sun_direction(&self) -> Vec3 {
        sun_direction(self.settings.sun_azimuth, self.sun_elevation())
    }

    /// Camera-relative origin of this frame.
    pub fn origin(&self) -> DVec3 {
        self.camera.global_position
    }
}

/// Startup configuration of the frame scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub frames_in_flight: usize,
    /// Display resolution.
    pub output_resolution: Extent2d,
    /// Format of the temporal history images.
    pub output_format: TextureFormat,
    /// Requested external upscaler mode. `None` keeps native resolution.
    pub upscaler_quality: Option<UpscalerQuality>,
    /// Frame-rate cap used when `limit_fps` is enabled.
    pub max_fps: Option<f32>,
    /// Frame-rate floor driving dynamic resolution.
    pub min_fps: Option<f32>,
    pub animated_pool_size: usize,
    pub denoiser: DenoiserKind,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            output_resolution: Extent2d::new(1920, 1080),
            output_format: TextureFormat::Rgba16Float,
            upscaler_quality: None,
            max_fps: None,
            min_fps: None,
            animated_pool_size: ANIMATED_INSTANCE_MAX_NUM,
            denoiser: DenoiserKind::Reblur,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    #[must_use]
    pub fn with_output_resolution(mut self, width: u32, height: u32) -> Self {
        self.output_resolution = Extent2d::new(width, height);
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: TextureFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_upscaler_quality(mut self, quality: UpscalerQuality) -> Self {
        self.upscaler_quality = Some(quality);
        self
    }

    #[must_use]
    pub fn with_max_fps(mut self, fps: f32) -> Self {
        self.max_fps = Some(fps);
        self
    }

    #[must_use]
    pub fn with_min_fps(mut self, fps: f32) -> Self {
        self.min_fps = Some(fps);
        self
    }

    #[must_use]
    pub fn with_animated_pool_size(mut self, size: usize) -> Self {
        self.animated_pool_size = size;
        self
    }

    #[must_use]
    pub fn with_denoiser(mut self, denoiser: DenoiserKind) -> Self {
        self.denoiser = denoiser;
        self
    }

    /// Check the configuration before any GPU object is created.
    pub fn validate(&self) -> GraphicsResult<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames in flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.output_resolution.width == 0 || self.output_resolution.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "output resolution {}x{} is empty",
                self.output_resolution.width, self.output_resolution.height
            )));
        }
        for (name, fps) in [("max", self.max_fps), ("min", self.min_fps)] {
            if let Some(fps) = fps
                && !(fps > 0.0 && fps.is_finite())
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{name} fps must be positive, got {fps}"
                )));
            }
        }
        Ok(())
    }
}
