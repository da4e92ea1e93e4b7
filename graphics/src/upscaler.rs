//! External upscaling engine interface.
//!
//! The scheduler never runs upscaling math itself. An [`Upscaler`] reports
//! which render resolution it wants for an output size and records its own
//! work into the compose stream when evaluated.

use crate::backend::CommandStream;
use crate::error::{GraphicsError, GraphicsResult};
use crate::params::UpscalerQuality;
use crate::resources::ImageId;
use crate::types::Extent2d;

/// Render resolutions an upscaler accepts for one output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpscalerSettings {
    /// Preferred render resolution.
    pub render_resolution: Extent2d,
    /// Smallest render resolution the engine can still upscale from.
    pub min_render_resolution: Extent2d,
}

/// Inputs of one upscaler evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpscaleDispatchDesc {
    pub color: ImageId,
    pub view_z: ImageId,
    pub motion: ImageId,
    pub output: ImageId,
    /// Sub-pixel jitter in pixels, already in the engine's sign convention.
    pub jitter: [f32; 2],
    /// Region of the inputs holding valid pixels.
    pub render_size: Extent2d,
    /// Drop the engine's history.
    pub reset: bool,
}

/// An upscaling engine.
pub trait Upscaler: Send {
    fn name(&self) -> &'static str;

    fn initialize(&mut self) -> GraphicsResult<()>;

    /// Render resolution for `output` at `quality`, or `None` when the
    /// engine cannot serve that combination.
    fn optimal_settings(&self, output: Extent2d, quality: UpscalerQuality)
    -> Option<UpscalerSettings>;

    /// Record one evaluation into `stream`.
    fn evaluate(&mut self, stream: &mut CommandStream, desc: &UpscaleDispatchDesc) -> GraphicsResult<()>;

    fn shutdown(&mut self);
}

/// Smallest resolution scale the upscaler accepts, rounded up to 1%.
pub fn min_resolution_scale(settings: &UpscalerSettings) -> f32 {
    let render = settings.render_resolution;
    let min = settings.min_render_resolution;
    if render.width == 0 || render.height == 0 {
        return 1.0;
    }
    let sx = min.width as f32 / render.width as f32;
    let sy = min.height as f32 / render.height as f32;
    ((sx.max(sy) * 100.0 + 0.99).floor() / 100.0).min(1.0)
}

/// Upscaler that records a marker command instead of real work.
///
/// `NullUpscaler::unsupported()` refuses every mode, which drives the
/// scheduler into its temporal fallback.
#[derive(Debug, Clone, Default)]
pub struct NullUpscaler {
    supported: bool,
    initialized: bool,
    evaluations: Vec<UpscaleDispatchDesc>,
}

impl NullUpscaler {
    pub fn new() -> Self {
        Self {
            supported: true,
            ..Self::default()
        }
    }

    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Every evaluation recorded so far.
    pub fn evaluations(&self) -> &[UpscaleDispatchDesc] {
        &self.evaluations
    }
}

impl Upscaler for NullUpscaler {
    fn name(&self) -> &'static str {
        "null-upscaler"
    }

    fn initialize(&mut self) -> GraphicsResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn optimal_settings(
        &self,
        output: Extent2d,
        quality: UpscalerQuality,
    ) -> Option<UpscalerSettings> {
        if !self.supported {
            return None;
        }
        let render_resolution = output.scaled(quality.ratio());
        Some(UpscalerSettings {
            render_resolution,
            min_render_resolution: output.scaled(UpscalerQuality::Performance.ratio()),
        })
    }

    fn evaluate(&mut self, stream: &mut CommandStream, desc: &UpscaleDispatchDesc) -> GraphicsResult<()> {
        if !self.initialized {
            return Err(GraphicsError::Internal("upscaler evaluated before initialize".into()));
        }
        stream.external(
            self.name(),
            format!("{}x{}", desc.render_size.width, desc.render_size.height),
        );
        self.evaluations.push(*desc);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.initialized {
            log::debug!("{}: shutdown after {} evaluations", self.name(), self.evaluations.len());
        }
        self.initialized = false;
    }
}
