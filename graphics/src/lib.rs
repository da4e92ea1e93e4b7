//! # rtframe graphics
//!
//! Per-frame orchestration core of a real-time ray-traced renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameScheduler`] - drives one frame through acquire, ray tracing,
//!   denoising, composition, upscaling and presentation
//! - [`TransitionTracker`] - minimal image/buffer barrier batches
//! - [`AccelerationStructureBuilder`] - BLAS builds and per-frame TLAS rebuilds
//! - [`FrameRingBuffer`] - per-frame command streams, sync objects and
//!   constant regions
//! - [`ResourceRegistry`] - typed arenas over backend resources
//! - [`GraphicsBackend`] - the device capability the core runs on, with a
//!   recording [`DummyBackend`] for tests and headless runs
//!
//! ## Example
//!
//! ```ignore
//! use rtframe_graphics::{DummyBackend, FrameScheduler, NullDenoiser, RendererConfig};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let mut scheduler = FrameScheduler::new(
//!     backend,
//!     RendererConfig::new(),
//!     &mut scene,
//!     Box::new(NullDenoiser::new()),
//!     None,
//! )?;
//! loop {
//!     let report = scheduler.render_frame(&mut scene, &params)?;
//! }
//! ```

pub mod accel;
pub mod backend;
pub mod denoiser;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod profiling;
pub mod resources;
pub mod scheduler;
pub mod testcase;
pub mod transition;
pub mod types;
pub mod upscaler;

// Re-export main types for convenience
pub use accel::{AccelerationStructureBuilder, TlasCounts, TopLevelParams};
pub use backend::{
    BackendError, CommandStream, CompletionMode, DeviceCapabilities, DummyBackend,
    GraphicsBackend,
};
pub use denoiser::{CommonSettings, Denoiser, DenoiserResourceTable, NullDenoiser};
pub use error::{GraphicsError, GraphicsResult};
pub use params::{
    CameraState, DenoiserKind, FrameTiming, RenderParams, RenderSettings, RendererConfig,
    UpscalerQuality,
};
pub use pipeline::{FrameContext, FrameRingBuffer};
pub use resources::{ImageId, RenderTarget, RenderTargets, ResourceRegistry};
pub use scheduler::{FrameReport, FrameScheduler, FrameStage};
pub use testcase::{TestCase, TestCaseError, TestCaseFile};
pub use transition::{TransitionRequest, TransitionTracker};
pub use types::{AccessBits, Extent2d, ImageLayout, ResourceState, TextureFormat};
pub use upscaler::{NullUpscaler, Upscaler};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("rtframe graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }
}
