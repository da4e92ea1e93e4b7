//! Command line arguments.
//!
//! Uses clap for CLI parsing with help text (`--help`), validation and
//! clear error messages.
//!
//! # Examples
//!
//! ```bash
//! # Render 100 frames with three frames in flight
//! rtframe --frames-in-flight 3 --max-frames 100
//!
//! # Upscale from a lower internal resolution
//! rtframe --upscaler-quality balanced
//!
//! # Replay the third stored test case
//! rtframe --test-cases cases.bin --test-case 2
//! ```

use std::path::PathBuf;

use clap::Parser;

use rtframe_graphics::{DenoiserKind, RendererConfig, UpscalerQuality};

/// Denoiser selection for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliDenoiser {
    /// Recurrent blur denoiser.
    #[default]
    Reblur,
    /// Relaxed a-trous denoiser.
    Relax,
}

impl From<CliDenoiser> for DenoiserKind {
    fn from(cli: CliDenoiser) -> Self {
        match cli {
            CliDenoiser::Reblur => DenoiserKind::Reblur,
            CliDenoiser::Relax => DenoiserKind::Relax,
        }
    }
}

/// Upscaler quality mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliUpscalerQuality {
    Performance,
    Balanced,
    Quality,
    #[value(name = "ultra-quality")]
    UltraQuality,
}

impl From<CliUpscalerQuality> for UpscalerQuality {
    fn from(cli: CliUpscalerQuality) -> Self {
        match cli {
            CliUpscalerQuality::Performance => UpscalerQuality::Performance,
            CliUpscalerQuality::Balanced => UpscalerQuality::Balanced,
            CliUpscalerQuality::Quality => UpscalerQuality::Quality,
            CliUpscalerQuality::UltraQuality => UpscalerQuality::UltraQuality,
        }
    }
}

/// rtframe headless frame driver.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rtframe",
    about = "Drive the ray-traced frame scheduler headless",
    long_about = "Runs the per-frame orchestration core against the recording dummy \
        backend: acquire, acceleration structure rebuild, ray tracing, denoising, \
        composition, upscaling and presentation.\n\n\
        Set RUST_LOG=debug for per-frame summaries.",
    version
)]
pub struct AppArgs {
    /// Number of frames the CPU may record ahead of the GPU (1-3).
    #[arg(long, default_value = "2")]
    pub frames_in_flight: usize,

    /// Output width in pixels.
    #[arg(long, default_value = "1920")]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value = "1080")]
    pub height: u32,

    /// Exit after rendering N frames.
    #[arg(long, default_value = "100")]
    pub max_frames: u64,

    /// Request an external upscaler with this quality mode.
    #[arg(long, value_enum)]
    pub upscaler_quality: Option<CliUpscalerQuality>,

    /// Denoiser to run on the ray-traced signals.
    #[arg(long, default_value = "reblur", value_enum)]
    pub denoiser: CliDenoiser,

    /// Number of visible animated objects (0 hides them).
    #[arg(long, default_value = "0")]
    pub animated_objects: u32,

    /// Lower the internal resolution whenever the frame rate drops below this.
    #[arg(long)]
    pub min_fps: Option<f32>,

    /// Cap the frame rate.
    #[arg(long)]
    pub max_fps: Option<f32>,

    /// File holding stored test cases.
    #[arg(long)]
    pub test_cases: Option<PathBuf>,

    /// Replay the test case with this index before the first frame.
    #[arg(long, requires = "test_cases")]
    pub test_case: Option<usize>,
}

impl AppArgs {
    /// Renderer configuration described by the arguments.
    pub fn renderer_config(&self) -> RendererConfig {
        let mut config = RendererConfig::new()
            .with_frames_in_flight(self.frames_in_flight)
            .with_output_resolution(self.width, self.height)
            .with_denoiser(self.denoiser.into());
        if let Some(quality) = self.upscaler_quality {
            config = config.with_upscaler_quality(quality.into());
        }
        if let Some(fps) = self.min_fps {
            config = config.with_min_fps(fps);
        }
        if let Some(fps) = self.max_fps {
            config = config.with_max_fps(fps);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = AppArgs::parse_from(["rtframe"]);
        assert_eq!(args.frames_in_flight, 2);
        assert_eq!(args.max_frames, 100);
        assert_eq!(args.denoiser, CliDenoiser::Reblur);
        assert!(args.upscaler_quality.is_none());

        let config = args.renderer_config();
        assert_eq!(config.output_resolution.width, 1920);
        assert_eq!(config.output_resolution.height, 1080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upscaler_quality() {
        let args = AppArgs::parse_from(["rtframe", "--upscaler-quality", "ultra-quality"]);
        assert_eq!(
            args.renderer_config().upscaler_quality,
            Some(UpscalerQuality::UltraQuality)
        );
    }

    #[test]
    fn test_test_case_requires_file() {
        assert!(AppArgs::try_parse_from(["rtframe", "--test-case", "1"]).is_err());
        let args =
            AppArgs::try_parse_from(["rtframe", "--test-cases", "cases.bin", "--test-case", "1"])
                .unwrap();
        assert_eq!(args.test_case, Some(1));
    }

    #[test]
    fn test_invalid_frames_in_flight_rejected_by_config() {
        let args = AppArgs::parse_from(["rtframe", "--frames-in-flight", "4"]);
        assert!(args.renderer_config().validate().is_err());
    }
}
