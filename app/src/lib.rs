//! # rtframe app
//!
//! Headless driver for the frame scheduler.
//!
//! ## Overview
//!
//! - [`AppArgs`] - clap command line arguments
//! - [`App`] - owns the demo scene and the scheduler, produces one
//!   parameter snapshot per frame
//! - [`scene_gen`] - procedural demo scene

mod app;
mod args;
pub mod scene_gen;

pub use app::{App, AppError, AppResult, RunSummary};
pub use args::{AppArgs, CliDenoiser, CliUpscalerQuality};

/// App library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("rtframe app v{} initialized", VERSION);
}
