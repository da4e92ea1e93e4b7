//! # rtframe core
//!
//! Math helpers, profiling macros and the scene model shared by the frame
//! scheduler and its drivers.

pub mod math;
pub mod profiling;
pub mod scene;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("rtframe core v{} initialized", VERSION);
}
