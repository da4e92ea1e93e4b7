//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros from [`rtframe_core::profiling`] and
//! adds per-frame plots of the scheduler's counters. Everything compiles to
//! nothing unless the `profiling` feature is enabled:
//!
//! ```bash
//! cargo run -p rtframe-app --features profiling
//! ```

pub use rtframe_core::profiling::*;

use crate::scheduler::FrameReport;

/// Plot the counters of one frame.
pub fn plot_frame(report: &FrameReport) {
    profile_plot!("barriers", report.barriers);
    profile_plot!("tlas_world_instances", report.tlas.world);
    profile_plot!("tlas_light_instances", report.tlas.light);
    profile_plot!("history_factor", report.history.factor);
    profile_plot!("resolution_scale", report.resolution_scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_reexported() {
        profile_scope!("graphics_scope");
        profile_function!();
        frame_mark!();
    }
}
