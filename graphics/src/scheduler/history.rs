//! Temporal history reset.
//!
//! Denoiser and anti-aliasing history is only valid while the lighting
//! conditions stay close to the previous frame. Sudden changes shrink the
//! accumulation window, discrete mode switches drop the history entirely.

use rtframe_core::math::smoothstep;

use crate::denoiser::AccumulationMode;
use crate::params::{DenoiserKind, DenoiserTunables, RenderSettings};

/// Thresholds driving the history reset factor.
pub struct HistoryResetThresholds;

impl HistoryResetThresholds {
    /// Sun factor is 0 at or below this `sin(elevation)`.
    pub const SUN_LOW: f32 = -0.9;
    /// Sun factor is 1 at or above this `sin(elevation)`.
    pub const SUN_HIGH: f32 = 0.05;
    /// Sun factor change that fully drops the history.
    pub const SUN_DELTA: f32 = 0.2;
    /// On-screen modes at or below this value show lit output.
    pub const ON_SCREEN_LOW: i32 = 6;
    /// On-screen modes at or above this value show raw buffers.
    pub const ON_SCREEN_HIGH: i32 = 13;
}

/// The settings a history reset depends on, captured once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryInputs {
    pub sun_elevation: f32,
    pub denoiser: DenoiserKind,
    pub ortho: bool,
    pub reference_accumulation: bool,
    pub on_screen: i32,
}

impl HistoryInputs {
    pub fn new(settings: &RenderSettings, sun_elevation: f32, ortho: bool) -> Self {
        Self {
            sun_elevation,
            denoiser: settings.denoiser,
            ortho,
            reference_accumulation: settings.denoiser_tunables.reference_accumulation,
            on_screen: settings.on_screen,
        }
    }

    fn sun_factor(&self) -> f32 {
        smoothstep(
            HistoryResetThresholds::SUN_LOW,
            HistoryResetThresholds::SUN_HIGH,
            self.sun_elevation.to_radians().sin(),
        )
    }
}

fn crosses_on_screen_boundary(prev: i32, curr: i32) -> bool {
    let low = HistoryResetThresholds::ON_SCREEN_LOW;
    let high = HistoryResetThresholds::ON_SCREEN_HIGH;
    (prev >= high && curr <= low) || (prev <= low && curr >= high)
}

/// History reset factor in `[0, 1]`; 0 drops all history.
pub fn reset_factor(prev: &HistoryInputs, curr: &HistoryInputs, force_reset: bool) -> f32 {
    let hard_reset = force_reset
        || prev.denoiser != curr.denoiser
        || prev.ortho != curr.ortho
        || prev.reference_accumulation != curr.reference_accumulation
        || crosses_on_screen_boundary(prev.on_screen, curr.on_screen);
    if hard_reset {
        return 0.0;
    }

    let delta = (curr.sun_factor() - prev.sun_factor()).abs();
    1.0 - smoothstep(0.0, HistoryResetThresholds::SUN_DELTA, delta)
}

/// Accumulation limits of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryAccumulation {
    pub factor: f32,
    pub max_accumulated: u32,
    pub max_fast_accumulated: u32,
}

impl HistoryAccumulation {
    pub fn new(factor: f32, tunables: &DenoiserTunables) -> Self {
        let scale = |frames: u32| (frames as f32 * factor + 0.5) as u32;
        Self {
            factor,
            max_accumulated: scale(tunables.max_accumulated_frames),
            max_fast_accumulated: scale(tunables.max_fast_accumulated_frames),
        }
    }

    pub fn mode(&self) -> AccumulationMode {
        if self.factor == 0.0 {
            AccumulationMode::ClearAndRestart
        } else {
            AccumulationMode::Continue
        }
    }

    pub fn is_reset(&self) -> bool {
        self.factor == 0.0
    }
}
