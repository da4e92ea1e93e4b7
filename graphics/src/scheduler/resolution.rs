//! Render resolution bookkeeping.
//!
//! Three sizes are involved in every frame:
//!
//! - **output**: the display resolution
//! - **screen**: the resolution render targets are allocated at; equals
//!   output unless an external upscaler asked for less
//! - **rect**: the region of the render targets actually rendered this
//!   frame, `screen * resolution_scale`

use rtframe_core::math::lerp;

use crate::types::Extent2d;

/// Lower bound of the dynamically adapted resolution scale.
pub const MIN_DYNAMIC_SCALE: f32 = 0.5;

/// Rendered region of `screen` at `scale`, at least one pixel each way.
pub fn rect_size(screen: Extent2d, scale: f32) -> Extent2d {
    Extent2d::new(
        ((screen.width as f32 * scale + 0.5) as u32).max(1),
        ((screen.height as f32 * scale + 0.5) as u32).max(1),
    )
}

/// Move `scale` towards the value that would hit `min_fps`.
///
/// The step is damped by the smoothed frame rate so that the scale does not
/// oscillate with frame-time noise.
pub fn adapt_resolution_scale(
    scale: f32,
    min_fps: f32,
    frame_time_ms: f32,
    smoothed_frame_time_ms: f32,
) -> f32 {
    if frame_time_ms <= 0.0 || smoothed_frame_time_ms <= 0.0 {
        return scale;
    }
    let target_ms = 1000.0 / min_fps;
    let ratio = (target_ms / frame_time_ms).sqrt();
    let damping = 1.0 / (1.0 + 1000.0 / smoothed_frame_time_ms);
    lerp(scale, scale * ratio, damping).clamp(MIN_DYNAMIC_SCALE, 1.0)
}

/// Resolution state carried from frame to frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionState {
    pub output: Extent2d,
    pub screen: Extent2d,
    pub scale: f32,
    pub min_scale: f32,
    /// Rect of the previous frame; the current rect on the first frame.
    pub rect_prev: Extent2d,
}

impl ResolutionState {
    /// `min_scale` never drops below [`MIN_DYNAMIC_SCALE`].
    pub fn new(output: Extent2d, screen: Extent2d, min_scale: f32) -> Self {
        Self {
            output,
            screen,
            scale: 1.0,
            min_scale: min_scale.clamp(MIN_DYNAMIC_SCALE, 1.0),
            rect_prev: screen,
        }
    }

    /// Set the scale, honoring the upscaler minimum.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(self.min_scale, 1.0);
    }

    pub fn adapt(&mut self, min_fps: f32, frame_time_ms: f32, smoothed_frame_time_ms: f32) {
        let scale = adapt_resolution_scale(self.scale, min_fps, frame_time_ms, smoothed_frame_time_ms);
        self.set_scale(scale);
    }

    pub fn rect(&self) -> Extent2d {
        rect_size(self.screen, self.scale)
    }

    /// Whether the temporal pass must be followed by an upsample.
    pub fn is_upsampling(&self) -> bool {
        self.scale < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_rounds_to_nearest() {
        let screen = Extent2d::new(1920, 1080);
        assert_eq!(rect_size(screen, 1.0), screen);
        assert_eq!(rect_size(screen, 0.5), Extent2d::new(960, 540));
        assert_eq!(rect_size(Extent2d::new(3, 3), 0.5), Extent2d::new(2, 2));
        assert_eq!(rect_size(Extent2d::new(4, 1), 0.0), Extent2d::new(1, 1));
    }

    #[test]
    fn test_scale_floor_without_upscaler() {
        let screen = Extent2d::new(64, 32);
        let mut state = ResolutionState::new(screen, screen, 0.0);
        assert_eq!(state.min_scale, MIN_DYNAMIC_SCALE);

        state.set_scale(0.1);
        assert_eq!(state.scale, MIN_DYNAMIC_SCALE);
        state.set_scale(0.0);
        assert_eq!(state.rect(), Extent2d::new(32, 16));
    }

    #[test]
    fn test_slow_frames_lower_scale() {
        // 30 ms frames against a 60 fps floor.
        let scale = adapt_resolution_scale(1.0, 60.0, 30.0, 30.0);
        assert!(scale < 1.0);
        assert!(scale >= MIN_DYNAMIC_SCALE);

        // Fast frames never push the scale above 1.
        assert_eq!(adapt_resolution_scale(1.0, 30.0, 5.0, 5.0), 1.0);
        // A very slow frame bottoms out.
        assert_eq!(adapt_resolution_scale(0.5, 60.0, 1000.0, 1000.0), MIN_DYNAMIC_SCALE);
    }

    #[test]
    fn test_scale_respects_upscaler_minimum() {
        let mut state = ResolutionState::new(
            Extent2d::new(1920, 1080),
            Extent2d::new(1114, 626),
            0.87,
        );
        assert_eq!(state.rect(), Extent2d::new(1114, 626));
        assert!(!state.is_upsampling());

        state.set_scale(0.5);
        assert_eq!(state.scale, 0.87);
        assert!(state.is_upsampling());

        state.adapt(1000.0, 100.0, 100.0);
        assert_eq!(state.scale, 0.87);
    }
}
