//! Camera matrices of one frame.

use rtframe_core::math::{DVec3, Mat4, Vec3, nalgebra};

/// Near plane distance in meters.
pub const NEAR_Z: f32 = 0.001;

/// Far plane distance in meters.
const FAR_Z: f32 = 10000.0;

/// Number of jitter positions before the sequence repeats.
const JITTER_PERIOD: u32 = 16;

/// Camera state in camera-relative space.
///
/// The view matrices carry no translation: geometry is expressed relative to
/// [`global_position`](Self::global_position), which stays in `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub world_to_view: Mat4,
    pub view_to_world: Mat4,
    pub view_to_clip: Mat4,
    pub world_to_clip: Mat4,
    pub global_position: DVec3,
    /// View-space frustum at unit depth: `(x0, y0, width, height)`.
    pub frustum: [f32; 4],
    /// Sub-pixel offset in pixels, in `[-0.5, 0.5]`.
    pub viewport_jitter: [f32; 2],
    pub ortho: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::perspective(DVec3::zeros(), Vec3::y(), 90.0, 16.0 / 9.0, 1.0)
    }
}

impl CameraState {
    /// Left-handed perspective camera at `position` looking along `forward`
    /// (z is up).
    ///
    /// `fov_deg` is the horizontal field of view at 16:9; wider aspect
    /// ratios widen it so the vertical extent stays fixed.
    pub fn perspective(
        position: DVec3,
        forward: Vec3,
        fov_deg: f32,
        aspect: f32,
        meter_to_units: f32,
    ) -> Self {
        let half_x = ((fov_deg.to_radians() * 0.5).tan() * aspect * 9.0 / 16.0).atan();
        let tan_x = half_x.tan();
        let tan_y = tan_x / aspect;

        let near = NEAR_Z * meter_to_units;
        let far = FAR_Z * meter_to_units;
        let depth = far / (far - near);

        #[rustfmt::skip]
        let view_to_clip = Mat4::new(
            1.0 / tan_x, 0.0,         0.0,   0.0,
            0.0,         1.0 / tan_y, 0.0,   0.0,
            0.0,         0.0,         depth, -near * depth,
            0.0,         0.0,         1.0,   0.0,
        );

        Self::from_projection(
            position,
            forward,
            view_to_clip,
            [-tan_x, tan_y, 2.0 * tan_x, -2.0 * tan_y],
            false,
        )
    }

    /// Orthographic camera covering `range` units horizontally each side.
    pub fn orthographic(
        position: DVec3,
        forward: Vec3,
        range: f32,
        aspect: f32,
        meter_to_units: f32,
    ) -> Self {
        let range_y = range / aspect;
        let near = NEAR_Z * meter_to_units;
        let far = FAR_Z * meter_to_units;

        #[rustfmt::skip]
        let view_to_clip = Mat4::new(
            1.0 / range, 0.0,           0.0,                0.0,
            0.0,         1.0 / range_y, 0.0,                0.0,
            0.0,         0.0,           1.0 / (far - near), -near / (far - near),
            0.0,         0.0,           0.0,                1.0,
        );

        Self::from_projection(
            position,
            forward,
            view_to_clip,
            [-range, range_y, 2.0 * range, -2.0 * range_y],
            true,
        )
    }

    fn from_projection(
        position: DVec3,
        forward: Vec3,
        view_to_clip: Mat4,
        frustum: [f32; 4],
        ortho: bool,
    ) -> Self {
        let forward = forward.try_normalize(1e-6).unwrap_or_else(Vec3::y);
        let up_hint = if forward.z.abs() > 0.999 { Vec3::y() } else { Vec3::z() };
        let right = up_hint.cross(&forward).normalize();
        let up = forward.cross(&right);

        #[rustfmt::skip]
        let world_to_view = Mat4::new(
            right.x,   right.y,   right.z,   0.0,
            up.x,      up.y,      up.z,      0.0,
            forward.x, forward.y, forward.z, 0.0,
            0.0,       0.0,       0.0,       1.0,
        );

        Self {
            world_to_view,
            view_to_world: world_to_view.transpose(),
            view_to_clip,
            world_to_clip: view_to_clip * world_to_view,
            global_position: position,
            frustum,
            viewport_jitter: [0.0; 2],
            ortho,
        }
    }

    /// Apply the sub-pixel jitter of `frame_index` (Halton 2/3 sequence).
    #[must_use]
    pub fn with_jitter(mut self, frame_index: u64) -> Self {
        let index = (frame_index % JITTER_PERIOD as u64) as u32 + 1;
        self.viewport_jitter = [halton(index, 2) - 0.5, halton(index, 3) - 0.5];
        self
    }

    /// World-space view direction.
    pub fn view_direction(&self) -> Vec3 {
        let dir = self.view_to_world * nalgebra::Vector4::new(0.0, 0.0, 1.0, 0.0);
        Vec3::new(dir.x, dir.y, dir.z)
    }
}

/// Radical inverse of `index` in `base`.
fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f32;
    while index > 0 {
        result += (index % base) as f32 * fraction;
        index /= base;
        fraction /= base as f32;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_direction_follows_forward() {
        let camera = CameraState::perspective(DVec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 90.0, 16.0 / 9.0, 1.0);
        let dir = camera.view_direction();
        assert!((dir - Vec3::x()).norm() < 1e-6);
        assert!(!camera.ortho);
    }

    #[test]
    fn test_forward_point_projects_to_center() {
        let camera = CameraState::perspective(DVec3::zeros(), Vec3::y(), 90.0, 16.0 / 9.0, 1.0);
        let clip = camera.world_to_clip * nalgebra::Vector4::new(0.0, 5.0, 0.0, 1.0);
        assert!(clip.w > 0.0);
        assert!((clip.x / clip.w).abs() < 1e-6);
        assert!((clip.y / clip.w).abs() < 1e-6);
        let z = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&z));
    }

    #[test]
    fn test_jitter_range() {
        let camera = CameraState::default();
        assert_eq!(camera.viewport_jitter, [0.0, 0.0]);
        for frame in 0..32 {
            let jittered = camera.with_jitter(frame);
            for offset in jittered.viewport_jitter {
                assert!((-0.5..=0.5).contains(&offset));
            }
        }
        assert_eq!(camera.with_jitter(0), camera.with_jitter(JITTER_PERIOD as u64));
    }

    #[test]
    fn test_halton() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthographic_frustum() {
        let camera = CameraState::orthographic(DVec3::zeros(), Vec3::y(), 3.0, 2.0, 1.0);
        assert!(camera.ortho);
        assert_eq!(camera.frustum, [-3.0, 1.5, 6.0, -3.0]);
    }
}
