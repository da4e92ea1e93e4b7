//! Math type aliases and helper functions.
//!
//! Rendering data is `f32`. World positions and matrix inversion use `f64`
//! so that transforms stay precise far away from the world origin
//! (see [`camera_relative`] and [`inverse_f64`]).

pub use nalgebra;

// ===== Rendering math (f32) =====

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 3x3 matrix (f32).
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

// ===== World math (f64) =====

/// 3D vector (f64), used for world-space positions.
pub type DVec3 = nalgebra::Vector3<f64>;

/// 4x4 matrix (f64), used for precise inversion.
pub type DMat4 = nalgebra::Matrix4<f64>;

/// Three rows of an affine transform, row-major, as consumed by shaders and
/// ray tracing instance records.
pub type Rows3x4 = [[f32; 4]; 3];

// ===== Helper functions =====

/// Build a rotation matrix around a (normalized) axis, with uniform scale applied.
pub fn mat4_from_axis_angle_scale(axis: &Vec3, angle: f32, scale: f32) -> Mat4 {
    let unit = nalgebra::Unit::new_normalize(*axis);
    let rotation = nalgebra::Rotation3::from_axis_angle(&unit, angle);
    let mut m = rotation.to_homogeneous();
    for c in 0..3 {
        for r in 0..3 {
            m[(r, c)] *= scale;
        }
    }
    m
}

/// Build a matrix containing only non-uniform scale.
pub fn mat4_from_scale(scale: &Vec3) -> Mat4 {
    Mat4::new_nonuniform_scaling(scale)
}

/// Return `m` with its translation column replaced by `t`.
pub fn with_translation(m: &Mat4, t: &Vec3) -> Mat4 {
    let mut out = *m;
    out[(0, 3)] = t.x;
    out[(1, 3)] = t.y;
    out[(2, 3)] = t.z;
    out
}

/// Position relative to a floating origin, narrowed to `f32` only after the
/// subtraction has been done in `f64`.
pub fn camera_relative(position: &DVec3, origin: &DVec3) -> Vec3 {
    (position - origin).cast::<f32>()
}

/// Invert a transform using double precision intermediates.
///
/// Transforms with non-uniform scale cannot use the cheap orthonormal
/// inverse, and a plain `f32` inverse loses precision on close-up views.
/// Returns `None` for singular matrices.
pub fn inverse_f64(m: &Mat4) -> Option<Mat4> {
    let md: DMat4 = m.cast::<f64>();
    md.try_inverse().map(|inv| inv.cast::<f32>())
}

/// First three rows of a matrix in row-major order.
pub fn to_rows_3x4(m: &Mat4) -> Rows3x4 {
    let mut rows = [[0.0; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    rows
}

/// Column-major `[[f32; 4]; 4]` array, the layout GPU constant blocks use.
pub fn mat4_to_cols_array_2d(m: &Mat4) -> [[f32; 4]; 4] {
    let s = m.as_slice();
    [
        [s[0], s[1], s[2], s[3]],
        [s[4], s[5], s[6], s[7]],
        [s[8], s[9], s[10], s[11]],
        [s[12], s[13], s[14], s[15]],
    ]
}

/// Hermite interpolation between `edge0` and `edge1`, clamped to `[0, 1]`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Linear interpolation.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Triangle wave with period 1: 0 at integers, 1 half way between.
pub fn wave_triangle(x: f64) -> f64 {
    let f = x - x.floor();
    1.0 - (2.0 * f - 1.0).abs()
}

/// Direction towards the sun from azimuth/elevation in degrees (z is up).
pub fn sun_direction(azimuth_deg: f32, elevation_deg: f32) -> Vec3 {
    let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();
    let (sin_el, cos_el) = elevation_deg.to_radians().sin_cos();
    Vec3::new(cos_az * cos_el, sin_az * cos_el, sin_el)
}

/// Round `value` up to a multiple of `alignment` (which must be non-zero).
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
