//! Procedural geometry for test and demo scenes.

use super::types::Scene;

/// Append an axis-aligned cube with the given half extent to `scene`.
///
/// Returns the mesh index. The cube has 8 shared corners and 12 triangles.
pub fn add_cube(scene: &mut Scene, half_extent: f32) -> u32 {
    let h = half_extent;
    let positions = [
        [-h, -h, -h],
        [h, -h, -h],
        [h, h, -h],
        [-h, h, -h],
        [-h, -h, h],
        [h, -h, h],
        [h, h, h],
        [-h, h, h],
    ];
    #[rustfmt::skip]
    let indices = [
        0, 2, 1, 0, 3, 2, // -z
        4, 5, 6, 4, 6, 7, // +z
        0, 1, 5, 0, 5, 4, // -y
        3, 7, 6, 3, 6, 2, // +y
        0, 4, 7, 0, 7, 3, // -x
        1, 2, 6, 1, 6, 5, // +x
    ];
    scene.add_mesh(&positions, &indices)
}

/// Append a flat quad in the XY plane to `scene`. Returns the mesh index.
pub fn add_quad(scene: &mut Scene, half_extent: f32) -> u32 {
    let h = half_extent;
    let positions = [[-h, -h, 0.0], [h, -h, 0.0], [h, h, 0.0], [-h, h, 0.0]];
    scene.add_mesh(&positions, &[0, 1, 2, 0, 2, 3])
}
