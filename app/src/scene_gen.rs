//! Procedural demo scene.
//!
//! The scheduler only needs meshes, materials and placed instances, so the
//! driver builds a small city of cubes and panels instead of loading assets.

use rtframe_core::math::{DVec3, Mat4, Vec3};
use rtframe_core::scene::{AlphaMode, Instance, Material, Scene, generators};

/// Shape of the generated scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLayout {
    /// Grid cells per side.
    pub grid: usize,
    /// Every n-th cell holds a glass panel.
    pub transparent_every: usize,
    /// Every n-th cell holds a lamp.
    pub emissive_every: usize,
}

impl Default for SceneLayout {
    fn default() -> Self {
        Self {
            grid: 12,
            transparent_every: 7,
            emissive_every: 11,
        }
    }
}

/// Spacing between grid cells in scene units.
const CELL_SIZE: f64 = 4.0;

/// Build the demo scene.
///
/// The first instances are animation templates: one cube and one panel.
pub fn build(layout: SceneLayout) -> Scene {
    let mut scene = Scene::new();
    let cube = generators::add_cube(&mut scene, 0.5);
    let panel = generators::add_quad(&mut scene, 1.0);

    let stone = scene.add_material(Material::DEFAULT);
    let painted = scene.add_material(Material::DEFAULT.with_base_color([0.8, 0.3, 0.2, 1.0]));
    let glass = scene.add_material(
        Material::DEFAULT
            .with_alpha_mode(AlphaMode::Transparent)
            .with_base_color([0.9, 0.95, 1.0, 0.2]),
    );
    let lamp = scene.add_material(
        Material::DEFAULT
            .with_emission(true)
            .with_base_color([1.0, 0.9, 0.7, 1.0]),
    );

    scene.add_instance(Instance::new(cube, painted, DVec3::zeros(), Mat4::identity()));
    scene.add_instance(Instance::new(panel, glass, DVec3::zeros(), Mat4::identity()));
    scene.template_instance_count = 2;

    let half = layout.grid as f64 * CELL_SIZE * 0.5;
    for cell in 0..layout.grid * layout.grid {
        let x = (cell % layout.grid) as f64 * CELL_SIZE - half;
        let y = (cell / layout.grid) as f64 * CELL_SIZE - half;
        let height = 1.0 + (cell * 7 % 5) as f32;

        let (mesh, material) = if cell % layout.emissive_every == 0 {
            (cube, lamp)
        } else if cell % layout.transparent_every == 0 {
            (panel, glass)
        } else {
            (cube, stone)
        };
        let scale = Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 1.0, height));
        let position = DVec3::new(x, y, height as f64 * 0.5);
        scene.add_instance(Instance::new(mesh, material, position, scale));
    }

    log::info!(
        "Generated scene: {} meshes, {} materials, {} instances",
        scene.meshes.len(),
        scene.materials.len(),
        scene.instances.len()
    );
    scene
}

/// Distance from the scene center to its farthest instance.
pub fn radius(layout: SceneLayout) -> f64 {
    layout.grid as f64 * CELL_SIZE * std::f64::consts::FRAC_1_SQRT_2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_come_first() {
        let scene = build(SceneLayout::default());
        assert_eq!(scene.template_instance_count, 2);
        assert_eq!(scene.instances.len(), 2 + 144);
    }

    #[test]
    fn test_material_mix() {
        let scene = build(SceneLayout::default());
        let materials: Vec<_> = scene.instances[2..]
            .iter()
            .map(|i| scene.materials[i.material_index as usize])
            .collect();
        assert!(materials.iter().any(Material::is_emissive));
        assert!(materials.iter().any(Material::is_transparent));
        assert!(materials.iter().any(Material::is_opaque));
    }

    #[test]
    fn test_radius_covers_grid() {
        let layout = SceneLayout::default();
        assert!(radius(layout) > layout.grid as f64 * CELL_SIZE * 0.5);
    }
}
