//! Scene data types consumed by the acceleration structure builder.
//!
//! Geometry is stored in flat shared arrays ([`Scene::positions`],
//! [`Scene::indices`]) and meshes reference ranges inside them.

use crate::math::{DVec3, Mat4, Vec3, camera_relative, with_translation};

/// A triangle mesh referencing ranges of the scene's shared geometry arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    /// First vertex in [`Scene::positions`].
    pub vertex_offset: u32,
    /// Number of vertices.
    pub vertex_count: u32,
    /// First index in [`Scene::indices`].
    pub index_offset: u32,
    /// Number of indices (three per triangle).
    pub index_count: u32,
}

impl Mesh {
    /// Index of the mesh's first primitive in the scene-wide primitive list.
    pub fn base_primitive_id(&self) -> u32 {
        self.index_offset / 3
    }

    /// Vertex range inside [`Scene::positions`].
    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.vertex_offset as usize..(self.vertex_offset + self.vertex_count) as usize
    }

    /// Index range inside [`Scene::indices`].
    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.index_offset as usize..(self.index_offset + self.index_count) as usize
    }
}

/// How a material's alpha channel is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    /// Fully opaque; ray hits never need any-hit evaluation.
    #[default]
    Opaque,
    /// Alpha tested.
    AlphaOpaque,
    /// Alpha blended.
    Transparent,
    /// Permanently disabled; instances using it are never rendered.
    Off,
}

/// Surface description reduced to what per-frame instance classification needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Alpha interpretation.
    pub alpha_mode: AlphaMode,
    /// Whether the material emits light.
    pub emissive: bool,
    /// Average base color (linear RGBA).
    pub avg_base_color: [f32; 4],
    /// Average specular color (linear RGB).
    pub avg_specular_color: [f32; 3],
}

impl Material {
    /// Opaque, non-emissive grey material.
    pub const DEFAULT: Self = Self {
        alpha_mode: AlphaMode::Opaque,
        emissive: false,
        avg_base_color: [0.5, 0.5, 0.5, 1.0],
        avg_specular_color: [0.04, 0.04, 0.04],
    };

    /// Returns this material with a different alpha mode.
    #[must_use]
    pub const fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }

    /// Returns this material marked as emissive.
    #[must_use]
    pub const fn with_emission(mut self, emissive: bool) -> Self {
        self.emissive = emissive;
        self
    }

    /// Returns this material with a different average base color.
    #[must_use]
    pub const fn with_base_color(mut self, color: [f32; 4]) -> Self {
        self.avg_base_color = color;
        self
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha_mode == AlphaMode::Opaque
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_mode == AlphaMode::Transparent
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive && !self.is_off()
    }

    pub fn is_off(&self) -> bool {
        self.alpha_mode == AlphaMode::Off
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A placed mesh.
///
/// `rotation` carries rotation and scale with a zero translation column; the
/// world position is kept separately in double precision. The `*_prev`
/// fields hold last frame's values and are refreshed by the TLAS rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Index into [`Scene::meshes`].
    pub mesh_index: u32,
    /// Index into [`Scene::materials`].
    pub material_index: u32,
    /// World position.
    pub position: DVec3,
    /// Rotation and scale.
    pub rotation: Mat4,
    /// World position last frame.
    pub position_prev: DVec3,
    /// Rotation and scale last frame.
    pub rotation_prev: Mat4,
}

impl Instance {
    /// Create an instance whose previous transform equals the current one.
    pub fn new(mesh_index: u32, material_index: u32, position: DVec3, rotation: Mat4) -> Self {
        Self {
            mesh_index,
            material_index,
            position,
            rotation,
            position_prev: position,
            rotation_prev: rotation,
        }
    }

    /// Object-to-world transform relative to a floating origin.
    pub fn object_to_world(&self, origin: &DVec3) -> Mat4 {
        with_translation(&self.rotation, &camera_relative(&self.position, origin))
    }

    /// Last frame's object-to-world transform relative to the same origin.
    pub fn object_to_world_prev(&self, origin: &DVec3) -> Mat4 {
        with_translation(&self.rotation_prev, &camera_relative(&self.position_prev, origin))
    }

    /// Capture the current transform as "previous" for the next frame.
    pub fn store_previous(&mut self) {
        self.position_prev = self.position;
        self.rotation_prev = self.rotation;
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that any point expands.
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(f32::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Grow the box to include `p`.
    pub fn expand(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the diagonal length.
    pub fn radius(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            (self.max - self.min).norm() * 0.5
        }
    }
}

/// Renderable scene: shared geometry, meshes, materials and instances.
///
/// Instances are laid out in three consecutive groups:
///
/// ```text
/// [ templates | static instances | animated pool ]
///   0..template_instance_count       ..instances.len()
/// ```
///
/// Templates are only used as sources when the animated pool is created and
/// are never placed into a TLAS.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Vertex positions shared by all meshes.
    pub positions: Vec<[f32; 3]>,
    /// Triangle indices shared by all meshes.
    pub indices: Vec<u32>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub instances: Vec<Instance>,
    /// Number of leading template instances.
    pub template_instance_count: usize,
    /// Number of trailing animated instances.
    pub animated_instance_count: usize,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mesh built from local vertex positions and indices.
    ///
    /// Returns the mesh index.
    pub fn add_mesh(&mut self, positions: &[[f32; 3]], indices: &[u32]) -> u32 {
        let mesh = Mesh {
            vertex_offset: self.positions.len() as u32,
            vertex_count: positions.len() as u32,
            index_offset: self.indices.len() as u32,
            index_count: indices.len() as u32,
        };
        self.positions.extend_from_slice(positions);
        self.indices.extend_from_slice(indices);
        self.meshes.push(mesh);
        (self.meshes.len() - 1) as u32
    }

    /// Append a material. Returns the material index.
    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    /// Append a static instance. Must be called before the animated pool is created.
    pub fn add_instance(&mut self, instance: Instance) -> usize {
        debug_assert_eq!(
            self.animated_instance_count, 0,
            "static instances must precede the animated pool"
        );
        self.instances.push(instance);
        self.instances.len() - 1
    }

    /// Index of the first non-template instance.
    pub fn first_renderable_instance(&self) -> usize {
        self.template_instance_count
    }

    /// Index one past the last static instance.
    pub fn static_instance_end(&self) -> usize {
        self.instances.len() - self.animated_instance_count
    }

    /// Number of instances that can ever be placed into a TLAS.
    pub fn renderable_instance_count(&self) -> usize {
        self.instances.len() - self.template_instance_count
    }

    /// Bounding box of all non-template instances, in world space relative
    /// to the world origin.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for instance in &self.instances[self.template_instance_count..] {
            let Some(mesh) = self.meshes.get(instance.mesh_index as usize) else {
                continue;
            };
            let transform = with_translation(&instance.rotation, &instance.position.cast::<f32>());
            for p in &self.positions[mesh.vertex_range()] {
                let world = transform.transform_point(&nalgebra::Point3::new(p[0], p[1], p[2]));
                aabb.expand(&world.coords);
            }
        }
        aabb
    }
}
