//! Scene representation for the ray tracing frame loop.
//!
//! - [`Scene`] - Shared geometry, meshes, materials and placed instances
//! - [`Instance`] - A placed mesh with current and previous transforms
//! - [`Material`] / [`AlphaMode`] - Per-instance classification inputs
//! - [`AnimatedPool`] - Procedurally animated clones of template instances

mod animation;
pub mod generators;
mod types;

pub use animation::{
    ANIMATED_INSTANCE_MAX_NUM, AnimatedInstance, AnimatedPool, AnimationParams, animation_speed,
};
pub use types::{Aabb, AlphaMode, Instance, Material, Mesh, Scene};
