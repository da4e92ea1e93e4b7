//! Procedural animation for the pool of animated instances.
//!
//! The pool is created once, right after scene load, by cloning template
//! instances. Each frame the first `count` pool entries move along an
//! ellipse and spin around a random axis.

use std::f32::consts::PI;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::types::Scene;
use crate::math::{DVec3, Mat4, Vec3, mat4_from_axis_angle_scale};

/// Maximum number of animated instances appended to a scene.
pub const ANIMATED_INSTANCE_MAX_NUM: usize = 512;

/// Seed for the pool layout so every run produces the same motion.
const POOL_SEED: u64 = 106937;

/// Per-instance motion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationParams {
    pub rotation_axis: Vec3,
    pub ellipse_axis: Vec3,
    pub duration_sec: f32,
    pub progressed_sec: f32,
    pub inverse_rotation: f32,
    pub inverse_direction: f32,
    pub angle_rad: f32,
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            rotation_axis: Vec3::z(),
            ellipse_axis: Vec3::zeros(),
            duration_sec: 5.0,
            progressed_sec: 0.0,
            inverse_rotation: 1.0,
            inverse_direction: 1.0,
            angle_rad: 0.0,
        }
    }
}

/// One entry of the animated pool.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedInstance {
    /// Current world position.
    pub position: DVec3,
    /// Centre of the ellipse.
    pub base_position: DVec3,
    pub animation: AnimationParams,
    /// Index of the driven instance in [`Scene::instances`].
    pub instance_index: usize,
}

impl AnimatedInstance {
    /// Advance by `elapsed_sec` and return the new rotation/scale transform.
    ///
    /// Also updates [`position`](Self::position).
    pub fn animate(&mut self, elapsed_sec: f32, scale: f32) -> Mat4 {
        let anim = &mut self.animation;

        let weight = (anim.progressed_sec + elapsed_sec) / anim.duration_sec;
        let weight = PI * (weight * 2.0 - 1.0);

        let (sin, cos) = (weight * anim.inverse_direction).sin_cos();
        let local = Vec3::new(cos, sin, sin);

        self.position = self.base_position + local.component_mul(&anim.ellipse_axis).cast::<f64>() * scale as f64;

        anim.angle_rad = weight * anim.inverse_rotation;
        anim.progressed_sec += elapsed_sec;
        if anim.progressed_sec >= anim.duration_sec {
            anim.progressed_sec = 0.0;
        }

        mat4_from_axis_angle_scale(&anim.rotation_axis, anim.angle_rad, scale)
    }
}

/// The animated instance pool attached to a scene.
#[derive(Debug, Clone, Default)]
pub struct AnimatedPool {
    instances: Vec<AnimatedInstance>,
}

fn uniform3(rng: &mut SmallRng) -> Vec3 {
    Vec3::new(rng.r#gen(), rng.r#gen(), rng.r#gen())
}

fn signed1(rng: &mut SmallRng) -> f32 {
    rng.gen_range(-1.0..1.0)
}

fn signed3(rng: &mut SmallRng) -> Vec3 {
    Vec3::new(signed1(rng), signed1(rng), signed1(rng))
}

fn sign(x: f32) -> f32 {
    if x < 0.0 { -1.0 } else { 1.0 }
}

impl AnimatedPool {
    /// Append `pool_size` animated clones of the template instances to
    /// `scene` and return their motion state.
    ///
    /// Slot `i` clones template `i % template_instance_count`. A scene
    /// without templates gets an empty pool.
    pub fn setup(scene: &mut Scene, pool_size: usize) -> Self {
        let template_count = scene.template_instance_count;
        if pool_size == 0 {
            log::info!("Animated pool size is 0, animated pool disabled");
            return Self::default();
        }
        if template_count == 0 {
            log::warn!("Scene has no template instances, animated pool disabled");
            return Self::default();
        }

        let aabb = scene.bounds();
        let (min, max) = if aabb.is_empty() {
            (Vec3::zeros(), Vec3::zeros())
        } else {
            (aabb.min, aabb.max)
        };
        let max_size = max.abs() + min.abs();

        let mut rng = SmallRng::seed_from_u64(POOL_SEED);
        let mut instances = Vec::with_capacity(pool_size);

        for i in 0..pool_size {
            let template = scene.instances[i % template_count].clone();
            let position = (uniform3(&mut rng).component_mul(&max_size) - min.abs()).cast::<f64>();

            let duration_sec = rng.r#gen::<f32>() * 10.0 + 5.0;
            let progressed_sec = duration_sec * rng.r#gen::<f32>();
            let rotation_axis = (signed3(&mut rng) + Vec3::repeat(1e-6)).normalize();
            let ellipse_axis = signed3(&mut rng) * 5.0;
            let inverse_direction = sign(signed1(&mut rng));
            let inverse_rotation = sign(signed1(&mut rng));

            instances.push(AnimatedInstance {
                position,
                base_position: position,
                animation: AnimationParams {
                    rotation_axis,
                    ellipse_axis,
                    duration_sec,
                    progressed_sec,
                    inverse_rotation,
                    inverse_direction,
                    angle_rad: 0.0,
                },
                instance_index: scene.instances.len(),
            });
            scene.instances.push(template);
        }

        scene.animated_instance_count = pool_size;
        log::debug!("Animated pool: {} instances from {} templates", pool_size, template_count);

        Self { instances }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AnimatedInstance> {
        self.instances.get(index)
    }

    /// Animate the first `count` pool entries and write their transforms
    /// into `scene`.
    pub fn animate(&mut self, scene: &mut Scene, count: usize, elapsed_sec: f32, scale: f32) {
        let count = count.min(self.instances.len());
        for animated in &mut self.instances[..count] {
            let transform = animated.animate(elapsed_sec, scale);
            if let Some(instance) = scene.instances.get_mut(animated.instance_index) {
                instance.rotation = transform;
                instance.position = animated.position;
            }
        }
    }
}

/// Playback multiplier for animation time.
///
/// Negative speeds slow playback down, positive speeds speed it up and a
/// paused animation does not advance at all.
pub fn animation_speed(paused: bool, speed: f32) -> f32 {
    if paused {
        0.0
    } else if speed < 0.0 {
        1.0 / (1.0 + speed.abs())
    } else {
        1.0 + speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Instance, Material};

    fn template_scene(templates: usize) -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(&[[-1.0; 3], [1.0, -1.0, -1.0], [1.0; 3]], &[0, 1, 2]);
        let material = scene.add_material(Material::DEFAULT);
        for i in 0..templates {
            scene.add_instance(Instance::new(
                mesh,
                material,
                DVec3::new(i as f64, 0.0, 0.0),
                Mat4::identity(),
            ));
        }
        scene.template_instance_count = templates;
        scene
    }

    #[test]
    fn test_pool_setup_appends_instances() {
        let mut scene = template_scene(3);
        let pool = AnimatedPool::setup(&mut scene, 8);

        assert_eq!(pool.len(), 8);
        assert_eq!(scene.instances.len(), 11);
        assert_eq!(scene.animated_instance_count, 8);
        assert_eq!(scene.static_instance_end(), 3);
        assert_eq!(pool.get(4).map(|a| a.instance_index), Some(7));
    }

    #[test]
    fn test_pool_is_deterministic() {
        let mut a = template_scene(2);
        let mut b = template_scene(2);
        let pa = AnimatedPool::setup(&mut a, 16);
        let pb = AnimatedPool::setup(&mut b, 16);
        for i in 0..16 {
            assert_eq!(pa.get(i), pb.get(i));
        }
    }

    #[test]
    fn test_pool_without_templates_is_empty() {
        let mut scene = template_scene(0);
        let pool = AnimatedPool::setup(&mut scene, 8);
        assert!(pool.is_empty());
        assert_eq!(scene.animated_instance_count, 0);
    }

    #[test]
    fn test_pool_of_size_zero_is_empty() {
        let mut scene = template_scene(3);
        let pool = AnimatedPool::setup(&mut scene, 0);
        assert!(pool.is_empty());
        assert_eq!(scene.instances.len(), 3);
        assert_eq!(scene.animated_instance_count, 0);
    }

    #[test]
    fn test_animate_wraps_progress() {
        let mut animated = AnimatedInstance {
            position: DVec3::zeros(),
            base_position: DVec3::zeros(),
            animation: AnimationParams {
                duration_sec: 1.0,
                progressed_sec: 0.9,
                ..Default::default()
            },
            instance_index: 0,
        };
        animated.animate(0.2, 1.0);
        assert_eq!(animated.animation.progressed_sec, 0.0);
        animated.animate(0.25, 1.0);
        assert!((animated.animation.progressed_sec - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_animate_only_moves_active_count() {
        let mut scene = template_scene(1);
        let mut pool = AnimatedPool::setup(&mut scene, 4);
        let before: Vec<_> = scene.instances.iter().map(|i| i.position).collect();

        pool.animate(&mut scene, 2, 0.5, 1.0);

        assert_ne!(scene.instances[1].position, before[1]);
        assert_eq!(scene.instances[3].position, before[3]);
        assert_eq!(scene.instances[4].position, before[4]);
    }

    #[test]
    fn test_animation_speed() {
        assert_eq!(animation_speed(true, 5.0), 0.0);
        assert_eq!(animation_speed(false, 0.0), 1.0);
        assert_eq!(animation_speed(false, 1.0), 2.0);
        assert_eq!(animation_speed(false, -1.0), 0.5);
    }
}
