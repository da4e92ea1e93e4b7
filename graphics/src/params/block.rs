//! Fixed-layout mirrors of [`RenderSettings`] and [`CameraState`].
//!
//! These are the records stored in test-case files. Booleans are packed into
//! flag words so the blocks stay `Pod`.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use rtframe_core::math::{DVec3, Mat4, mat4_to_cols_array_2d};

use super::{CameraState, DenoiserKind, DenoiserTunables, PrePassMode, RenderSettings};
use crate::error::{GraphicsError, GraphicsResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TunableFlags: u32 {
        const REFERENCE_ACCUMULATION = 1 << 0;
        const ANTILAG_INTENSITY = 1 << 1;
        const ANTILAG_HIT_DISTANCE = 1 << 2;
        const ANTI_FIREFLY = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SettingsFlags: u32 {
        const LIMIT_FPS = 1 << 0;
        const PRIMARY_FULL_BRDF = 1 << 1;
        const INDIRECT_FULL_BRDF = 1 << 2;
        const INDIRECT_DIFFUSE = 1 << 3;
        const INDIRECT_SPECULAR = 1 << 4;
        const NORMAL_MAP = 1 << 5;
        const MIP = 1 << 6;
        const METAL_AMBIENT = 1 << 7;
        const TAA = 1 << 8;
        const SPEC_SECOND_BOUNCE = 1 << 9;
        const DIFF_SECOND_BOUNCE = 1 << 10;
        const ANIMATED_OBJECTS = 1 << 11;
        const ANIMATE_SUN = 1 << 12;
        const BLINK = 1 << 13;
        const PAUSE_ANIMATION = 1 << 14;
        const EMISSION = 1 << 15;
        const WORLD_SPACE_MOTION = 1 << 16;
        const EMISSIVE_OBJECTS = 1 << 17;
        const IMPORTANCE_SAMPLING = 1 << 18;
        const SPECULAR_LOBE_TRIMMING = 1 << 19;
        const BLUE_NOISE = 1 << 20;
        const ORTHO = 1 << 21;
    }
}

/// Persisted form of [`RenderSettings`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SettingsBlock {
    pub blur_radius: f32,
    pub adaptive_radius_scale: f32,
    pub stabilization_strength: f32,
    pub normal_weight_strictness: f32,
    pub disocclusion_threshold: f32,
    pub residual_noise_level: f32,
    pub max_accumulated_frames: i32,
    pub max_fast_accumulated_frames: i32,
    pub pre_pass_mode: i32,
    pub tunable_flags: u32,

    pub max_fps: f32,
    pub cam_fov: f32,
    pub sun_azimuth: f32,
    pub sun_elevation: f32,
    pub sun_angular_diameter: f32,
    pub exposure: f32,
    pub roughness_override: f32,
    pub metalness_override: f32,
    pub emission_intensity: f32,
    pub sky_ambient: f32,
    pub debug: f32,
    pub meter_to_units: f32,
    pub animated_object_scale: f32,
    pub separator: f32,
    pub animation_speed: f32,
    pub diff_hit_dist_scale: f32,
    pub spec_hit_dist_scale: f32,

    pub on_screen: i32,
    pub forced_material: i32,
    pub animated_object_count: i32,
    pub denoiser: i32,
    pub rpp: i32,
    pub flags: u32,
}

const_assert_eq!(std::mem::size_of::<SettingsBlock>(), 132);

impl From<&RenderSettings> for SettingsBlock {
    fn from(s: &RenderSettings) -> Self {
        let t = &s.denoiser_tunables;

        let mut tunable_flags = TunableFlags::empty();
        tunable_flags.set(TunableFlags::REFERENCE_ACCUMULATION, t.reference_accumulation);
        tunable_flags.set(TunableFlags::ANTILAG_INTENSITY, t.antilag_intensity);
        tunable_flags.set(TunableFlags::ANTILAG_HIT_DISTANCE, t.antilag_hit_distance);
        tunable_flags.set(TunableFlags::ANTI_FIREFLY, t.anti_firefly);

        let mut flags = SettingsFlags::empty();
        for (flag, value) in [
            (SettingsFlags::LIMIT_FPS, s.limit_fps),
            (SettingsFlags::PRIMARY_FULL_BRDF, s.primary_full_brdf),
            (SettingsFlags::INDIRECT_FULL_BRDF, s.indirect_full_brdf),
            (SettingsFlags::INDIRECT_DIFFUSE, s.indirect_diffuse),
            (SettingsFlags::INDIRECT_SPECULAR, s.indirect_specular),
            (SettingsFlags::NORMAL_MAP, s.normal_map),
            (SettingsFlags::MIP, s.mip),
            (SettingsFlags::METAL_AMBIENT, s.metal_ambient),
            (SettingsFlags::TAA, s.taa),
            (SettingsFlags::SPEC_SECOND_BOUNCE, s.spec_second_bounce),
            (SettingsFlags::DIFF_SECOND_BOUNCE, s.diff_second_bounce),
            (SettingsFlags::ANIMATED_OBJECTS, s.animated_objects),
            (SettingsFlags::ANIMATE_SUN, s.animate_sun),
            (SettingsFlags::BLINK, s.blink),
            (SettingsFlags::PAUSE_ANIMATION, s.pause_animation),
            (SettingsFlags::EMISSION, s.emission),
            (SettingsFlags::WORLD_SPACE_MOTION, s.motion_vectors_in_world_space),
            (SettingsFlags::EMISSIVE_OBJECTS, s.emissive_objects),
            (SettingsFlags::IMPORTANCE_SAMPLING, s.importance_sampling),
            (SettingsFlags::SPECULAR_LOBE_TRIMMING, s.specular_lobe_trimming),
            (SettingsFlags::BLUE_NOISE, s.blue_noise),
            (SettingsFlags::ORTHO, s.ortho),
        ] {
            flags.set(flag, value);
        }

        Self {
            blur_radius: t.blur_radius,
            adaptive_radius_scale: t.adaptive_radius_scale,
            stabilization_strength: t.stabilization_strength,
            normal_weight_strictness: t.normal_weight_strictness,
            disocclusion_threshold: t.disocclusion_threshold,
            residual_noise_level: t.residual_noise_level,
            max_accumulated_frames: t.max_accumulated_frames as i32,
            max_fast_accumulated_frames: t.max_fast_accumulated_frames as i32,
            pre_pass_mode: t.pre_pass_mode as i32,
            tunable_flags: tunable_flags.bits(),
            max_fps: s.max_fps,
            cam_fov: s.cam_fov,
            sun_azimuth: s.sun_azimuth,
            sun_elevation: s.sun_elevation,
            sun_angular_diameter: s.sun_angular_diameter,
            exposure: s.exposure,
            roughness_override: s.roughness_override,
            metalness_override: s.metalness_override,
            emission_intensity: s.emission_intensity,
            sky_ambient: s.sky_ambient,
            debug: s.debug,
            meter_to_units: s.meter_to_units,
            animated_object_scale: s.animated_object_scale,
            separator: s.separator,
            animation_speed: s.animation_speed,
            diff_hit_dist_scale: s.diff_hit_dist_scale,
            spec_hit_dist_scale: s.spec_hit_dist_scale,
            on_screen: s.on_screen,
            forced_material: s.forced_material,
            animated_object_count: s.animated_object_count as i32,
            denoiser: s.denoiser as i32,
            rpp: s.rpp as i32,
            flags: flags.bits(),
        }
    }
}

fn non_negative(name: &str, value: i32) -> GraphicsResult<u32> {
    u32::try_from(value)
        .map_err(|_| GraphicsError::InvalidParameter(format!("{name} is negative: {value}")))
}

impl TryFrom<&SettingsBlock> for RenderSettings {
    type Error = GraphicsError;

    fn try_from(b: &SettingsBlock) -> GraphicsResult<Self> {
        let pre_pass_mode = PrePassMode::from_raw(b.pre_pass_mode).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown pre-pass mode {}", b.pre_pass_mode))
        })?;
        let denoiser = DenoiserKind::from_raw(b.denoiser).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown denoiser {}", b.denoiser))
        })?;
        let tf = TunableFlags::from_bits_truncate(b.tunable_flags);
        let f = SettingsFlags::from_bits_truncate(b.flags);

        Ok(Self {
            denoiser_tunables: DenoiserTunables {
                blur_radius: b.blur_radius,
                adaptive_radius_scale: b.adaptive_radius_scale,
                stabilization_strength: b.stabilization_strength,
                normal_weight_strictness: b.normal_weight_strictness,
                disocclusion_threshold: b.disocclusion_threshold,
                residual_noise_level: b.residual_noise_level,
                max_accumulated_frames: non_negative("max accumulated frames", b.max_accumulated_frames)?,
                max_fast_accumulated_frames: non_negative(
                    "max fast accumulated frames",
                    b.max_fast_accumulated_frames,
                )?,
                pre_pass_mode,
                reference_accumulation: tf.contains(TunableFlags::REFERENCE_ACCUMULATION),
                antilag_intensity: tf.contains(TunableFlags::ANTILAG_INTENSITY),
                antilag_hit_distance: tf.contains(TunableFlags::ANTILAG_HIT_DISTANCE),
                anti_firefly: tf.contains(TunableFlags::ANTI_FIREFLY),
            },
            max_fps: b.max_fps,
            cam_fov: b.cam_fov,
            sun_azimuth: b.sun_azimuth,
            sun_elevation: b.sun_elevation,
            sun_angular_diameter: b.sun_angular_diameter,
            exposure: b.exposure,
            roughness_override: b.roughness_override,
            metalness_override: b.metalness_override,
            emission_intensity: b.emission_intensity,
            sky_ambient: b.sky_ambient,
            debug: b.debug,
            meter_to_units: b.meter_to_units,
            animated_object_scale: b.animated_object_scale,
            separator: b.separator,
            animation_speed: b.animation_speed,
            diff_hit_dist_scale: b.diff_hit_dist_scale,
            spec_hit_dist_scale: b.spec_hit_dist_scale,
            on_screen: b.on_screen,
            forced_material: b.forced_material,
            animated_object_count: non_negative("animated object count", b.animated_object_count)?,
            denoiser,
            rpp: non_negative("rpp", b.rpp)?,
            limit_fps: f.contains(SettingsFlags::LIMIT_FPS),
            primary_full_brdf: f.contains(SettingsFlags::PRIMARY_FULL_BRDF),
            indirect_full_brdf: f.contains(SettingsFlags::INDIRECT_FULL_BRDF),
            indirect_diffuse: f.contains(SettingsFlags::INDIRECT_DIFFUSE),
            indirect_specular: f.contains(SettingsFlags::INDIRECT_SPECULAR),
            normal_map: f.contains(SettingsFlags::NORMAL_MAP),
            mip: f.contains(SettingsFlags::MIP),
            metal_ambient: f.contains(SettingsFlags::METAL_AMBIENT),
            taa: f.contains(SettingsFlags::TAA),
            spec_second_bounce: f.contains(SettingsFlags::SPEC_SECOND_BOUNCE),
            diff_second_bounce: f.contains(SettingsFlags::DIFF_SECOND_BOUNCE),
            animated_objects: f.contains(SettingsFlags::ANIMATED_OBJECTS),
            animate_sun: f.contains(SettingsFlags::ANIMATE_SUN),
            blink: f.contains(SettingsFlags::BLINK),
            pause_animation: f.contains(SettingsFlags::PAUSE_ANIMATION),
            emission: f.contains(SettingsFlags::EMISSION),
            motion_vectors_in_world_space: f.contains(SettingsFlags::WORLD_SPACE_MOTION),
            emissive_objects: f.contains(SettingsFlags::EMISSIVE_OBJECTS),
            importance_sampling: f.contains(SettingsFlags::IMPORTANCE_SAMPLING),
            specular_lobe_trimming: f.contains(SettingsFlags::SPECULAR_LOBE_TRIMMING),
            blue_noise: f.contains(SettingsFlags::BLUE_NOISE),
            ortho: f.contains(SettingsFlags::ORTHO),
        })
    }
}

/// Persisted form of [`CameraState`]. Matrices are column-major.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraStateBlock {
    pub global_position: [f64; 3],
    pub world_to_view: [[f32; 4]; 4],
    pub view_to_world: [[f32; 4]; 4],
    pub view_to_clip: [[f32; 4]; 4],
    pub world_to_clip: [[f32; 4]; 4],
    pub frustum: [f32; 4],
    pub viewport_jitter: [f32; 2],
    pub ortho: u32,
    pub _pad: u32,
}

const_assert_eq!(std::mem::size_of::<CameraStateBlock>(), 312);

fn from_cols(cols: &[[f32; 4]; 4]) -> Mat4 {
    Mat4::from_column_slice(bytemuck::cast_slice(cols))
}

impl From<&CameraState> for CameraStateBlock {
    fn from(c: &CameraState) -> Self {
        Self {
            global_position: [c.global_position.x, c.global_position.y, c.global_position.z],
            world_to_view: mat4_to_cols_array_2d(&c.world_to_view),
            view_to_world: mat4_to_cols_array_2d(&c.view_to_world),
            view_to_clip: mat4_to_cols_array_2d(&c.view_to_clip),
            world_to_clip: mat4_to_cols_array_2d(&c.world_to_clip),
            frustum: c.frustum,
            viewport_jitter: c.viewport_jitter,
            ortho: c.ortho as u32,
            _pad: 0,
        }
    }
}

impl From<&CameraStateBlock> for CameraState {
    fn from(b: &CameraStateBlock) -> Self {
        let [x, y, z] = b.global_position;
        Self {
            world_to_view: from_cols(&b.world_to_view),
            view_to_world: from_cols(&b.view_to_world),
            view_to_clip: from_cols(&b.view_to_clip),
            world_to_clip: from_cols(&b.world_to_clip),
            global_position: DVec3::new(x, y, z),
            frustum: b.frustum,
            viewport_jitter: b.viewport_jitter,
            ortho: b.ortho != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtframe_core::math::Vec3;

    #[test]
    fn test_default_settings_survive_block() {
        let settings = RenderSettings::default();
        let block = SettingsBlock::from(&settings);
        assert_eq!(RenderSettings::try_from(&block).unwrap(), settings);
    }

    #[test]
    fn test_flags_are_independent() {
        let settings = RenderSettings {
            ortho: true,
            taa: false,
            denoiser: DenoiserKind::Relax,
            rpp: 2,
            ..Default::default()
        };
        let restored = RenderSettings::try_from(&SettingsBlock::from(&settings)).unwrap();
        assert!(restored.ortho);
        assert!(!restored.taa);
        assert!(restored.blue_noise);
        assert_eq!(restored.denoiser, DenoiserKind::Relax);
        assert_eq!(restored.rpp, 2);
    }

    #[test]
    fn test_corrupt_block_is_rejected() {
        let mut block = SettingsBlock::from(&RenderSettings::default());
        block.denoiser = 7;
        assert!(matches!(
            RenderSettings::try_from(&block),
            Err(GraphicsError::InvalidParameter(_))
        ));

        let mut block = SettingsBlock::from(&RenderSettings::default());
        block.rpp = -1;
        assert!(RenderSettings::try_from(&block).is_err());
    }

    #[test]
    fn test_camera_block_preserves_matrices() {
        let camera = CameraState::perspective(
            DVec3::new(1.0e6, 2.5, -3.0),
            Vec3::new(0.3, 1.0, 0.1),
            75.0,
            2.0,
            1.0,
        )
        .with_jitter(3);
        let restored = CameraState::from(&CameraStateBlock::from(&camera));
        assert_eq!(restored, camera);
    }
}
