//! Per-frame global constant block.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use rtframe_core::math::{Mat4, lerp, mat4_to_cols_array_2d, smoothstep};

use crate::params::{DenoiserKind, NEAR_Z, RenderParams};
use crate::types::Extent2d;

/// Constants read by every pass of one frame.
///
/// Field order and packing match the shader-side declaration.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalConstants {
    pub world_to_view: [[f32; 4]; 4],
    pub view_to_world: [[f32; 4]; 4],
    pub view_to_clip: [[f32; 4]; 4],
    pub world_to_clip_prev: [[f32; 4]; 4],
    pub world_to_clip: [[f32; 4]; 4],

    pub diff_hit_dist_params: [f32; 4],
    pub spec_hit_dist_params: [f32; 4],
    pub camera_frustum: [f32; 4],
    pub sun_direction_exposure: [f32; 4],
    pub world_origin_mip_bias: [f32; 4],
    pub trimming_params_emission_intensity: [f32; 4],
    pub view_direction_is_ortho: [f32; 4],

    pub output_size: [f32; 2],
    pub inv_output_size: [f32; 2],
    pub screen_size: [f32; 2],
    pub inv_screen_size: [f32; 2],
    pub rect_size: [f32; 2],
    pub inv_rect_size: [f32; 2],
    pub rect_size_prev: [f32; 2],
    pub jitter: [f32; 2],

    pub near_z: f32,
    pub ambient: f32,
    pub ambient_in_composition: f32,
    pub separator: f32,
    pub roughness_override: f32,
    pub metalness_override: f32,
    pub meter_to_units: f32,
    pub indirect_diffuse: f32,
    pub indirect_specular: f32,
    pub sun_angular_radius: f32,
    pub tan_sun_angular_radius: f32,
    pub pixel_angular_radius: f32,
    pub use_mipmapping: f32,
    pub debug: f32,
    pub diff_second_bounce: f32,
    pub transparent: f32,

    pub denoiser_type: u32,
    pub disable_shadows_and_enable_importance_sampling: u32,
    pub on_screen: u32,
    pub frame_index: u32,
    pub forced_material: u32,
    pub primary_full_brdf: u32,
    pub indirect_full_brdf: u32,
    pub use_normal_map: u32,
    pub world_space_motion: u32,
    pub blue_noise: u32,
    pub sample_count: u32,
    pub occlusion_only: u32,
}

const_assert_eq!(std::mem::size_of::<GlobalConstants>(), 608);
const_assert_eq!(std::mem::size_of::<GlobalConstants>() % 16, 0);

/// Frame state the constant block is derived from besides [`RenderParams`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantInputs {
    pub world_to_clip_prev: Mat4,
    pub output: Extent2d,
    pub screen: Extent2d,
    pub rect: Extent2d,
    pub rect_prev: Extent2d,
    pub resolution_scale: f32,
    /// An external upscaler produces the final image.
    pub upscaler_active: bool,
    pub frame_index: u32,
    /// Transparent geometry was found by the last TLAS rebuild.
    pub has_transparent: bool,
}

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

fn inverse(size: [f32; 2]) -> [f32; 2] {
    [1.0 / size[0], 1.0 / size[1]]
}

/// Hit distance normalization `(A, B, C, D)`; only `A` is user controlled.
pub fn hit_distance_params(scale: f32) -> [f32; 4] {
    [scale, 0.1, 20.0, -25.0]
}

impl GlobalConstants {
    pub fn new(params: &RenderParams, inputs: &ConstantInputs) -> Self {
        let settings = &params.settings;
        let camera = &params.camera;

        let sun = params.sun_direction();
        let emission_intensity = if settings.emission {
            settings.emission_intensity
        } else {
            0.0
        };
        let ambient_amount = (settings.sky_ambient
            + 2.0 * settings.metalness_override * flag(settings.metal_ambient))
            * 0.01;
        let sun_visibility = smoothstep(-0.9, 0.05, sun.z);
        let ambient =
            lerp(1000.0, 10000.0, sun.z.clamp(0.0, 1.0).sqrt()) * sun_visibility * ambient_amount;

        let output_size = inputs.output.as_f32();
        let screen_size = inputs.screen.as_f32();
        let rect_size = inputs.rect.as_f32();
        let jitter = if settings.taa {
            [
                camera.viewport_jitter[0] / rect_size[0],
                camera.viewport_jitter[1] / rect_size[1],
            ]
        } else {
            [0.0; 2]
        };

        let base_mip_bias = -0.5 + inputs.resolution_scale.log2();
        let mip_bias = if inputs.upscaler_active {
            base_mip_bias + (screen_size[0] / output_size[0]).log2()
        } else if settings.taa {
            base_mip_bias
        } else {
            0.0
        };

        let view_dir = camera.view_direction();
        let origin = camera.global_position.cast::<f32>();
        let trimming = settings.trimming_params();
        let sun_angular_radius = (settings.sun_angular_diameter * 0.5).to_radians();
        let blue_noise = if settings.denoiser_tunables.reference_accumulation || settings.rpp > 1 {
            0
        } else {
            settings.blue_noise as u32
        };

        Self {
            world_to_view: mat4_to_cols_array_2d(&camera.world_to_view),
            view_to_world: mat4_to_cols_array_2d(&camera.view_to_world),
            view_to_clip: mat4_to_cols_array_2d(&camera.view_to_clip),
            world_to_clip_prev: mat4_to_cols_array_2d(&inputs.world_to_clip_prev),
            world_to_clip: mat4_to_cols_array_2d(&camera.world_to_clip),

            diff_hit_dist_params: hit_distance_params(settings.diff_hit_dist_scale),
            spec_hit_dist_params: hit_distance_params(settings.spec_hit_dist_scale),
            camera_frustum: camera.frustum,
            sun_direction_exposure: [sun.x, sun.y, sun.z, settings.exposure],
            world_origin_mip_bias: [origin.x, origin.y, origin.z, mip_bias],
            trimming_params_emission_intensity: [trimming.x, trimming.y, trimming.z, emission_intensity],
            view_direction_is_ortho: [view_dir.x, view_dir.y, view_dir.z, flag(camera.ortho)],

            output_size,
            inv_output_size: inverse(output_size),
            screen_size,
            inv_screen_size: inverse(screen_size),
            rect_size,
            inv_rect_size: inverse(rect_size),
            rect_size_prev: inputs.rect_prev.as_f32(),
            jitter,

            // Left-handed view space: positive depth in front of the camera.
            near_z: NEAR_Z * settings.meter_to_units,
            ambient: ambient * settings.exposure,
            ambient_in_composition: flag(settings.denoiser == DenoiserKind::Reblur),
            separator: settings.separator,
            roughness_override: settings.roughness_override,
            metalness_override: settings.metalness_override,
            meter_to_units: settings.meter_to_units,
            indirect_diffuse: flag(settings.indirect_diffuse),
            indirect_specular: flag(settings.indirect_specular),
            sun_angular_radius,
            tan_sun_angular_radius: sun_angular_radius.tan(),
            pixel_angular_radius: 0.5 * settings.cam_fov.to_radians() / output_size[0],
            use_mipmapping: flag(settings.mip),
            debug: settings.debug,
            diff_second_bounce: flag(settings.diff_second_bounce),
            transparent: flag(inputs.has_transparent),

            denoiser_type: settings.denoiser as u32,
            disable_shadows_and_enable_importance_sampling: (sun.z < 0.0
                && settings.importance_sampling)
                as u32,
            on_screen: settings.on_screen.max(0) as u32,
            frame_index: inputs.frame_index,
            forced_material: settings.forced_material.max(0) as u32,
            primary_full_brdf: settings.primary_full_brdf as u32,
            indirect_full_brdf: settings.indirect_full_brdf as u32,
            use_normal_map: settings.normal_map as u32,
            world_space_motion: settings.motion_vectors_in_world_space as u32,
            blue_noise,
            sample_count: settings.sample_count(),
            occlusion_only: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CameraState, RenderSettings};

    fn inputs() -> ConstantInputs {
        ConstantInputs {
            world_to_clip_prev: Mat4::identity(),
            output: Extent2d::new(1920, 1080),
            screen: Extent2d::new(1920, 1080),
            rect: Extent2d::new(960, 540),
            rect_prev: Extent2d::new(1920, 1080),
            resolution_scale: 0.5,
            upscaler_active: false,
            frame_index: 7,
            has_transparent: true,
        }
    }

    #[test]
    fn test_sizes_and_jitter() {
        let mut camera = CameraState::default();
        camera.viewport_jitter = [0.25, -0.5];
        let params = RenderParams::new(RenderSettings::default(), camera);

        let constants = GlobalConstants::new(&params, &inputs());
        assert_eq!(constants.rect_size, [960.0, 540.0]);
        assert_eq!(constants.inv_rect_size, [1.0 / 960.0, 1.0 / 540.0]);
        assert_eq!(constants.rect_size_prev, [1920.0, 1080.0]);
        assert_eq!(constants.jitter, [0.25 / 960.0, -0.5 / 540.0]);
        assert_eq!(constants.frame_index, 7);
        assert_eq!(constants.transparent, 1.0);

        let mut settings = RenderSettings::default();
        settings.taa = false;
        let constants = GlobalConstants::new(&RenderParams::new(settings, camera), &inputs());
        assert_eq!(constants.jitter, [0.0, 0.0]);
        assert_eq!(constants.world_origin_mip_bias[3], 0.0);
    }

    #[test]
    fn test_mip_bias() {
        let params = RenderParams::new(RenderSettings::default(), CameraState::default());

        let taa = GlobalConstants::new(&params, &inputs());
        assert!((taa.world_origin_mip_bias[3] - (-1.5)).abs() < 1e-6);

        let upscaled = GlobalConstants::new(
            &params,
            &ConstantInputs {
                screen: Extent2d::new(960, 540),
                resolution_scale: 1.0,
                upscaler_active: true,
                ..inputs()
            },
        );
        assert!((upscaled.world_origin_mip_bias[3] - (-1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_sample_count_and_blue_noise() {
        let camera = CameraState::default();
        let mut settings = RenderSettings::default();

        settings.rpp = 0;
        let constants = GlobalConstants::new(&RenderParams::new(settings, camera), &inputs());
        assert_eq!(constants.sample_count, 1);
        assert_eq!(constants.blue_noise, 1);

        settings.rpp = 4;
        let constants = GlobalConstants::new(&RenderParams::new(settings, camera), &inputs());
        assert_eq!(constants.sample_count, 4);
        assert_eq!(constants.blue_noise, 0);

        settings.rpp = 1;
        settings.denoiser_tunables.reference_accumulation = true;
        let constants = GlobalConstants::new(&RenderParams::new(settings, camera), &inputs());
        assert_eq!(constants.blue_noise, 0);
    }

    #[test]
    fn test_sun_below_horizon() {
        let mut settings = RenderSettings::default();
        settings.sun_elevation = -10.0;
        settings.sky_ambient = 50.0;
        let constants =
            GlobalConstants::new(&RenderParams::new(settings, CameraState::default()), &inputs());
        assert_eq!(constants.disable_shadows_and_enable_importance_sampling, 1);

        settings.sun_elevation = 45.0;
        let constants =
            GlobalConstants::new(&RenderParams::new(settings, CameraState::default()), &inputs());
        assert_eq!(constants.disable_shadows_and_enable_importance_sampling, 0);
        assert!(constants.ambient > 0.0);
        assert_eq!(constants.ambient_in_composition, 1.0);
    }

    #[test]
    fn test_emission_intensity_gated() {
        let mut settings = RenderSettings::default();
        settings.emission = false;
        let constants =
            GlobalConstants::new(&RenderParams::new(settings, CameraState::default()), &inputs());
        assert_eq!(constants.trimming_params_emission_intensity[3], 0.0);

        settings.emission = true;
        let constants =
            GlobalConstants::new(&RenderParams::new(settings, CameraState::default()), &inputs());
        assert_eq!(constants.trimming_params_emission_intensity[3], settings.emission_intensity);
        assert_eq!(constants.as_bytes().len(), 608);
    }
}
