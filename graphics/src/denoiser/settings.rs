//! Per-method denoiser settings derived from [`RenderSettings`].

use rtframe_core::math::lerp;

use crate::params::{DenoiserKind, PrePassMode, RenderSettings};
use crate::types::Extent2d;

/// Denoising methods an engine instance can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenoiserMethod {
    ReblurDiffuse,
    ReblurSpecular,
    RelaxDiffuse,
    RelaxSpecular,
    SigmaShadowTranslucency,
}

/// A method and the resolution it runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDesc {
    pub method: DenoiserMethod,
    pub width: u16,
    pub height: u16,
}

/// Methods to create for `kind` at `screen` resolution.
pub fn methods_for(kind: DenoiserKind, screen: Extent2d) -> Vec<MethodDesc> {
    let width = screen.width.min(u16::MAX as u32) as u16;
    let height = screen.height.min(u16::MAX as u32) as u16;
    let desc = |method| MethodDesc {
        method,
        width,
        height,
    };
    match kind {
        DenoiserKind::Reblur => vec![
            desc(DenoiserMethod::ReblurDiffuse),
            desc(DenoiserMethod::ReblurSpecular),
            desc(DenoiserMethod::SigmaShadowTranslucency),
        ],
        DenoiserKind::Relax => vec![
            desc(DenoiserMethod::RelaxDiffuse),
            desc(DenoiserMethod::RelaxSpecular),
            desc(DenoiserMethod::SigmaShadowTranslucency),
        ],
    }
}

/// Which pixels of a half-resolution checkerboard carry samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckerboardMode {
    #[default]
    Off,
    White,
    Black,
}

impl CheckerboardMode {
    /// Mode for `rpp` rays per pixel. Zero means half a ray per pixel, with
    /// diffuse on white and specular on black squares.
    pub fn for_rpp(rpp: u32, specular: bool) -> Self {
        match (rpp, specular) {
            (0, false) => Self::White,
            (0, true) => Self::Black,
            _ => Self::Off,
        }
    }
}

/// Thresholds of history anti-lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntilagSettings {
    pub threshold_min: f32,
    pub threshold_max: f32,
    pub sigma_scale: f32,
    pub enable: bool,
}

/// Anti-lag for intensity and for hit distance.
///
/// Thresholds relax with the residual noise level and tighten with more
/// rays per pixel.
pub fn antilag_settings(settings: &RenderSettings) -> (AntilagSettings, AntilagSettings) {
    let tunables = &settings.denoiser_tunables;
    let f = (tunables.residual_noise_level / 5.0).clamp(0.0, 1.0);
    let scale = 1.0 / (1.0 + settings.rpp as f32 * 0.5);

    let intensity = AntilagSettings {
        threshold_min: lerp(0.03, 0.04, f) * scale * 0.25,
        threshold_max: lerp(0.15, 0.20, f) * scale,
        sigma_scale: 1.0,
        enable: tunables.antilag_intensity,
    };
    let hit_distance = AntilagSettings {
        threshold_min: lerp(0.01, 0.02, f) * scale * 0.25,
        threshold_max: lerp(0.06, 0.10, f) * scale,
        sigma_scale: 1.0,
        enable: tunables.antilag_hit_distance,
    };
    (intensity, hit_distance)
}

/// Settings of one REBLUR lobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReblurSettings {
    /// Hit distance normalization `(A, B, C, D)`.
    pub hit_distance_params: [f32; 4],
    /// Specular only.
    pub lobe_trimming: Option<[f32; 3]>,
    pub antilag_intensity: AntilagSettings,
    pub antilag_hit_distance: AntilagSettings,
    pub max_accumulated_frames: u32,
    pub blur_radius: f32,
    pub max_adaptive_radius_scale: f32,
    pub normal_weight_strictness: f32,
    pub stabilization_strength: f32,
    pub residual_noise_level: f32,
    pub checkerboard: CheckerboardMode,
    pub pre_pass_mode: PrePassMode,
    pub anti_firefly: bool,
    pub reference_accumulation: bool,
}

/// Settings of one RELAX lobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxSettings {
    pub prepass_blur_radius: f32,
    pub max_accumulated_frames: u32,
    pub max_fast_accumulated_frames: u32,
    pub checkerboard: CheckerboardMode,
    pub anti_firefly: bool,
}

/// SIGMA shadow denoising settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SigmaShadowSettings {
    pub blur_radius_scale: f32,
}

/// Settings handed to [`Denoiser::set_method_settings`](super::Denoiser::set_method_settings).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MethodSettings {
    ReblurDiffuse(ReblurSettings),
    ReblurSpecular(ReblurSettings),
    RelaxDiffuse(RelaxSettings),
    RelaxSpecular(RelaxSettings),
    SigmaShadow(SigmaShadowSettings),
}

impl MethodSettings {
    pub fn method(&self) -> DenoiserMethod {
        match self {
            Self::ReblurDiffuse(_) => DenoiserMethod::ReblurDiffuse,
            Self::ReblurSpecular(_) => DenoiserMethod::ReblurSpecular,
            Self::RelaxDiffuse(_) => DenoiserMethod::RelaxDiffuse,
            Self::RelaxSpecular(_) => DenoiserMethod::RelaxSpecular,
            Self::SigmaShadow(_) => DenoiserMethod::SigmaShadowTranslucency,
        }
    }
}

/// REBLUR diffuse, REBLUR specular and SIGMA settings for this frame.
///
/// `max_accumulated_frames` already includes the history-reset factor.
pub fn reblur_settings(settings: &RenderSettings, max_accumulated_frames: u32) -> [MethodSettings; 3] {
    let tunables = &settings.denoiser_tunables;
    let (antilag_intensity, antilag_hit_distance) = antilag_settings(settings);
    let trimming = settings.trimming_params();

    let strictness = tunables.normal_weight_strictness
        * (1.0 + (1.0 - tunables.pre_pass_mode as u32 as f32) * 0.33);

    let lobe = |hit_distance_scale: f32, specular: bool| ReblurSettings {
        hit_distance_params: [hit_distance_scale, 0.1, 20.0, -25.0],
        lobe_trimming: specular.then_some([trimming.x, trimming.y, trimming.z]),
        antilag_intensity,
        antilag_hit_distance,
        max_accumulated_frames,
        blur_radius: tunables.blur_radius,
        max_adaptive_radius_scale: tunables.adaptive_radius_scale,
        normal_weight_strictness: strictness,
        stabilization_strength: tunables.stabilization_strength,
        residual_noise_level: tunables.residual_noise_level * 0.01,
        checkerboard: CheckerboardMode::for_rpp(settings.rpp, specular),
        pre_pass_mode: tunables.pre_pass_mode,
        anti_firefly: tunables.anti_firefly,
        reference_accumulation: tunables.reference_accumulation,
    };

    [
        MethodSettings::ReblurDiffuse(lobe(settings.diff_hit_dist_scale, false)),
        MethodSettings::ReblurSpecular(lobe(settings.spec_hit_dist_scale, true)),
        MethodSettings::SigmaShadow(SigmaShadowSettings::default()),
    ]
}

/// RELAX diffuse, RELAX specular and SIGMA settings for this frame.
///
/// Both lobes use the white checkerboard.
pub fn relax_settings(
    settings: &RenderSettings,
    max_accumulated_frames: u32,
    max_fast_accumulated_frames: u32,
) -> [MethodSettings; 3] {
    let tunables = &settings.denoiser_tunables;
    let checkerboard = CheckerboardMode::for_rpp(settings.rpp, false);
    let pre_pass = tunables.pre_pass_mode != PrePassMode::Off;

    let lobe = |prepass_blur_radius: f32| RelaxSettings {
        prepass_blur_radius: if pre_pass { prepass_blur_radius } else { 0.0 },
        max_accumulated_frames,
        max_fast_accumulated_frames,
        checkerboard,
        anti_firefly: tunables.anti_firefly,
    };

    [
        MethodSettings::RelaxDiffuse(lobe(50.0)),
        MethodSettings::RelaxSpecular(lobe(30.0)),
        MethodSettings::SigmaShadow(SigmaShadowSettings::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods_for_engines() {
        let screen = Extent2d::new(1920, 1080);
        let reblur: Vec<_> = methods_for(DenoiserKind::Reblur, screen)
            .iter()
            .map(|d| d.method)
            .collect();
        assert_eq!(
            reblur,
            [
                DenoiserMethod::ReblurDiffuse,
                DenoiserMethod::ReblurSpecular,
                DenoiserMethod::SigmaShadowTranslucency
            ]
        );
        let relax = methods_for(DenoiserKind::Relax, screen);
        assert_eq!(relax[0].method, DenoiserMethod::RelaxDiffuse);
        assert_eq!((relax[2].width, relax[2].height), (1920, 1080));
    }

    #[test]
    fn test_reblur_checkerboard_by_rpp() {
        let mut settings = RenderSettings::default();
        let [diffuse, specular, shadow] = reblur_settings(&settings, 31);

        let MethodSettings::ReblurDiffuse(d) = diffuse else {
            panic!("expected diffuse settings");
        };
        let MethodSettings::ReblurSpecular(s) = specular else {
            panic!("expected specular settings");
        };
        assert_eq!(d.checkerboard, CheckerboardMode::White);
        assert_eq!(s.checkerboard, CheckerboardMode::Black);
        assert!(d.lobe_trimming.is_none());
        assert_eq!(s.lobe_trimming, Some([0.85, 0.04, 0.11]));
        assert_eq!(shadow.method(), DenoiserMethod::SigmaShadowTranslucency);

        settings.rpp = 1;
        let [diffuse, ..] = reblur_settings(&settings, 31);
        let MethodSettings::ReblurDiffuse(d) = diffuse else {
            panic!("expected diffuse settings");
        };
        assert_eq!(d.checkerboard, CheckerboardMode::Off);
    }

    #[test]
    fn test_reblur_derived_values() {
        let settings = RenderSettings::default();
        let [diffuse, ..] = reblur_settings(&settings, 12);
        let MethodSettings::ReblurDiffuse(d) = diffuse else {
            panic!("expected diffuse settings");
        };
        assert_eq!(d.max_accumulated_frames, 12);
        // advanced pre-pass: 1 + (1 - 2) * 0.33
        assert!((d.normal_weight_strictness - 0.67).abs() < 1e-6);
        assert!((d.residual_noise_level - 0.03).abs() < 1e-6);
        assert_eq!(d.hit_distance_params[0], 3.0);
    }

    #[test]
    fn test_relax_prepass_radius() {
        let mut settings = RenderSettings::default();
        let [diffuse, specular, _] = relax_settings(&settings, 31, 7);
        assert!(matches!(diffuse, MethodSettings::RelaxDiffuse(r) if r.prepass_blur_radius == 50.0));
        assert!(matches!(specular, MethodSettings::RelaxSpecular(r)
            if r.prepass_blur_radius == 30.0 && r.checkerboard == CheckerboardMode::White));

        settings.denoiser_tunables.pre_pass_mode = PrePassMode::Off;
        let [diffuse, ..] = relax_settings(&settings, 0, 0);
        assert!(matches!(diffuse, MethodSettings::RelaxDiffuse(r)
            if r.prepass_blur_radius == 0.0 && r.max_accumulated_frames == 0));
    }

    #[test]
    fn test_antilag_scales_with_rpp() {
        let mut settings = RenderSettings::default();
        let (base, _) = antilag_settings(&settings);
        settings.rpp = 2;
        let (scaled, hit) = antilag_settings(&settings);
        assert!((scaled.threshold_max - base.threshold_max * 0.5).abs() < 1e-6);
        assert!(hit.enable);
    }
}
