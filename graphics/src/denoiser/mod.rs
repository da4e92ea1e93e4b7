//! Interface to the external denoising engine.
//!
//! The frame core does not denoise anything itself. Once per frame it fills
//! in [`CommonSettings`] and a [`DenoiserResourceTable`] naming which render
//! targets play which role, and hands both to a [`Denoiser`].

mod settings;

pub use settings::{
    AntilagSettings, CheckerboardMode, DenoiserMethod, MethodDesc, MethodSettings,
    ReblurSettings, RelaxSettings, SigmaShadowSettings, antilag_settings, methods_for,
    reblur_settings, relax_settings,
};

use rtframe_core::math::Mat4;

use crate::backend::CommandStream;
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{ImageId, RenderTarget, RenderTargets};
use crate::transition::TransitionRequest;

/// Whether temporal history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationMode {
    #[default]
    Continue,
    ClearAndRestart,
}

/// Per-frame inputs shared by every denoising method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommonSettings {
    pub view_to_clip: Mat4,
    pub view_to_clip_prev: Mat4,
    pub world_to_view: Mat4,
    pub world_to_view_prev: Mat4,
    /// Scale from stored motion to the engine's expected units.
    pub motion_vector_scale: [f32; 2],
    pub camera_jitter: [f32; 2],
    pub resolution_scale: [f32; 2],
    pub meter_to_units: f32,
    /// Depth beyond which pixels are not denoised.
    pub denoising_range: f32,
    pub disocclusion_threshold: f32,
    pub split_screen: f32,
    pub debug: f32,
    pub frame_index: u32,
    pub accumulation_mode: AccumulationMode,
    pub motion_vectors_in_world_space: bool,
    pub radiance_multiplied_by_exposure: bool,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            view_to_clip: Mat4::identity(),
            view_to_clip_prev: Mat4::identity(),
            world_to_view: Mat4::identity(),
            world_to_view_prev: Mat4::identity(),
            motion_vector_scale: [1.0, 1.0],
            camera_jitter: [0.0, 0.0],
            resolution_scale: [1.0, 1.0],
            meter_to_units: 1.0,
            denoising_range: 1.0e6,
            disocclusion_threshold: 0.01,
            split_screen: 0.0,
            debug: 0.0,
            frame_index: 0,
            accumulation_mode: AccumulationMode::Continue,
            motion_vectors_in_world_space: true,
            radiance_multiplied_by_exposure: true,
        }
    }
}

/// Role of an image in a denoiser invocation, in engine binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenoiserSlot {
    InMv,
    InNormalRoughness,
    InViewZ,
    InDiffRadianceHitDist,
    InSpecRadianceHitDist,
    InDiffHitDist,
    InSpecHitDist,
    InDiffDirectionPdf,
    InSpecDirectionPdf,
    InDiffConfidence,
    InSpecConfidence,
    InShadowData,
    InShadowTranslucency,
    OutShadowTranslucency,
    OutDiffRadianceHitDist,
    OutSpecRadianceHitDist,
    OutDiffHitDist,
    OutSpecHitDist,
}

impl DenoiserSlot {
    pub const COUNT: usize = 18;

    pub const ALL: [DenoiserSlot; Self::COUNT] = [
        Self::InMv,
        Self::InNormalRoughness,
        Self::InViewZ,
        Self::InDiffRadianceHitDist,
        Self::InSpecRadianceHitDist,
        Self::InDiffHitDist,
        Self::InSpecHitDist,
        Self::InDiffDirectionPdf,
        Self::InSpecDirectionPdf,
        Self::InDiffConfidence,
        Self::InSpecConfidence,
        Self::InShadowData,
        Self::InShadowTranslucency,
        Self::OutShadowTranslucency,
        Self::OutDiffRadianceHitDist,
        Self::OutSpecRadianceHitDist,
        Self::OutDiffHitDist,
        Self::OutSpecHitDist,
    ];

    pub fn is_output(self) -> bool {
        matches!(
            self,
            Self::OutShadowTranslucency
                | Self::OutDiffRadianceHitDist
                | Self::OutSpecRadianceHitDist
                | Self::OutDiffHitDist
                | Self::OutSpecHitDist
        )
    }

    /// Render target bound to this slot. Confidence inputs are unused.
    pub fn target(self) -> Option<RenderTarget> {
        let target = match self {
            Self::InMv => RenderTarget::ObjectMotion,
            Self::InNormalRoughness => RenderTarget::NormalRoughness,
            Self::InViewZ => RenderTarget::ViewZ,
            Self::InDiffRadianceHitDist | Self::InDiffHitDist => RenderTarget::UnfilteredDiff,
            Self::InSpecRadianceHitDist | Self::InSpecHitDist => RenderTarget::UnfilteredSpec,
            Self::InDiffDirectionPdf => RenderTarget::DiffDirectionPdf,
            Self::InSpecDirectionPdf => RenderTarget::SpecDirectionPdf,
            Self::InDiffConfidence | Self::InSpecConfidence => return None,
            Self::InShadowData => RenderTarget::UnfilteredShadowData,
            Self::InShadowTranslucency => RenderTarget::UnfilteredShadowTranslucency,
            Self::OutShadowTranslucency => RenderTarget::Shadow,
            Self::OutDiffRadianceHitDist | Self::OutDiffHitDist => RenderTarget::Diff,
            Self::OutSpecRadianceHitDist | Self::OutSpecHitDist => RenderTarget::Spec,
        };
        Some(target)
    }
}

/// The fixed 18-entry binding table handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenoiserResourceTable {
    entries: [Option<ImageId>; DenoiserSlot::COUNT],
}

impl DenoiserResourceTable {
    pub fn new(targets: &RenderTargets) -> Self {
        let entries = DenoiserSlot::ALL.map(|slot| slot.target().map(|target| targets[target]));
        Self { entries }
    }

    pub fn get(&self, slot: DenoiserSlot) -> Option<ImageId> {
        self.entries[slot as usize]
    }

    /// `(slot, image)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (DenoiserSlot, Option<ImageId>)> + '_ {
        DenoiserSlot::ALL.into_iter().zip(self.entries.iter().copied())
    }

    /// States the engine expects: inputs readable, outputs writable.
    ///
    /// Images bound to several slots appear once.
    pub fn transition_requests(&self) -> Vec<TransitionRequest> {
        let mut requests: Vec<TransitionRequest> = Vec::with_capacity(DenoiserSlot::COUNT);
        for (slot, image) in self.iter() {
            let Some(image) = image else { continue };
            if requests.iter().any(|r| r.image == image) {
                continue;
            }
            requests.push(if slot.is_output() {
                TransitionRequest::storage(image)
            } else {
                TransitionRequest::read(image)
            });
        }
        requests
    }
}

/// A denoising engine.
pub trait Denoiser: Send {
    fn name(&self) -> &'static str;

    /// Create the engine's internal resources for `methods`.
    fn initialize(&mut self, methods: &[MethodDesc]) -> GraphicsResult<()>;

    /// Update the settings of one method for the next [`denoise`](Self::denoise).
    fn set_method_settings(&mut self, settings: &MethodSettings) -> GraphicsResult<()>;

    /// Record denoising of every initialized method into `stream`.
    fn denoise(
        &mut self,
        frame_index: u32,
        stream: &mut CommandStream,
        common: &CommonSettings,
        table: &DenoiserResourceTable,
    ) -> GraphicsResult<()>;

    /// Release the engine's resources.
    fn destroy(&mut self);
}

/// Engine stand-in that records one external command per method.
///
/// Keeps the last settings and common settings it was given so callers can
/// inspect what the scheduler passed.
#[derive(Debug, Default)]
pub struct NullDenoiser {
    methods: Vec<MethodDesc>,
    settings: Vec<MethodSettings>,
    last_common: Option<CommonSettings>,
    denoise_count: u64,
}

impl NullDenoiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }

    /// Latest settings of `method`.
    pub fn settings(&self, method: DenoiserMethod) -> Option<&MethodSettings> {
        self.settings.iter().find(|s| s.method() == method)
    }

    pub fn last_common(&self) -> Option<&CommonSettings> {
        self.last_common.as_ref()
    }

    pub fn denoise_count(&self) -> u64 {
        self.denoise_count
    }
}

impl Denoiser for NullDenoiser {
    fn name(&self) -> &'static str {
        "null-denoiser"
    }

    fn initialize(&mut self, methods: &[MethodDesc]) -> GraphicsResult<()> {
        if methods.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "denoiser needs at least one method".into(),
            ));
        }
        self.methods = methods.to_vec();
        log::debug!("{}: {} methods", self.name(), methods.len());
        Ok(())
    }

    fn set_method_settings(&mut self, settings: &MethodSettings) -> GraphicsResult<()> {
        let method = settings.method();
        if !self.methods.iter().any(|d| d.method == method) {
            return Err(GraphicsError::InvalidParameter(format!(
                "denoiser method {method:?} was not initialized"
            )));
        }
        self.settings.retain(|s| s.method() != method);
        self.settings.push(*settings);
        Ok(())
    }

    fn denoise(
        &mut self,
        frame_index: u32,
        stream: &mut CommandStream,
        common: &CommonSettings,
        table: &DenoiserResourceTable,
    ) -> GraphicsResult<()> {
        if self.methods.is_empty() {
            return Err(GraphicsError::Internal("denoiser used before initialize".into()));
        }
        let bound = table.iter().filter(|(_, image)| image.is_some()).count();
        for desc in &self.methods {
            stream.external(self.name(), format!("{:?}", desc.method));
        }
        log::trace!(
            "{}: frame {frame_index}, {bound} bound resources",
            self.name()
        );
        self.last_common = Some(*common);
        self.denoise_count += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.methods.clear();
        self.settings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, DummyBackend};
    use crate::params::DenoiserKind;
    use crate::resources::ResourceRegistry;
    use crate::transition::TransitionTracker;
    use crate::types::{Extent2d, TextureFormat};
    use std::sync::Arc;

    fn targets() -> (ResourceRegistry, RenderTargets) {
        let mut registry = ResourceRegistry::new(Arc::new(DummyBackend::new()));
        let mut tracker = TransitionTracker::new();
        let targets = RenderTargets::create(
            &mut registry,
            &mut tracker,
            Extent2d::new(64, 64),
            Extent2d::new(64, 64),
            TextureFormat::Rgba16Float,
            TextureFormat::Bgra8Unorm,
        )
        .unwrap();
        (registry, targets)
    }

    #[test]
    fn test_resource_table_layout() {
        let (_registry, targets) = targets();
        let table = DenoiserResourceTable::new(&targets);

        assert_eq!(table.iter().count(), 18);
        assert_eq!(table.get(DenoiserSlot::InMv), Some(targets[RenderTarget::ObjectMotion]));
        assert_eq!(
            table.get(DenoiserSlot::InDiffHitDist),
            table.get(DenoiserSlot::InDiffRadianceHitDist)
        );
        assert_eq!(table.get(DenoiserSlot::InDiffConfidence), None);
        assert_eq!(table.get(DenoiserSlot::InSpecConfidence), None);
        assert_eq!(table.get(DenoiserSlot::OutSpecHitDist), Some(targets[RenderTarget::Spec]));
    }

    #[test]
    fn test_transition_requests_are_unique() {
        let (_registry, targets) = targets();
        let requests = DenoiserResourceTable::new(&targets).transition_requests();

        // 9 distinct inputs, 3 distinct outputs
        assert_eq!(requests.len(), 12);
        let outputs: Vec<_> = requests
            .iter()
            .filter(|r| r.state.access.is_storage())
            .map(|r| r.image)
            .collect();
        assert_eq!(
            outputs,
            [
                targets[RenderTarget::Shadow],
                targets[RenderTarget::Diff],
                targets[RenderTarget::Spec]
            ]
        );
    }

    #[test]
    fn test_null_denoiser_records_methods() {
        let (_registry, targets) = targets();
        let table = DenoiserResourceTable::new(&targets);
        let mut denoiser = NullDenoiser::new();
        let mut stream = CommandStream::new("denoise");

        assert!(
            denoiser
                .denoise(0, &mut stream, &CommonSettings::default(), &table)
                .is_err()
        );

        denoiser
            .initialize(&methods_for(DenoiserKind::Reblur, Extent2d::new(64, 64)))
            .unwrap();
        let relax = relax_settings(&Default::default(), 31, 7);
        assert!(denoiser.set_method_settings(&relax[0]).is_err());

        for settings in reblur_settings(&Default::default(), 31) {
            denoiser.set_method_settings(&settings).unwrap();
        }
        denoiser
            .denoise(5, &mut stream, &CommonSettings::default(), &table)
            .unwrap();

        assert_eq!(stream.len(), 3);
        assert!(matches!(&stream.commands()[0], Command::External { engine: "null-denoiser", .. }));
        assert_eq!(denoiser.denoise_count(), 1);
        assert!(denoiser.settings(DenoiserMethod::ReblurSpecular).is_some());
    }
}
