//! The fixed set of images the frame pipeline renders into.

use std::ops::Index;

use super::{ImageId, ResourceRegistry};
use crate::error::GraphicsResult;
use crate::transition::TransitionTracker;
use crate::types::{
    AccessBits, Extent2d, ResourceState, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Size of the BRDF pre-integration table.
pub const INTEGRATE_BRDF_SIZE: u32 = 256;

/// Which resolution an image is allocated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    /// Fixed square size.
    Fixed(u32),
    /// Internal render ("screen") resolution. Dynamic resolution renders into
    /// a sub-rectangle of these images.
    Render,
    /// Display ("output") resolution.
    Output,
}

/// Images owned by the frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    IntegrateBrdf,
    ViewZ,
    DirectLighting,
    TransparentLighting,
    ObjectMotion,
    NormalRoughness,
    BaseColorMetalness,
    Shadow,
    Diff,
    DiffDirectionPdf,
    Spec,
    SpecDirectionPdf,
    UnfilteredShadowData,
    UnfilteredDiff,
    UnfilteredSpec,
    UnfilteredShadowTranslucency,
    ComposedLightingViewZ,
    TaaHistory,
    TaaHistoryPrev,
    Final,
}

impl RenderTarget {
    pub const COUNT: usize = 20;

    /// Every target, in creation order.
    pub const ALL: [RenderTarget; Self::COUNT] = [
        Self::IntegrateBrdf,
        Self::ViewZ,
        Self::DirectLighting,
        Self::TransparentLighting,
        Self::ObjectMotion,
        Self::NormalRoughness,
        Self::BaseColorMetalness,
        Self::Shadow,
        Self::Diff,
        Self::DiffDirectionPdf,
        Self::Spec,
        Self::SpecDirectionPdf,
        Self::UnfilteredShadowData,
        Self::UnfilteredDiff,
        Self::UnfilteredSpec,
        Self::UnfilteredShadowTranslucency,
        Self::ComposedLightingViewZ,
        Self::TaaHistory,
        Self::TaaHistoryPrev,
        Self::Final,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::IntegrateBrdf => "IntegrateBRDF",
            Self::ViewZ => "ViewZ",
            Self::DirectLighting => "DirectLighting",
            Self::TransparentLighting => "TransparentLighting",
            Self::ObjectMotion => "ObjectMotion",
            Self::NormalRoughness => "Normal_Roughness",
            Self::BaseColorMetalness => "BaseColor_Metalness",
            Self::Shadow => "Shadow",
            Self::Diff => "Diff",
            Self::DiffDirectionPdf => "DiffDirectionPdf",
            Self::Spec => "Spec",
            Self::SpecDirectionPdf => "SpecDirectionPdf",
            Self::UnfilteredShadowData => "Unfiltered_ShadowData",
            Self::UnfilteredDiff => "Unfiltered_Diff",
            Self::UnfilteredSpec => "Unfiltered_Spec",
            Self::UnfilteredShadowTranslucency => "Unfiltered_Shadow_Translucency",
            Self::ComposedLightingViewZ => "ComposedLighting_ViewZ",
            Self::TaaHistory => "TaaHistory",
            Self::TaaHistoryPrev => "TaaHistoryPrev",
            Self::Final => "Final",
        }
    }

    pub fn resolution(self) -> TargetResolution {
        match self {
            Self::IntegrateBrdf => TargetResolution::Fixed(INTEGRATE_BRDF_SIZE),
            Self::TaaHistory | Self::TaaHistoryPrev | Self::Final => TargetResolution::Output,
            _ => TargetResolution::Render,
        }
    }

    /// Image format. History images use the pipeline's output format and
    /// the final image matches the swapchain so it can be copied directly.
    pub fn format(self, output_format: TextureFormat, swapchain_format: TextureFormat) -> TextureFormat {
        match self {
            Self::IntegrateBrdf | Self::UnfilteredShadowData => TextureFormat::Rg16Float,
            Self::ViewZ => TextureFormat::R32Float,
            Self::DirectLighting => TextureFormat::Rg11B10Float,
            Self::NormalRoughness | Self::Shadow | Self::UnfilteredShadowTranslucency => {
                TextureFormat::Rgba8Unorm
            }
            Self::BaseColorMetalness => TextureFormat::Rgba8UnormSrgb,
            Self::TransparentLighting
            | Self::ObjectMotion
            | Self::Diff
            | Self::DiffDirectionPdf
            | Self::Spec
            | Self::SpecDirectionPdf
            | Self::UnfilteredDiff
            | Self::UnfilteredSpec
            | Self::ComposedLightingViewZ => TextureFormat::Rgba16Float,
            Self::TaaHistory | Self::TaaHistoryPrev => output_format,
            Self::Final => swapchain_format,
        }
    }

    /// Access the image is declared in right after creation.
    pub fn initial_access(self) -> AccessBits {
        match self {
            Self::IntegrateBrdf | Self::ComposedLightingViewZ | Self::TaaHistoryPrev => {
                AccessBits::SHADER_RESOURCE_STORAGE
            }
            Self::Final => AccessBits::COPY_SOURCE,
            _ => AccessBits::SHADER_RESOURCE,
        }
    }

    pub fn usage(self) -> TextureUsage {
        TextureUsage::SHADER_RESOURCE | TextureUsage::STORAGE | TextureUsage::COPY_SRC
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Ids of all pipeline images, indexable by [`RenderTarget`].
#[derive(Debug, Clone)]
pub struct RenderTargets {
    ids: [ImageId; RenderTarget::COUNT],
    render: Extent2d,
    output: Extent2d,
}

impl RenderTargets {
    /// Create every target and declare its initial state to the tracker.
    pub fn create(
        registry: &mut ResourceRegistry,
        tracker: &mut TransitionTracker,
        render: Extent2d,
        output: Extent2d,
        output_format: TextureFormat,
        swapchain_format: TextureFormat,
    ) -> GraphicsResult<Self> {
        let mut ids = Vec::with_capacity(RenderTarget::COUNT);

        for target in RenderTarget::ALL {
            let size = match target.resolution() {
                TargetResolution::Fixed(size) => Extent2d::square(size),
                TargetResolution::Render => render,
                TargetResolution::Output => output,
            };
            let descriptor = TextureDescriptor::new_2d(
                size,
                target.format(output_format, swapchain_format),
                target.usage(),
            )
            .with_label(target.name());

            let id = registry.create_image(descriptor)?;
            tracker.register_image(id, ResourceState::initial(target.initial_access()));
            ids.push(id);
        }

        log::debug!(
            "Created {} render targets (render {}x{}, output {}x{})",
            ids.len(),
            render.width,
            render.height,
            output.width,
            output.height
        );

        let ids: [ImageId; RenderTarget::COUNT] = ids.try_into().map_err(|_| {
            crate::error::GraphicsError::Internal("render target count mismatch".into())
        })?;
        Ok(Self { ids, render, output })
    }

    pub fn get(&self, target: RenderTarget) -> ImageId {
        self.ids[target.index()]
    }

    /// Internal render resolution.
    pub fn render_size(&self) -> Extent2d {
        self.render
    }

    /// Display resolution.
    pub fn output_size(&self) -> Extent2d {
        self.output
    }
}

impl Index<RenderTarget> for RenderTargets {
    type Output = ImageId;

    fn index(&self, target: RenderTarget) -> &ImageId {
        &self.ids[target.index()]
    }
}
