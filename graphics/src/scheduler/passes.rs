//! Fixed passes of the frame pipeline and the image states each one needs.
//!
//! Every pass is recorded the same way: open an annotation, record one
//! barrier batch built from the pass's request table, dispatch, close the
//! annotation. The request tables list inputs first (read) and outputs last
//! (storage).

use crate::backend::{CommandStream, PipelineDescriptor};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{
    DescriptorSetId, ImageId, PipelineId, RenderTarget, RenderTargets, ResourceRegistry,
};
use crate::transition::{
    BufferTransitionRequest, TransitionRequest, TransitionTracker, record_transitions,
};
use crate::types::Extent2d;

/// Edge of the square thread group of every compute pass.
pub const TILE_SIZE: u32 = 16;

/// Ray generation entry points: `{checkerboard, full} x {spec bounce off, on}`.
pub const RAYGEN_VARIANTS: u32 = 4;

/// Ray generation variant for `rpp` rays per pixel.
pub fn raygen_variant(rpp: u32, spec_second_bounce: bool) -> u32 {
    let base = if rpp == 0 { 2 } else { 0 };
    base + spec_second_bounce as u32
}

/// A pass with its own pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    IntegrateBrdf,
    RayTracing,
    Composition,
    Temporal,
    Upsample,
    PreUpscale,
    AfterUpscale,
}

const PASS_COUNT: usize = 7;

impl Pass {
    pub const ALL: [Pass; PASS_COUNT] = [
        Self::IntegrateBrdf,
        Self::RayTracing,
        Self::Composition,
        Self::Temporal,
        Self::Upsample,
        Self::PreUpscale,
        Self::AfterUpscale,
    ];

    /// Annotation and pipeline label.
    pub fn label(self) -> &'static str {
        match self {
            Self::IntegrateBrdf => "IntegrateBRDF",
            Self::RayTracing => "Raytracing",
            Self::Composition => "Composition",
            Self::Temporal => "Temporal",
            Self::Upsample => "Upsample",
            Self::PreUpscale => "PreDlss",
            Self::AfterUpscale => "AfterDlss",
        }
    }

    fn descriptor(self) -> PipelineDescriptor {
        match self {
            Self::RayTracing => PipelineDescriptor::ray_tracing(self.label(), RAYGEN_VARIANTS),
            _ => PipelineDescriptor::compute(self.label()),
        }
    }
}

/// Pipeline and bindings of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassProgram {
    pub pipeline: PipelineId,
    pub descriptor_set: DescriptorSetId,
}

/// Programs of every pass, created once at startup.
#[derive(Debug, Clone)]
pub struct PassPrograms {
    programs: [PassProgram; PASS_COUNT],
}

impl PassPrograms {
    pub fn create(registry: &mut ResourceRegistry) -> GraphicsResult<Self> {
        let mut programs = Vec::with_capacity(PASS_COUNT);
        for pass in Pass::ALL {
            programs.push(PassProgram {
                pipeline: registry.create_pipeline(pass.descriptor())?,
                descriptor_set: registry.create_descriptor_set(pass.label())?,
            });
        }
        let programs = programs.try_into().map_err(|_| {
            GraphicsError::Internal("pass program table size mismatch".into())
        })?;
        Ok(Self { programs })
    }

    pub fn get(&self, pass: Pass) -> PassProgram {
        self.programs[pass as usize]
    }

    /// Record a compute dispatch covering `extent` in [`TILE_SIZE`] tiles.
    pub fn dispatch(
        &self,
        registry: &ResourceRegistry,
        stream: &mut CommandStream,
        pass: Pass,
        extent: Extent2d,
    ) -> GraphicsResult<()> {
        let program = self.get(pass);
        let pipeline = registry.pipeline(program.pipeline)?.handle;
        let descriptor_set = registry.descriptor_set(program.descriptor_set)?.handle;
        stream.dispatch(pipeline, Some(descriptor_set), extent.groups(TILE_SIZE));
        Ok(())
    }

    pub fn dispatch_rays(
        &self,
        registry: &ResourceRegistry,
        stream: &mut CommandStream,
        raygen_variant: u32,
        extent: Extent2d,
    ) -> GraphicsResult<()> {
        let pipeline = registry.pipeline(self.get(Pass::RayTracing).pipeline)?.handle;
        stream.dispatch_rays(pipeline, raygen_variant, extent.width, extent.height);
        Ok(())
    }
}

/// Open the annotation of a pass and record its barrier batch.
pub fn begin_pass(
    stream: &mut CommandStream,
    tracker: &mut TransitionTracker,
    registry: &ResourceRegistry,
    name: &str,
    images: &[TransitionRequest],
    buffers: &[BufferTransitionRequest],
) -> GraphicsResult<usize> {
    stream.begin_annotation(name);
    record_transitions(stream, tracker, registry, images, buffers)
}

fn reads<const N: usize>(targets: &RenderTargets, list: [RenderTarget; N]) -> [TransitionRequest; N] {
    list.map(|target| TransitionRequest::read(targets[target]))
}

fn writes<const N: usize>(targets: &RenderTargets, list: [RenderTarget; N]) -> [TransitionRequest; N] {
    list.map(|target| TransitionRequest::storage(targets[target]))
}

fn concat<const A: usize, const B: usize, const N: usize>(
    a: [TransitionRequest; A],
    b: [TransitionRequest; B],
) -> [TransitionRequest; N] {
    debug_assert_eq!(A + B, N);
    std::array::from_fn(|i| if i < A { a[i] } else { b[i - A] })
}

/// Ray tracing: reads last frame's composed lighting, writes the G-buffer
/// and the noisy signals.
pub fn ray_tracing_requests(targets: &RenderTargets) -> [TransitionRequest; 13] {
    use RenderTarget::*;
    concat(
        reads(targets, [ComposedLightingViewZ]),
        writes(
            targets,
            [
                DirectLighting,
                TransparentLighting,
                ObjectMotion,
                ViewZ,
                NormalRoughness,
                BaseColorMetalness,
                UnfilteredShadowData,
                UnfilteredShadowTranslucency,
                UnfilteredDiff,
                DiffDirectionPdf,
                UnfilteredSpec,
                SpecDirectionPdf,
            ],
        ),
    )
}

/// Composition of direct lighting and the denoised signals.
pub fn composition_requests(targets: &RenderTargets) -> [TransitionRequest; 8] {
    use RenderTarget::*;
    concat(
        reads(
            targets,
            [ViewZ, DirectLighting, NormalRoughness, BaseColorMetalness, Shadow, Diff, Spec],
        ),
        writes(targets, [ComposedLightingViewZ]),
    )
}

/// Temporal anti-aliasing from the `src` history into `dst`.
pub fn temporal_requests(
    targets: &RenderTargets,
    src: ImageId,
    dst: ImageId,
) -> [TransitionRequest; 5] {
    use RenderTarget::*;
    [
        TransitionRequest::read(targets[ObjectMotion]),
        TransitionRequest::read(targets[ComposedLightingViewZ]),
        TransitionRequest::read(targets[TransparentLighting]),
        TransitionRequest::read(src),
        TransitionRequest::storage(dst),
    ]
}

/// Upsample of the temporal output into `Final`.
pub fn upsample_requests(targets: &RenderTargets, src: ImageId) -> [TransitionRequest; 2] {
    [
        TransitionRequest::read(src),
        TransitionRequest::storage(targets[RenderTarget::Final]),
    ]
}

/// Repacking of the composed image into upscaler inputs. The upscaler
/// inputs reuse G-buffer images that are dead at this point.
pub fn pre_upscale_requests(targets: &RenderTargets) -> [TransitionRequest; 6] {
    use RenderTarget::*;
    concat(
        reads(targets, [ObjectMotion, TransparentLighting, ComposedLightingViewZ]),
        writes(targets, [ViewZ, UnfilteredShadowData, UnfilteredDiff]),
    )
}

/// External upscaler evaluation into `TaaHistory`.
pub fn upscale_requests(targets: &RenderTargets) -> [TransitionRequest; 4] {
    use RenderTarget::*;
    concat(
        reads(targets, [ViewZ, UnfilteredShadowData, UnfilteredDiff]),
        writes(targets, [TaaHistory]),
    )
}

/// Post-processing of the upscaler output into `Final`.
pub fn after_upscale_requests(targets: &RenderTargets) -> [TransitionRequest; 2] {
    use RenderTarget::*;
    concat(reads(targets, [TaaHistory]), writes(targets, [Final]))
}
