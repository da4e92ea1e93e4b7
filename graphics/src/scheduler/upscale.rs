//! Upscaling and anti-aliasing stage.
//!
//! Chosen once at startup:
//!
//! - [`ExternalUpscaleStage`] hands the composed image to an [`Upscaler`]
//!   engine, wrapped in a repacking pre-pass and a post-pass into `Final`
//! - [`TemporalUpsampleStage`] runs the built-in temporal pass, ping-ponging
//!   between the two history images, and upsamples to `Final` only when the
//!   render rect is smaller than the output

use crate::backend::CommandStream;
use crate::error::GraphicsResult;
use crate::resources::{ImageId, RenderTarget, RenderTargets, ResourceRegistry};
use crate::transition::TransitionTracker;
use crate::upscaler::{UpscaleDispatchDesc, Upscaler};

use super::passes::{
    Pass, PassPrograms, after_upscale_requests, begin_pass, pre_upscale_requests,
    temporal_requests, upsample_requests, upscale_requests,
};
use super::resolution::ResolutionState;

/// Everything a stage may touch while recording.
pub struct UpscaleContext<'a> {
    pub registry: &'a ResourceRegistry,
    pub tracker: &'a mut TransitionTracker,
    pub targets: &'a RenderTargets,
    pub programs: &'a PassPrograms,
    pub resolution: &'a ResolutionState,
    pub frame_index: u64,
    /// Sub-pixel jitter in pixels; zero when TAA is off.
    pub jitter: [f32; 2],
    /// The history reset factor of this frame is zero.
    pub reset: bool,
}

/// The stage between composition and presentation.
pub trait UpscaleStage: Send {
    fn name(&self) -> &'static str;

    /// An external engine produces the final image.
    fn is_external(&self) -> bool;

    /// Record the stage and return the image holding the final output.
    fn record(
        &mut self,
        ctx: &mut UpscaleContext<'_>,
        stream: &mut CommandStream,
    ) -> GraphicsResult<ImageId>;

    fn shutdown(&mut self) {}
}

/// Stage backed by an external upscaling engine.
pub struct ExternalUpscaleStage {
    upscaler: Box<dyn Upscaler>,
}

impl ExternalUpscaleStage {
    /// Wrap an engine that is already initialized.
    pub fn new(upscaler: Box<dyn Upscaler>) -> Self {
        Self { upscaler }
    }
}

impl UpscaleStage for ExternalUpscaleStage {
    fn name(&self) -> &'static str {
        self.upscaler.name()
    }

    fn is_external(&self) -> bool {
        true
    }

    fn record(
        &mut self,
        ctx: &mut UpscaleContext<'_>,
        stream: &mut CommandStream,
    ) -> GraphicsResult<ImageId> {
        let targets = ctx.targets;
        let rect = ctx.resolution.rect();

        begin_pass(
            stream,
            ctx.tracker,
            ctx.registry,
            Pass::PreUpscale.label(),
            &pre_upscale_requests(targets),
            &[],
        )?;
        ctx.programs
            .dispatch(ctx.registry, stream, Pass::PreUpscale, rect)?;
        stream.end_annotation();

        begin_pass(
            stream,
            ctx.tracker,
            ctx.registry,
            "Dlss",
            &upscale_requests(targets),
            &[],
        )?;
        self.upscaler.evaluate(
            stream,
            &UpscaleDispatchDesc {
                color: targets[RenderTarget::UnfilteredDiff],
                view_z: targets[RenderTarget::ViewZ],
                motion: targets[RenderTarget::UnfilteredShadowData],
                output: targets[RenderTarget::TaaHistory],
                jitter: [-ctx.jitter[0], -ctx.jitter[1]],
                render_size: rect,
                reset: ctx.reset,
            },
        )?;
        stream.end_annotation();

        begin_pass(
            stream,
            ctx.tracker,
            ctx.registry,
            Pass::AfterUpscale.label(),
            &after_upscale_requests(targets),
            &[],
        )?;
        ctx.programs
            .dispatch(ctx.registry, stream, Pass::AfterUpscale, ctx.resolution.output)?;
        stream.end_annotation();

        Ok(targets[RenderTarget::Final])
    }

    fn shutdown(&mut self) {
        self.upscaler.shutdown();
    }
}

/// Built-in temporal anti-aliasing with optional upsampling.
#[derive(Debug, Default)]
pub struct TemporalUpsampleStage;

impl TemporalUpsampleStage {
    pub fn new() -> Self {
        Self
    }

    /// `(src, dst)` history images of `frame_index`.
    pub fn history_pair(targets: &RenderTargets, frame_index: u64) -> (ImageId, ImageId) {
        let prev = targets[RenderTarget::TaaHistoryPrev];
        let curr = targets[RenderTarget::TaaHistory];
        if frame_index % 2 == 0 {
            (prev, curr)
        } else {
            (curr, prev)
        }
    }
}

impl UpscaleStage for TemporalUpsampleStage {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn is_external(&self) -> bool {
        false
    }

    fn record(
        &mut self,
        ctx: &mut UpscaleContext<'_>,
        stream: &mut CommandStream,
    ) -> GraphicsResult<ImageId> {
        let targets = ctx.targets;
        let (src, dst) = Self::history_pair(targets, ctx.frame_index);

        begin_pass(
            stream,
            ctx.tracker,
            ctx.registry,
            Pass::Temporal.label(),
            &temporal_requests(targets, src, dst),
            &[],
        )?;
        ctx.programs
            .dispatch(ctx.registry, stream, Pass::Temporal, ctx.resolution.rect())?;
        stream.end_annotation();

        if !ctx.resolution.is_upsampling() {
            return Ok(dst);
        }

        begin_pass(
            stream,
            ctx.tracker,
            ctx.registry,
            Pass::Upsample.label(),
            &upsample_requests(targets, dst),
            &[],
        )?;
        ctx.programs
            .dispatch(ctx.registry, stream, Pass::Upsample, ctx.resolution.screen)?;
        stream.end_annotation();

        Ok(targets[RenderTarget::Final])
    }
}
