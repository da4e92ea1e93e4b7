//! Resource state tracking and minimal barrier generation.
//!
//! [`TransitionTracker`] remembers the last declared `(access, layout)` of
//! every image and the last declared access of every tracked buffer. A pass
//! describes the states it needs as a list of requests, and the tracker
//! turns that list into the smallest set of barriers:
//!
//! | current → requested | barrier? |
//! |---------------------|----------|
//! | same access, same layout | no |
//! | access or layout differs | yes |
//! | storage → storage | yes (orders unordered writes) |
//!
//! All barriers of one pass are recorded as a single pipeline barrier
//! command by [`record_transitions`].

use std::collections::HashMap;

use crate::backend::{CommandStream, GpuBufferBarrier, GpuImageBarrier};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{BufferId, ImageId, ResourceRegistry};
use crate::types::{AccessBits, ImageLayout, ResourceState};

/// Size of the fixed barrier batch of one pass.
pub const MAX_TRANSITIONS_PER_PASS: usize = 32;

/// Requested next state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRequest {
    pub image: ImageId,
    pub state: ResourceState,
}

impl TransitionRequest {
    pub fn new(image: ImageId, access: AccessBits, layout: ImageLayout) -> Self {
        Self {
            image,
            state: ResourceState::new(access, layout),
        }
    }

    /// Read-only shader access.
    pub fn read(image: ImageId) -> Self {
        Self {
            image,
            state: ResourceState::SHADER_RESOURCE,
        }
    }

    /// Read-write shader access.
    pub fn storage(image: ImageId) -> Self {
        Self {
            image,
            state: ResourceState::STORAGE,
        }
    }
}

/// Requested next access of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransitionRequest {
    pub buffer: BufferId,
    pub access: AccessBits,
}

impl BufferTransitionRequest {
    pub fn new(buffer: BufferId, access: AccessBits) -> Self {
        Self { buffer, access }
    }
}

/// An image state change that must be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub image: ImageId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// A buffer access change that must be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferId,
    pub before: AccessBits,
    pub after: AccessBits,
}

/// Whether moving from `current` to `requested` needs a barrier.
pub fn needs_barrier(current: ResourceState, requested: ResourceState) -> bool {
    current != requested || (current.access.is_storage() && requested.access.is_storage())
}

fn needs_buffer_barrier(current: AccessBits, requested: AccessBits) -> bool {
    current != requested || (current.is_storage() && requested.is_storage())
}

type ImagePlan = (Vec<Barrier>, Vec<(ImageId, ResourceState)>);
type BufferPlan = (Vec<BufferBarrier>, Vec<(BufferId, AccessBits)>);

fn check_capacity(required: usize, capacity: usize) -> GraphicsResult<()> {
    if required > capacity {
        return Err(GraphicsError::BarrierCapacityExceeded { required, capacity });
    }
    Ok(())
}

/// Per-resource declared state cache.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    images: HashMap<ImageId, ResourceState>,
    buffers: HashMap<BufferId, AccessBits>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the state an image is in when it starts being tracked.
    pub fn register_image(&mut self, image: ImageId, state: ResourceState) {
        self.images.insert(image, state);
    }

    /// Declare the access a buffer is in when it starts being tracked.
    pub fn register_buffer(&mut self, buffer: BufferId, access: AccessBits) {
        self.buffers.insert(buffer, access);
    }

    /// Last declared state of an image.
    pub fn state(&self, image: ImageId) -> Option<ResourceState> {
        self.images.get(&image).copied()
    }

    /// Last declared access of a buffer.
    pub fn buffer_state(&self, buffer: BufferId) -> Option<AccessBits> {
        self.buffers.get(&buffer).copied()
    }

    fn plan_image_barriers(&self, requests: &[TransitionRequest]) -> ImagePlan {
        // States changed earlier in this same call shadow the committed ones.
        let mut pending: Vec<(ImageId, ResourceState)> = Vec::new();
        let mut barriers = Vec::new();

        for request in requests {
            let current = pending
                .iter()
                .rev()
                .find(|(id, _)| *id == request.image)
                .map(|(_, state)| *state)
                .or_else(|| self.state(request.image))
                .unwrap_or(ResourceState::UNDEFINED);

            if needs_barrier(current, request.state) {
                barriers.push(Barrier {
                    image: request.image,
                    before: current,
                    after: request.state,
                });
            }
            pending.push((request.image, request.state));
        }

        (barriers, pending)
    }

    fn plan_buffer_barriers(&self, requests: &[BufferTransitionRequest]) -> BufferPlan {
        let mut pending: Vec<(BufferId, AccessBits)> = Vec::new();
        let mut barriers = Vec::new();

        for request in requests {
            let current = pending
                .iter()
                .rev()
                .find(|(id, _)| *id == request.buffer)
                .map(|(_, access)| *access)
                .or_else(|| self.buffer_state(request.buffer))
                .unwrap_or_default();

            if needs_buffer_barrier(current, request.access) {
                barriers.push(BufferBarrier {
                    buffer: request.buffer,
                    before: current,
                    after: request.access,
                });
            }
            pending.push((request.buffer, request.access));
        }

        (barriers, pending)
    }

    /// Compute the barriers for `requests` and commit the new states.
    ///
    /// Output order follows input order. Untracked images are treated as
    /// [`ResourceState::UNDEFINED`]. If more than `max_out` barriers would be
    /// needed, nothing is committed and
    /// [`GraphicsError::BarrierCapacityExceeded`] is returned.
    pub fn build_barriers(
        &mut self,
        requests: &[TransitionRequest],
        max_out: usize,
    ) -> GraphicsResult<Vec<Barrier>> {
        let (barriers, pending) = self.plan_image_barriers(requests);
        check_capacity(barriers.len(), max_out)?;
        self.images.extend(pending);
        Ok(barriers)
    }

    /// Buffer counterpart of [`build_barriers`](Self::build_barriers).
    pub fn build_buffer_barriers(
        &mut self,
        requests: &[BufferTransitionRequest],
        max_out: usize,
    ) -> GraphicsResult<Vec<BufferBarrier>> {
        let (barriers, pending) = self.plan_buffer_barriers(requests);
        check_capacity(barriers.len(), max_out)?;
        self.buffers.extend(pending);
        Ok(barriers)
    }

    /// Transition an image whose real state is unknown to the tracker.
    ///
    /// Always emits a barrier from [`ResourceState::UNDEFINED`]; used for
    /// swapchain images, whose contents are discarded on acquire.
    pub fn transition_unconditionally(&mut self, image: ImageId, state: ResourceState) -> Barrier {
        self.images.insert(image, state);
        Barrier {
            image,
            before: ResourceState::UNDEFINED,
            after: state,
        }
    }
}

/// Resolve image barriers to backend handles.
pub fn resolve_image_barriers(
    registry: &ResourceRegistry,
    barriers: &[Barrier],
) -> GraphicsResult<Vec<GpuImageBarrier>> {
    barriers
        .iter()
        .map(|barrier| {
            Ok(GpuImageBarrier {
                image: registry.image(barrier.image)?.handle,
                before: barrier.before,
                after: barrier.after,
            })
        })
        .collect()
}

/// Resolve buffer barriers to backend handles.
pub fn resolve_buffer_barriers(
    registry: &ResourceRegistry,
    barriers: &[BufferBarrier],
) -> GraphicsResult<Vec<GpuBufferBarrier>> {
    barriers
        .iter()
        .map(|barrier| {
            Ok(GpuBufferBarrier {
                buffer: registry.buffer(barrier.buffer)?.handle,
                before: barrier.before,
                after: barrier.after,
            })
        })
        .collect()
}

/// Build and record one pass's barriers as a single barrier command.
///
/// Image and buffer barriers share one batch of
/// [`MAX_TRANSITIONS_PER_PASS`]; on overflow no state is committed.
/// Returns the number of barriers recorded.
pub fn record_transitions(
    stream: &mut CommandStream,
    tracker: &mut TransitionTracker,
    registry: &ResourceRegistry,
    images: &[TransitionRequest],
    buffers: &[BufferTransitionRequest],
) -> GraphicsResult<usize> {
    let (image_barriers, image_states) = tracker.plan_image_barriers(images);
    let (buffer_barriers, buffer_states) = tracker.plan_buffer_barriers(buffers);
    let count = image_barriers.len() + buffer_barriers.len();
    check_capacity(count, MAX_TRANSITIONS_PER_PASS)?;

    let gpu_images = resolve_image_barriers(registry, &image_barriers)?;
    let gpu_buffers = resolve_buffer_barriers(registry, &buffer_barriers)?;
    tracker.images.extend(image_states);
    tracker.buffers.extend(buffer_states);

    log::trace!(
        "{}: {} image barriers, {} buffer barriers",
        stream.label(),
        image_barriers.len(),
        buffer_barriers.len()
    );

    stream.barrier(gpu_images, gpu_buffers);
    Ok(count)
}
