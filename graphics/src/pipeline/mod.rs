//! Frame ring buffer for managing multiple frames in flight.
//!
//! This module provides [`FrameRingBuffer`], which owns N [`FrameContext`]s
//! and coordinates CPU-GPU synchronization across them, so that the CPU can
//! record frame `n + 1` while the GPU is still executing frame `n`.
//!
//! # Synchronization Model
//!
//! | Level | Primitive | Purpose |
//! |-------|-----------|---------|
//! | Pass → Pass | Barriers | Resource state transitions within a frame |
//! | Acquire → Submit → Present | Semaphores | GPU-GPU ordering with the swapchain |
//! | Frame → Frame | Fences | CPU-GPU sync when a slot is reused |
//!
//! # Frame Overlap (Pipelining)
//!
//! With 2 frames in flight:
//!
//! ```text
//! Frame 0: [acquire slot 0] [record] [submit] ──────────────────────────────►
//!                                             [GPU execute frame 0] ────────►
//!
//! Frame 1:           [acquire slot 1] [record] [submit] ────────────────────►
//!                                                       [GPU execute F1] ───►
//!
//! Frame 2:                     [wait F0 / acquire slot 0] [record] [submit] ►
//!
//! Time ──────────────────────────────────────────────────────────────────────►
//! ```
//!
//! - The CPU only waits when it reuses a slot whose work has not retired
//! - Each slot owns its command streams and its region of the constant
//!   buffer, so recording never touches memory the GPU may still read
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | CPU waits for GPU every frame. Simple but slow. |
//! | 2 | Good balance. CPU can work on N+1 while GPU renders N. |
//! | 3 | More overlap, higher latency. |

use std::sync::Arc;

use rtframe_core::math::align_up;

use crate::backend::{CommandStream, GraphicsBackend, SubmitBatch};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{BufferId, ResourceRegistry};
use crate::scheduler::{Fence, Semaphore};
use crate::types::{BufferDescriptor, BufferUsage};

/// Largest supported number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// A slot's private window into the shared constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantRegion {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

/// One ring-buffer slot.
///
/// Owns the three command streams the scheduler records into (`main` for
/// acceleration structures and ray tracing, `denoise`, `compose` for
/// composition, upscaling, copy and UI), the completion fence, and the
/// semaphores pairing it with the swapchain.
#[derive(Debug)]
pub struct FrameContext {
    slot: usize,
    frame_index: u64,
    fence: Fence,
    /// Signaled when the swapchain image acquired for this frame is ready.
    pub acquire_semaphore: Semaphore,
    /// Signaled when rendering finishes; presentation waits on it.
    pub release_semaphore: Semaphore,
    pub main: CommandStream,
    pub denoise: CommandStream,
    pub compose: CommandStream,
    constants: ConstantRegion,
    in_flight: bool,
}

impl FrameContext {
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Frame index this slot was last acquired for.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn constants(&self) -> ConstantRegion {
        self.constants
    }

    /// Whether work submitted from this slot may still be executing.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight && !self.fence.is_signaled()
    }

    fn reset_streams(&mut self) {
        self.main.reset();
        self.denoise.reset();
        self.compose.reset();
    }
}

/// N reusable frame contexts, selected by `frame_index mod N`.
///
/// # Thread Safety
///
/// `FrameRingBuffer` is **not thread-safe**. It is owned by the thread that
/// drives frame submission.
pub struct FrameRingBuffer {
    backend: Arc<dyn GraphicsBackend>,
    slots: Vec<FrameContext>,
    constant_buffer: BufferId,
    aligned_constant_size: u64,
    acquire_count: u64,
    blocked_count: u64,
}

impl std::fmt::Debug for FrameRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRingBuffer")
            .field("frames_in_flight", &self.slots.len())
            .field("aligned_constant_size", &self.aligned_constant_size)
            .field("acquire_count", &self.acquire_count)
            .field("blocked_count", &self.blocked_count)
            .finish()
    }
}

impl FrameRingBuffer {
    /// Create `frames_in_flight` slots and a constant buffer holding one
    /// `constant_block_size` block per slot, each aligned to the device's
    /// constant offset alignment.
    pub fn new(
        registry: &mut ResourceRegistry,
        frames_in_flight: usize,
        constant_block_size: u64,
    ) -> GraphicsResult<Self> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames in flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
            )));
        }

        let backend = registry.backend().clone();
        let alignment = backend.capabilities().constant_buffer_offset_alignment.max(1);
        let aligned_constant_size = align_up(constant_block_size.max(1), alignment);

        let constant_buffer = registry.create_buffer(
            BufferDescriptor::new(
                aligned_constant_size * frames_in_flight as u64,
                BufferUsage::CONSTANT | BufferUsage::HOST_WRITE,
            )
            .with_label("GlobalConstants"),
        )?;

        let slots = (0..frames_in_flight)
            .map(|slot| FrameContext {
                slot,
                frame_index: 0,
                fence: backend.create_fence(true),
                acquire_semaphore: backend.create_semaphore(),
                release_semaphore: backend.create_semaphore(),
                main: CommandStream::new("main"),
                denoise: CommandStream::new("denoise"),
                compose: CommandStream::new("compose"),
                constants: ConstantRegion {
                    buffer: constant_buffer,
                    offset: slot as u64 * aligned_constant_size,
                    size: aligned_constant_size,
                },
                in_flight: false,
            })
            .collect();

        log::debug!(
            "Frame ring buffer: {} slots, {} byte constant blocks",
            frames_in_flight,
            aligned_constant_size
        );

        Ok(Self {
            backend,
            slots,
            constant_buffer,
            aligned_constant_size,
            acquire_count: 0,
            blocked_count: 0,
        })
    }

    /// Take the slot for `frame_index`.
    ///
    /// Blocks until all work submitted from the slot's previous use has
    /// retired, then resets its fence and command streams.
    pub fn acquire_slot(&mut self, frame_index: u64) -> GraphicsResult<&mut FrameContext> {
        let slot = self.slot_for(frame_index);
        let backend = &self.backend;
        let context = &mut self.slots[slot];

        if context.in_flight {
            if !context.fence.is_signaled() {
                self.blocked_count += 1;
                log::trace!("Frame {frame_index}: waiting for slot {slot}");
            }
            backend.wait_fence(&context.fence)?;
            context.in_flight = false;
        }

        context.fence.reset();
        context.reset_streams();
        context.frame_index = frame_index;
        self.acquire_count += 1;

        log::trace!("Begin frame {} (slot {})", frame_index, slot);
        Ok(context)
    }

    /// Submit the slot's three streams as one batch.
    ///
    /// Waits on the slot's acquire semaphore, signals its release semaphore
    /// and its fence.
    pub fn submit(&mut self, slot: usize) -> GraphicsResult<()> {
        let context = self.slots.get_mut(slot).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("frame slot {slot} out of range"))
        })?;

        self.backend
            .submit(SubmitBatch {
                streams: vec![&context.main, &context.denoise, &context.compose],
                wait_semaphores: vec![&context.acquire_semaphore],
                signal_semaphores: vec![&context.release_semaphore],
                signal_fence: Some(&context.fence),
            })
            .map_err(|err| {
                log::error!("Submit of frame {} failed: {err}", context.frame_index);
                GraphicsError::DeviceLost
            })?;
        context.in_flight = true;
        Ok(())
    }

    /// Write a constant block into the slot's region.
    pub fn write_constants(
        &self,
        registry: &ResourceRegistry,
        slot: usize,
        data: &[u8],
    ) -> GraphicsResult<ConstantRegion> {
        let region = self.constant_region_for(slot)?;
        if data.len() as u64 > region.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "constant block of {} bytes exceeds region of {}",
                data.len(),
                region.size
            )));
        }
        registry.write_buffer(region.buffer, region.offset, data)?;
        Ok(region)
    }

    /// The constant buffer window owned by `slot`.
    pub fn constant_region_for(&self, slot: usize) -> GraphicsResult<ConstantRegion> {
        self.slots
            .get(slot)
            .map(FrameContext::constants)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("frame slot {slot} out of range")))
    }

    /// Block until every slot's submitted work has retired.
    ///
    /// Call before destroying GPU resources.
    pub fn wait_idle(&mut self) -> GraphicsResult<()> {
        log::trace!("Waiting for GPU idle ({} slots)", self.slots.len());
        for context in &mut self.slots {
            if context.in_flight {
                self.backend.wait_fence(&context.fence)?;
                context.in_flight = false;
            }
        }
        Ok(())
    }

    pub fn slot_for(&self, frame_index: u64) -> usize {
        (frame_index % self.slots.len() as u64) as usize
    }

    pub fn context(&self, slot: usize) -> Option<&FrameContext> {
        self.slots.get(slot)
    }

    pub fn context_mut(&mut self, slot: usize) -> Option<&mut FrameContext> {
        self.slots.get_mut(slot)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn constant_buffer(&self) -> BufferId {
        self.constant_buffer
    }

    pub fn aligned_constant_size(&self) -> u64 {
        self.aligned_constant_size
    }

    /// Total slots acquired.
    pub fn acquire_count(&self) -> u64 {
        self.acquire_count
    }

    /// Acquisitions that had to wait for the GPU.
    pub fn acquire_count_blocked(&self) -> u64 {
        self.blocked_count
    }

    /// Slots whose submitted work may still be executing.
    pub fn in_flight_count(&self) -> usize {
        self.slots.iter().filter(|c| c.is_in_flight()).count()
    }
}
