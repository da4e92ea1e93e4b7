//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It keeps the
//! contents of every buffer in host memory, records every submission for
//! inspection, and simulates GPU completion:
//!
//! - [`CompletionMode::Immediate`]: fences are signaled at submit time, as
//!   if the GPU were infinitely fast.
//! - [`CompletionMode::Manual`]: submissions stay pending until
//!   [`DummyBackend::complete_submissions`] is called, or until the CPU
//!   blocks on one of their fences, which retires pending work in order.
//!
//! Buffer copies are applied at submit time so that device-local buffers can
//! be read back with [`DummyBackend::read_buffer`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{
    AccelerationStructureDescriptor, AccelerationStructureKind, BackendError, Command,
    DeviceCapabilities, GpuAccelerationStructure, GpuBuffer, GpuDescriptorSet, GpuImage,
    GpuPipeline, GraphicsBackend, PipelineDescriptor, SubmitBatch,
};
use crate::scheduler::{Fence, Semaphore};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// When the dummy backend signals submission fences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Signal at submit time.
    #[default]
    Immediate,
    /// Signal when explicitly completed or waited on.
    Manual,
}

/// A submission as seen by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    /// Labels of the submitted streams, in order.
    pub stream_labels: Vec<&'static str>,
    /// All commands of all streams, in execution order.
    pub commands: Vec<Command>,
    pub wait_semaphores: Vec<u64>,
    pub signal_semaphores: Vec<u64>,
    /// Id of the fence signaled on completion.
    pub fence: Option<u64>,
    /// Unretired submissions right after this one was queued (itself included).
    pub pending_after_submit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Buffer,
    Image,
    AccelerationStructure,
    Pipeline,
    DescriptorSet,
}

#[derive(Debug, Default)]
struct DummyState {
    buffers: HashMap<u64, Vec<u8>>,
    live: HashMap<u64, ResourceKind>,
    pending: VecDeque<Fence>,
    submissions: Vec<SubmissionRecord>,
    presented: Vec<u32>,
    next_image: u32,
    blocking_waits: usize,
    max_pending: usize,
    fence_reuse_violations: usize,
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    capabilities: DeviceCapabilities,
    mode: CompletionMode,
    swapchain: Vec<GpuImage>,
    next_handle: AtomicU64,
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a dummy backend that completes work immediately.
    pub fn new() -> Self {
        Self::with_config(DeviceCapabilities::default(), CompletionMode::Immediate)
    }

    /// Create a dummy backend whose submissions stay pending until completed.
    pub fn manual() -> Self {
        Self::with_config(DeviceCapabilities::default(), CompletionMode::Manual)
    }

    /// Create a dummy backend with explicit capabilities and completion mode.
    pub fn with_config(capabilities: DeviceCapabilities, mode: CompletionMode) -> Self {
        let swapchain = (1..=capabilities.swapchain_image_count as u64)
            .map(GpuImage::from_raw)
            .collect::<Vec<_>>();
        let first_handle = swapchain.len() as u64 + 1;

        Self {
            capabilities,
            mode,
            swapchain,
            next_handle: AtomicU64::new(first_handle),
            state: Mutex::new(DummyState::default()),
        }
    }

    pub fn completion_mode(&self) -> CompletionMode {
        self.mode
    }

    fn allocate(&self, kind: ResourceKind) -> u64 {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.state.lock().live.insert(raw, kind);
        raw
    }

    fn release(&self, raw: u64, kind: ResourceKind) {
        let mut state = self.state.lock();
        match state.live.remove(&raw) {
            Some(found) if found == kind => {}
            other => log::warn!("DummyBackend: destroying {raw} as {kind:?}, found {other:?}"),
        }
        if kind == ResourceKind::Buffer {
            state.buffers.remove(&raw);
        }
    }

    /// Retire every pending submission. Returns how many were retired.
    pub fn complete_submissions(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.pending.len();
        for fence in state.pending.drain(..) {
            fence.signal();
        }
        count
    }

    /// Retire the oldest pending submission. Returns `false` if none was pending.
    pub fn complete_oldest(&self) -> bool {
        match self.state.lock().pending.pop_front() {
            Some(fence) => {
                fence.signal();
                true
            }
            None => false,
        }
    }

    /// Number of submissions not yet retired.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Largest number of simultaneously pending submissions observed.
    pub fn max_pending(&self) -> usize {
        self.state.lock().max_pending
    }

    /// Number of fence waits that found the fence unsignaled.
    pub fn blocking_waits(&self) -> usize {
        self.state.lock().blocking_waits
    }

    /// Submissions that named a fence which still had work pending.
    pub fn fence_reuse_violations(&self) -> usize {
        self.state.lock().fence_reuse_violations
    }

    /// All submissions recorded so far.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    /// Forget recorded submissions (pending fences are unaffected).
    pub fn clear_submissions(&self) {
        self.state.lock().submissions.clear();
    }

    /// Swapchain indices passed to `present`, in order.
    pub fn presented(&self) -> Vec<u32> {
        self.state.lock().presented.clone()
    }

    /// Number of live resources, swapchain images excluded.
    pub fn live_resource_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Read back buffer contents. Out-of-range bytes read as zero.
    pub fn read_buffer(&self, buffer: GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let state = self.state.lock();
        let mut out = vec![0u8; size as usize];
        if let Some(data) = state.buffers.get(&buffer.raw()) {
            let start = (offset as usize).min(data.len());
            let end = (offset as usize + size as usize).min(data.len());
            out[..end - start].copy_from_slice(&data[start..end]);
        }
        out
    }

    fn apply_copies(state: &mut DummyState, commands: &[Command]) {
        for command in commands {
            if let Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } = command
            {
                let Some(src_data) = state.buffers.get(&src.raw()) else {
                    continue;
                };
                let start = *src_offset as usize;
                let end = (start + *size as usize).min(src_data.len());
                if start >= end {
                    continue;
                }
                let bytes = src_data[start..end].to_vec();
                if let Some(dst_data) = state.buffers.get_mut(&dst.raw()) {
                    let dst_start = *dst_offset as usize;
                    let dst_end = (dst_start + bytes.len()).min(dst_data.len());
                    if dst_start < dst_end {
                        dst_data[dst_start..dst_end].copy_from_slice(&bytes[..dst_end - dst_start]);
                    }
                }
            }
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, BackendError> {
        if descriptor.size == 0 {
            return Err(BackendError::InvalidParameter(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let raw = self.allocate(ResourceKind::Buffer);
        self.state
            .lock()
            .buffers
            .insert(raw, vec![0u8; descriptor.size as usize]);
        Ok(GpuBuffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        self.release(buffer.raw(), ResourceKind::Buffer);
    }

    fn write_buffer(&self, buffer: GpuBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let contents = state.buffers.get_mut(&buffer.raw()).ok_or_else(|| {
            BackendError::InvalidParameter(format!("write to unknown buffer {}", buffer.raw()))
        })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(BackendError::InvalidParameter(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_image(&self, descriptor: &TextureDescriptor) -> Result<GpuImage, BackendError> {
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{} {:?})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.format
        );
        Ok(GpuImage::from_raw(self.allocate(ResourceKind::Image)))
    }

    fn destroy_image(&self, image: GpuImage) {
        self.release(image.raw(), ResourceKind::Image);
    }

    fn create_acceleration_structure(
        &self,
        descriptor: &AccelerationStructureDescriptor,
    ) -> Result<GpuAccelerationStructure, BackendError> {
        if !self.capabilities.ray_tracing {
            return Err(BackendError::FeatureNotSupported(
                "acceleration structures".into(),
            ));
        }
        log::trace!("DummyBackend: creating acceleration structure {:?}", descriptor.label);
        Ok(GpuAccelerationStructure::from_raw(
            self.allocate(ResourceKind::AccelerationStructure),
        ))
    }

    fn destroy_acceleration_structure(&self, structure: GpuAccelerationStructure) {
        self.release(structure.raw(), ResourceKind::AccelerationStructure);
    }

    fn acceleration_structure_address(&self, structure: GpuAccelerationStructure) -> u64 {
        structure.raw() << 16
    }

    fn scratch_size(&self, descriptor: &AccelerationStructureDescriptor) -> u64 {
        match descriptor.kind {
            AccelerationStructureKind::BottomLevel {
                vertex_count,
                index_count,
            } => (vertex_count as u64 * 12 + index_count as u64 * 4).max(256),
            AccelerationStructureKind::TopLevel { max_instances } => {
                (max_instances as u64 * 64).max(256)
            }
        }
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<GpuPipeline, BackendError> {
        log::trace!("DummyBackend: creating pipeline {:?}", descriptor.label);
        Ok(GpuPipeline::from_raw(self.allocate(ResourceKind::Pipeline)))
    }

    fn destroy_pipeline(&self, pipeline: GpuPipeline) {
        self.release(pipeline.raw(), ResourceKind::Pipeline);
    }

    fn create_descriptor_set(&self, label: &str) -> Result<GpuDescriptorSet, BackendError> {
        log::trace!("DummyBackend: creating descriptor set {label}");
        Ok(GpuDescriptorSet::from_raw(
            self.allocate(ResourceKind::DescriptorSet),
        ))
    }

    fn destroy_descriptor_set(&self, set: GpuDescriptorSet) {
        self.release(set.raw(), ResourceKind::DescriptorSet);
    }

    fn create_fence(&self, signaled: bool) -> Fence {
        Fence::new(self.next_handle.fetch_add(1, Ordering::Relaxed), signaled)
    }

    fn wait_fence(&self, fence: &Fence) -> Result<(), BackendError> {
        if fence.is_signaled() {
            return Ok(());
        }

        let mut state = self.state.lock();
        state.blocking_waits += 1;

        // Simulate the GPU catching up: retire work in submission order.
        while !fence.is_signaled() {
            match state.pending.pop_front() {
                Some(pending) => pending.signal(),
                None => {
                    return Err(BackendError::Internal(format!(
                        "wait on fence {} with no pending submission",
                        fence.id()
                    )));
                }
            }
        }
        Ok(())
    }

    fn create_semaphore(&self) -> Semaphore {
        Semaphore::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn submit(&self, batch: SubmitBatch<'_>) -> Result<(), BackendError> {
        let mut state = self.state.lock();

        let commands: Vec<Command> = batch
            .streams
            .iter()
            .flat_map(|stream| stream.commands().iter().cloned())
            .collect();
        Self::apply_copies(&mut state, &commands);

        if let Some(fence) = batch.signal_fence {
            if state.pending.iter().any(|pending| pending.id() == fence.id()) {
                log::warn!("DummyBackend: fence {} submitted while still pending", fence.id());
                state.fence_reuse_violations += 1;
            }
            match self.mode {
                CompletionMode::Immediate => fence.signal(),
                CompletionMode::Manual => state.pending.push_back(fence.clone()),
            }
        }
        state.max_pending = state.max_pending.max(state.pending.len());

        log::trace!(
            "DummyBackend: submit {} streams, {} commands",
            batch.streams.len(),
            commands.len()
        );

        let record = SubmissionRecord {
            stream_labels: batch.streams.iter().map(|stream| stream.label()).collect(),
            commands,
            wait_semaphores: batch.wait_semaphores.iter().map(|s| s.id()).collect(),
            signal_semaphores: batch.signal_semaphores.iter().map(|s| s.id()).collect(),
            fence: batch.signal_fence.map(Fence::id),
            pending_after_submit: state.pending.len(),
        };
        state.submissions.push(record);
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), BackendError> {
        self.complete_submissions();
        Ok(())
    }

    fn swapchain_images(&self) -> Vec<GpuImage> {
        self.swapchain.clone()
    }

    fn acquire_next_image(&self, _signal: &Semaphore) -> Result<u32, BackendError> {
        let mut state = self.state.lock();
        let index = state.next_image;
        state.next_image = (index + 1) % self.swapchain.len().max(1) as u32;
        Ok(index)
    }

    fn present(&self, _wait: &Semaphore, image_index: u32) -> Result<(), BackendError> {
        if image_index as usize >= self.swapchain.len() {
            return Err(BackendError::InvalidParameter(format!(
                "present of swapchain image {image_index}"
            )));
        }
        self.state.lock().presented.push(image_index);
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
