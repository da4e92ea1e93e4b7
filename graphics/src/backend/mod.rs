//! GPU backend abstraction layer.
//!
//! The frame core never talks to a graphics API directly. It consumes the
//! [`GraphicsBackend`] capability trait: resource creation, CPU-visible
//! buffer writes, fences and semaphores, submission of recorded
//! [`CommandStream`]s, and swapchain acquire/present.
//!
//! # Available Backends
//!
//! - [`DummyBackend`] (always available): records every command and
//!   submission, simulates GPU completion, used by tests and the headless app
//! - `vulkan` feature: conversions from the core's barrier and format types
//!   to native Vulkan structures (see [`vulkan`])
//!
//! Commands are plain values. A backend either replays them into native
//! command buffers at submit time or, like the dummy backend, stores them for
//! inspection.

pub mod dummy;
mod error;

#[cfg(feature = "vulkan")]
pub mod vulkan;

use std::sync::Arc;

pub use dummy::{CompletionMode, DummyBackend, SubmissionRecord};
pub use error::BackendError;

use crate::scheduler::{Fence, Semaphore};
use crate::types::{AccessBits, BufferDescriptor, ResourceState, TextureDescriptor, TextureFormat};

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-assigned raw handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The backend-assigned raw handle.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Backend handle of a buffer.
    GpuBuffer
);
gpu_handle!(
    /// Backend handle of an image (with its default view).
    GpuImage
);
gpu_handle!(
    /// Backend handle of a bottom- or top-level acceleration structure.
    GpuAccelerationStructure
);
gpu_handle!(
    /// Backend handle of a compute or ray tracing pipeline.
    GpuPipeline
);
gpu_handle!(
    /// Backend handle of a descriptor set.
    GpuDescriptorSet
);

/// Kind of acceleration structure to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelerationStructureKind {
    /// Triangle geometry of one mesh.
    BottomLevel { vertex_count: u32, index_count: u32 },
    /// Instances referencing bottom-level structures.
    TopLevel { max_instances: u32 },
}

/// Descriptor for creating an acceleration structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccelerationStructureDescriptor {
    pub label: Option<String>,
    pub kind: AccelerationStructureKind,
}

impl AccelerationStructureDescriptor {
    pub fn new(kind: AccelerationStructureKind) -> Self {
        Self { label: None, kind }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Kind of pipeline to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// A compute pipeline.
    Compute,
    /// A ray tracing pipeline with several ray generation entry points.
    RayTracing { raygen_variants: u32 },
}

/// Descriptor for creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub kind: PipelineKind,
}

impl PipelineDescriptor {
    pub fn compute(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            kind: PipelineKind::Compute,
        }
    }

    pub fn ray_tracing(label: impl Into<String>, raygen_variants: u32) -> Self {
        Self {
            label: Some(label.into()),
            kind: PipelineKind::RayTracing { raygen_variants },
        }
    }
}

/// Image state transition resolved to backend handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImageBarrier {
    pub image: GpuImage,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Buffer access transition resolved to backend handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBufferBarrier {
    pub buffer: GpuBuffer,
    pub before: AccessBits,
    pub after: AccessBits,
}

/// A recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open a named debug region.
    BeginAnnotation(String),
    /// Close the innermost debug region.
    EndAnnotation,
    /// One pipeline barrier covering all listed transitions.
    Barrier {
        images: Vec<GpuImageBarrier>,
        buffers: Vec<GpuBufferBarrier>,
    },
    /// Compute dispatch.
    Dispatch {
        pipeline: GpuPipeline,
        descriptor_set: Option<GpuDescriptorSet>,
        groups: [u32; 3],
    },
    /// Ray tracing dispatch using one of the pipeline's ray generation shaders.
    DispatchRays {
        pipeline: GpuPipeline,
        raygen_variant: u32,
        width: u32,
        height: u32,
    },
    /// Buffer to buffer copy.
    CopyBuffer {
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuBuffer,
        dst_offset: u64,
        size: u64,
    },
    /// Whole-image copy.
    CopyImage { src: GpuImage, dst: GpuImage },
    /// Build a bottom-level structure from indexed triangles.
    ///
    /// Vertices are tightly packed `[f32; 3]` starting at offset 0 of
    /// `vertex_buffer`; indices are `u32` starting at `index_offset`.
    BuildBottomLevel {
        target: GpuAccelerationStructure,
        vertex_buffer: GpuBuffer,
        vertex_count: u32,
        index_buffer: GpuBuffer,
        index_offset: u64,
        index_count: u32,
        scratch: GpuBuffer,
    },
    /// Build a top-level structure from native instance records.
    BuildTopLevel {
        target: GpuAccelerationStructure,
        instance_buffer: GpuBuffer,
        instance_offset: u64,
        instance_count: u32,
        scratch: GpuBuffer,
    },
    /// Work recorded by an external engine (denoiser, upscaler).
    External { engine: &'static str, label: String },
    /// Immediate-mode UI draw into the current back buffer.
    RenderUi,
}

/// A reusable command recording scope.
///
/// Frame slots own one stream per logical pass and [`reset`](Self::reset)
/// them when the slot is reused.
#[derive(Debug, Clone, Default)]
pub struct CommandStream {
    label: &'static str,
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Drop all recorded commands, keeping the allocation.
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Record an arbitrary command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn begin_annotation(&mut self, name: impl Into<String>) {
        self.push(Command::BeginAnnotation(name.into()));
    }

    pub fn end_annotation(&mut self) {
        self.push(Command::EndAnnotation);
    }

    /// Record a barrier. Empty barrier lists are not recorded.
    pub fn barrier(&mut self, images: Vec<GpuImageBarrier>, buffers: Vec<GpuBufferBarrier>) {
        if images.is_empty() && buffers.is_empty() {
            return;
        }
        self.push(Command::Barrier { images, buffers });
    }

    pub fn dispatch(
        &mut self,
        pipeline: GpuPipeline,
        descriptor_set: Option<GpuDescriptorSet>,
        groups: [u32; 3],
    ) {
        self.push(Command::Dispatch {
            pipeline,
            descriptor_set,
            groups,
        });
    }

    pub fn dispatch_rays(&mut self, pipeline: GpuPipeline, raygen_variant: u32, width: u32, height: u32) {
        self.push(Command::DispatchRays {
            pipeline,
            raygen_variant,
            width,
            height,
        });
    }

    pub fn copy_buffer(
        &mut self,
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.push(Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    pub fn copy_image(&mut self, src: GpuImage, dst: GpuImage) {
        self.push(Command::CopyImage { src, dst });
    }

    pub fn external(&mut self, engine: &'static str, label: impl Into<String>) {
        self.push(Command::External {
            engine,
            label: label.into(),
        });
    }

    pub fn render_ui(&mut self) {
        self.push(Command::RenderUi);
    }
}

/// One queue submission: command streams executed in order, the semaphores
/// to wait on and signal, and the fence to signal on completion.
#[derive(Debug, Default)]
pub struct SubmitBatch<'a> {
    pub streams: Vec<&'a CommandStream>,
    pub wait_semaphores: Vec<&'a Semaphore>,
    pub signal_semaphores: Vec<&'a Semaphore>,
    pub signal_fence: Option<&'a Fence>,
}

/// Device properties the core sizes its resources against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Whether ray tracing pipelines and acceleration structures are available.
    pub ray_tracing: bool,
    /// Required alignment of constant buffer binding offsets.
    pub constant_buffer_offset_alignment: u64,
    /// Largest instance count a top-level structure may hold.
    pub max_tlas_instances: u32,
    /// Format of the swapchain images.
    pub swapchain_format: TextureFormat,
    /// Number of swapchain images.
    pub swapchain_image_count: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            ray_tracing: true,
            constant_buffer_offset_alignment: 256,
            max_tlas_instances: 1 << 24,
            swapchain_format: TextureFormat::Bgra8Unorm,
            swapchain_image_count: 3,
        }
    }
}

/// Graphics device capability interface consumed by the frame core.
pub trait GraphicsBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Query device properties.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, BackendError>;

    /// Destroy a buffer resource.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Write into a host-visible buffer.
    fn write_buffer(&self, buffer: GpuBuffer, offset: u64, data: &[u8]) -> Result<(), BackendError>;

    /// Create a 2D image and its default view.
    fn create_image(&self, descriptor: &TextureDescriptor) -> Result<GpuImage, BackendError>;

    /// Destroy an image and its view.
    fn destroy_image(&self, image: GpuImage);

    /// Create an acceleration structure with backing memory bound.
    fn create_acceleration_structure(
        &self,
        descriptor: &AccelerationStructureDescriptor,
    ) -> Result<GpuAccelerationStructure, BackendError>;

    /// Destroy an acceleration structure.
    fn destroy_acceleration_structure(&self, structure: GpuAccelerationStructure);

    /// Device address referenced by top-level instance records.
    fn acceleration_structure_address(&self, structure: GpuAccelerationStructure) -> u64;

    /// Scratch memory needed to build a structure of the given shape.
    fn scratch_size(&self, descriptor: &AccelerationStructureDescriptor) -> u64;

    /// Create a compute or ray tracing pipeline.
    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<GpuPipeline, BackendError>;

    /// Destroy a pipeline.
    fn destroy_pipeline(&self, pipeline: GpuPipeline);

    /// Allocate a descriptor set.
    fn create_descriptor_set(&self, label: &str) -> Result<GpuDescriptorSet, BackendError>;

    /// Free a descriptor set.
    fn destroy_descriptor_set(&self, set: GpuDescriptorSet);

    /// Create a fence for CPU-GPU synchronization.
    fn create_fence(&self, signaled: bool) -> Fence;

    /// Block until the fence is signaled.
    fn wait_fence(&self, fence: &Fence) -> Result<(), BackendError>;

    /// Create a semaphore for GPU-GPU synchronization.
    fn create_semaphore(&self) -> Semaphore;

    /// Submit command streams to the queue.
    fn submit(&self, batch: SubmitBatch<'_>) -> Result<(), BackendError>;

    /// Block until the device has retired all submitted work.
    fn wait_idle(&self) -> Result<(), BackendError>;

    /// The swapchain images, in swapchain index order.
    fn swapchain_images(&self) -> Vec<GpuImage>;

    /// Acquire the next presentable image, signaling `signal` when it is ready.
    fn acquire_next_image(&self, signal: &Semaphore) -> Result<u32, BackendError>;

    /// Queue `image_index` for presentation after `wait` is signaled.
    fn present(&self, wait: &Semaphore, image_index: u32) -> Result<(), BackendError>;
}

/// Create the default backend.
///
/// Native backends plug in by implementing [`GraphicsBackend`]; without one
/// the headless dummy backend is used.
pub fn create_backend() -> Arc<dyn GraphicsBackend> {
    log::info!("Using dummy backend");
    Arc::new(DummyBackend::new())
}
