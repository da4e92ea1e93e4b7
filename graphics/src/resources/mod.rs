//! GPU resource ownership.
//!
//! [`ResourceRegistry`] owns every GPU-visible resource the frame core
//! creates: images, buffers, acceleration structures, pipelines and
//! descriptor sets. Each kind lives in its own typed [`Arena`], so lookups
//! are O(1) and ids of different kinds cannot be confused.
//!
//! The registry only knows identity and descriptors. Access/layout state is
//! owned by the [`TransitionTracker`](crate::transition::TransitionTracker).

mod arena;
mod targets;

use std::sync::Arc;

pub use arena::{
    AccelerationStructureId, Arena, ArenaId, BufferId, DescriptorSetId, ImageId, PipelineId,
};
pub use targets::{RenderTarget, RenderTargets, TargetResolution};

use crate::backend::{
    AccelerationStructureDescriptor, GpuAccelerationStructure, GpuBuffer, GpuDescriptorSet,
    GpuImage, GpuPipeline, GraphicsBackend, PipelineDescriptor,
};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, TextureDescriptor, TextureFormat};

/// A registered image.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub handle: GpuImage,
    pub descriptor: TextureDescriptor,
    /// Owned by someone else (swapchain); never destroyed by the registry.
    pub imported: bool,
}

/// A registered buffer.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub handle: GpuBuffer,
    pub descriptor: BufferDescriptor,
}

/// A registered acceleration structure.
#[derive(Debug, Clone)]
pub struct AccelerationStructureRecord {
    pub handle: GpuAccelerationStructure,
    pub descriptor: AccelerationStructureDescriptor,
    /// Device address used by top-level instance records.
    pub address: u64,
}

/// A registered pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub handle: GpuPipeline,
    pub descriptor: PipelineDescriptor,
}

/// A registered descriptor set.
#[derive(Debug, Clone)]
pub struct DescriptorSetRecord {
    pub handle: GpuDescriptorSet,
    pub label: String,
}

#[derive(Debug, Clone, Copy)]
enum ResourceKey {
    Image(ImageId),
    Buffer(BufferId),
    AccelerationStructure(AccelerationStructureId),
    Pipeline(PipelineId),
    DescriptorSet(DescriptorSetId),
}

/// Owner of all GPU resources created by the frame core.
pub struct ResourceRegistry {
    backend: Arc<dyn GraphicsBackend>,
    images: Arena<ImageId, ImageRecord>,
    buffers: Arena<BufferId, BufferRecord>,
    acceleration_structures: Arena<AccelerationStructureId, AccelerationStructureRecord>,
    pipelines: Arena<PipelineId, PipelineRecord>,
    descriptor_sets: Arena<DescriptorSetId, DescriptorSetRecord>,
    creation_order: Vec<ResourceKey>,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("backend", &self.backend.name())
            .field("images", &self.images.len())
            .field("buffers", &self.buffers.len())
            .field("acceleration_structures", &self.acceleration_structures.len())
            .field("pipelines", &self.pipelines.len())
            .field("descriptor_sets", &self.descriptor_sets.len())
            .finish()
    }
}

fn creation_failed(what: &str, label: &Option<String>, err: impl std::fmt::Display) -> GraphicsError {
    GraphicsError::ResourceCreationFailed(format!(
        "{what} {}: {err}",
        label.as_deref().unwrap_or("<unnamed>")
    ))
}

impl ResourceRegistry {
    pub fn new(backend: Arc<dyn GraphicsBackend>) -> Self {
        Self {
            backend,
            images: Arena::new(),
            buffers: Arena::new(),
            acceleration_structures: Arena::new(),
            pipelines: Arena::new(),
            descriptor_sets: Arena::new(),
            creation_order: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn GraphicsBackend> {
        &self.backend
    }

    /// Create an image owned by the registry.
    pub fn create_image(&mut self, descriptor: TextureDescriptor) -> GraphicsResult<ImageId> {
        let handle = self
            .backend
            .create_image(&descriptor)
            .map_err(|e| creation_failed("image", &descriptor.label, e))?;
        let id = self.images.insert(ImageRecord {
            handle,
            descriptor,
            imported: false,
        });
        self.creation_order.push(ResourceKey::Image(id));
        Ok(id)
    }

    /// Register an image owned elsewhere, such as a swapchain image.
    pub fn import_image(&mut self, handle: GpuImage, descriptor: TextureDescriptor) -> ImageId {
        self.images.insert(ImageRecord {
            handle,
            descriptor,
            imported: true,
        })
    }

    pub fn create_buffer(&mut self, descriptor: BufferDescriptor) -> GraphicsResult<BufferId> {
        let handle = self
            .backend
            .create_buffer(&descriptor)
            .map_err(|e| creation_failed("buffer", &descriptor.label, e))?;
        let id = self.buffers.insert(BufferRecord { handle, descriptor });
        self.creation_order.push(ResourceKey::Buffer(id));
        Ok(id)
    }

    /// Create an acceleration structure and query its device address.
    pub fn create_acceleration_structure(
        &mut self,
        descriptor: AccelerationStructureDescriptor,
    ) -> GraphicsResult<AccelerationStructureId> {
        let handle = self
            .backend
            .create_acceleration_structure(&descriptor)
            .map_err(|e| creation_failed("acceleration structure", &descriptor.label, e))?;
        let address = self.backend.acceleration_structure_address(handle);
        let id = self.acceleration_structures.insert(AccelerationStructureRecord {
            handle,
            descriptor,
            address,
        });
        self.creation_order
            .push(ResourceKey::AccelerationStructure(id));
        Ok(id)
    }

    pub fn create_pipeline(&mut self, descriptor: PipelineDescriptor) -> GraphicsResult<PipelineId> {
        let handle = self
            .backend
            .create_pipeline(&descriptor)
            .map_err(|e| creation_failed("pipeline", &descriptor.label, e))?;
        let id = self.pipelines.insert(PipelineRecord { handle, descriptor });
        self.creation_order.push(ResourceKey::Pipeline(id));
        Ok(id)
    }

    pub fn create_descriptor_set(&mut self, label: &str) -> GraphicsResult<DescriptorSetId> {
        let handle = self
            .backend
            .create_descriptor_set(label)
            .map_err(|e| creation_failed("descriptor set", &Some(label.to_string()), e))?;
        let id = self.descriptor_sets.insert(DescriptorSetRecord {
            handle,
            label: label.to_string(),
        });
        self.creation_order.push(ResourceKey::DescriptorSet(id));
        Ok(id)
    }

    pub fn image(&self, id: ImageId) -> GraphicsResult<&ImageRecord> {
        self.images
            .get(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))
    }

    pub fn buffer(&self, id: BufferId) -> GraphicsResult<&BufferRecord> {
        self.buffers
            .get(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))
    }

    pub fn acceleration_structure(
        &self,
        id: AccelerationStructureId,
    ) -> GraphicsResult<&AccelerationStructureRecord> {
        self.acceleration_structures
            .get(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))
    }

    pub fn pipeline(&self, id: PipelineId) -> GraphicsResult<&PipelineRecord> {
        self.pipelines
            .get(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))
    }

    pub fn descriptor_set(&self, id: DescriptorSetId) -> GraphicsResult<&DescriptorSetRecord> {
        self.descriptor_sets
            .get(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))
    }

    /// Format of an image.
    pub fn format(&self, id: ImageId) -> GraphicsResult<TextureFormat> {
        Ok(self.image(id)?.descriptor.format)
    }

    /// Write into a host-visible buffer.
    pub fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let record = self.buffer(id)?;
        if offset + data.len() as u64 > record.descriptor.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds {:?} ({} bytes)",
                data.len(),
                record.descriptor.label,
                record.descriptor.size
            )));
        }
        self.backend.write_buffer(record.handle, offset, data)?;
        Ok(())
    }

    /// Destroy a single buffer, used for temporary upload and scratch memory.
    pub fn destroy_buffer(&mut self, id: BufferId) -> GraphicsResult<()> {
        let record = self
            .buffers
            .remove(id)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{id:?}")))?;
        self.backend.destroy_buffer(record.handle);
        Ok(())
    }

    /// Number of live registry-owned and imported resources.
    pub fn resource_count(&self) -> usize {
        self.images.len()
            + self.buffers.len()
            + self.acceleration_structures.len()
            + self.pipelines.len()
            + self.descriptor_sets.len()
    }

    /// Release every owned resource, newest first.
    ///
    /// The caller must ensure the GPU is idle. Calling this twice is a no-op.
    pub fn destroy_all(&mut self) {
        let order = std::mem::take(&mut self.creation_order);
        if !order.is_empty() {
            log::debug!("Destroying {} GPU resources", order.len());
        }

        for key in order.into_iter().rev() {
            match key {
                ResourceKey::Image(id) => {
                    if let Some(record) = self.images.remove(id) {
                        self.backend.destroy_image(record.handle);
                    }
                }
                ResourceKey::Buffer(id) => {
                    if let Some(record) = self.buffers.remove(id) {
                        self.backend.destroy_buffer(record.handle);
                    }
                }
                ResourceKey::AccelerationStructure(id) => {
                    if let Some(record) = self.acceleration_structures.remove(id) {
                        self.backend.destroy_acceleration_structure(record.handle);
                    }
                }
                ResourceKey::Pipeline(id) => {
                    if let Some(record) = self.pipelines.remove(id) {
                        self.backend.destroy_pipeline(record.handle);
                    }
                }
                ResourceKey::DescriptorSet(id) => {
                    if let Some(record) = self.descriptor_sets.remove(id) {
                        self.backend.destroy_descriptor_set(record.handle);
                    }
                }
            }
        }
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
