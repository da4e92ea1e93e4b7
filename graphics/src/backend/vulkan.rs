//! Translation layer from recorded barriers and formats to Vulkan; no device backend lives here.
//!
//! A Vulkan device backend records [`Command::Barrier`](super::Command)
//! through [`ImageBarrierBatch`], which turns the tracked `(access, layout)`
//! pairs into one `vkCmdPipelineBarrier` call.

use ash::vk;
use ash::vk::Handle;

use super::{GpuBufferBarrier, GpuImageBarrier};
use crate::types::{AccessBits, ImageLayout, TextureFormat, TextureUsage};

/// Convert an image layout.
pub fn convert_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::CopyDestination => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Convert access bits to Vulkan access flags.
pub fn convert_access(access: AccessBits) -> vk::AccessFlags {
    let mut result = vk::AccessFlags::empty();

    if access.contains(AccessBits::CONSTANT_BUFFER) {
        result |= vk::AccessFlags::UNIFORM_READ;
    }
    if access.contains(AccessBits::SHADER_RESOURCE) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if access.contains(AccessBits::SHADER_RESOURCE_STORAGE) {
        result |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if access.contains(AccessBits::COPY_SOURCE) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if access.contains(AccessBits::COPY_DESTINATION) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if access.contains(AccessBits::COLOR_ATTACHMENT) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if access.contains(AccessBits::ACCELERATION_STRUCTURE_READ) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR;
    }
    if access.contains(AccessBits::ACCELERATION_STRUCTURE_WRITE) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR;
    }

    result
}

/// Pipeline stages that may perform `access`.
pub fn access_stages(access: AccessBits) -> vk::PipelineStageFlags {
    if access.is_empty() {
        return vk::PipelineStageFlags::TOP_OF_PIPE;
    }

    let mut result = vk::PipelineStageFlags::empty();
    if access.intersects(
        AccessBits::CONSTANT_BUFFER
            | AccessBits::SHADER_RESOURCE
            | AccessBits::SHADER_RESOURCE_STORAGE,
    ) {
        result |= vk::PipelineStageFlags::COMPUTE_SHADER
            | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if access.intersects(AccessBits::COPY_SOURCE | AccessBits::COPY_DESTINATION) {
        result |= vk::PipelineStageFlags::TRANSFER;
    }
    if access.contains(AccessBits::COLOR_ATTACHMENT) {
        result |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if access.intersects(
        AccessBits::ACCELERATION_STRUCTURE_READ | AccessBits::ACCELERATION_STRUCTURE_WRITE,
    ) {
        result |= vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR;
    }
    result
}

/// Convert a texture format.
pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rg11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
    }
}

/// Convert texture usage flags to Vulkan image usage flags.
pub fn convert_texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::SHADER_RESOURCE) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }

    result
}

/// One recorded barrier batch in Vulkan form.
#[derive(Debug, Default)]
pub struct ImageBarrierBatch {
    images: Vec<vk::ImageMemoryBarrier<'static>>,
    buffers: Vec<vk::BufferMemoryBarrier<'static>>,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl ImageBarrierBatch {
    pub fn new(images: &[GpuImageBarrier], buffers: &[GpuBufferBarrier]) -> Self {
        let mut batch = Self::default();
        for barrier in images {
            batch.src_stage_mask |= access_stages(barrier.before.access);
            batch.dst_stage_mask |= access_stages(barrier.after.access);
            batch.images.push(
                vk::ImageMemoryBarrier::default()
                    .old_layout(convert_layout(barrier.before.layout))
                    .new_layout(convert_layout(barrier.after.layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk::Image::from_raw(barrier.image.raw()))
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    })
                    .src_access_mask(convert_access(barrier.before.access))
                    .dst_access_mask(convert_access(barrier.after.access)),
            );
        }
        for barrier in buffers {
            batch.src_stage_mask |= access_stages(barrier.before);
            batch.dst_stage_mask |= access_stages(barrier.after);
            batch.buffers.push(
                vk::BufferMemoryBarrier::default()
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(vk::Buffer::from_raw(barrier.buffer.raw()))
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .src_access_mask(convert_access(barrier.before))
                    .dst_access_mask(convert_access(barrier.after)),
            );
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty()
    }

    pub fn image_barriers(&self) -> &[vk::ImageMemoryBarrier<'static>] {
        &self.images
    }

    pub fn stage_masks(&self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        (self.src_stage_mask, self.dst_stage_mask)
    }

    /// Record the batch as one pipeline barrier. Empty batches record nothing.
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage_mask,
                self.dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffers,
                &self.images,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuImage;
    use crate::types::ResourceState;

    #[test]
    fn test_storage_access_is_read_write() {
        let flags = convert_access(AccessBits::SHADER_RESOURCE_STORAGE);
        assert!(flags.contains(vk::AccessFlags::SHADER_WRITE));
        assert!(flags.contains(vk::AccessFlags::SHADER_READ));
    }

    #[test]
    fn test_batch_collects_stages() {
        let batch = ImageBarrierBatch::new(
            &[GpuImageBarrier {
                image: GpuImage::from_raw(7),
                before: ResourceState::STORAGE,
                after: ResourceState::COPY_SOURCE,
            }],
            &[],
        );
        assert_eq!(batch.image_barriers().len(), 1);
        assert_eq!(
            batch.image_barriers()[0].new_layout,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        );
        let (src, dst) = batch.stage_masks();
        assert!(src.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert_eq!(dst, vk::PipelineStageFlags::TRANSFER);
    }
}
