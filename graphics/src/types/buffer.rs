//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be bound as a constant (uniform) buffer.
        const CONSTANT = 1 << 0;
        /// Buffer can be bound as a structured/storage buffer.
        const STORAGE = 1 << 1;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 2;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 3;
        /// Buffer lives in CPU-visible memory and can be written by the host.
        const HOST_WRITE = 1 << 4;
        /// Buffer is read by acceleration structure builds (geometry, instances).
        const ACCELERATION_STRUCTURE_INPUT = 1 << 5;
        /// Buffer backs acceleration structure storage.
        const ACCELERATION_STRUCTURE_STORAGE = 1 << 6;
        /// Buffer is scratch memory for acceleration structure builds.
        const SCRATCH = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether the host can write the buffer directly.
    pub fn is_host_visible(&self) -> bool {
        self.usage.contains(BufferUsage::HOST_WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor() {
        let desc = BufferDescriptor::new(1024, BufferUsage::HOST_WRITE | BufferUsage::COPY_SRC)
            .with_label("staging");
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.label.as_deref(), Some("staging"));
        assert!(desc.is_host_visible());
    }
}
