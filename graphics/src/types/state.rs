//! Resource access/layout state tracked per image and buffer.

use bitflags::bitflags;

bitflags! {
    /// How a resource is accessed by the next GPU work that touches it.
    ///
    /// An empty set means the state is unknown (freshly created or acquired
    /// from the presentation engine).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessBits: u32 {
        /// Read as a constant buffer.
        const CONSTANT_BUFFER = 1 << 0;
        /// Sampled or read-only shader access.
        const SHADER_RESOURCE = 1 << 1;
        /// Unordered read-write shader access.
        const SHADER_RESOURCE_STORAGE = 1 << 2;
        /// Source of a copy.
        const COPY_SOURCE = 1 << 3;
        /// Destination of a copy.
        const COPY_DESTINATION = 1 << 4;
        /// Rendered to as a color attachment.
        const COLOR_ATTACHMENT = 1 << 5;
        /// Read during ray traversal or as a build input.
        const ACCELERATION_STRUCTURE_READ = 1 << 6;
        /// Written by an acceleration structure build.
        const ACCELERATION_STRUCTURE_WRITE = 1 << 7;
    }
}

impl AccessBits {
    /// Whether this access includes unordered read-write shader access.
    pub fn is_storage(self) -> bool {
        self.contains(Self::SHADER_RESOURCE_STORAGE)
    }

    /// Whether this access may write the resource.
    pub fn is_write(self) -> bool {
        self.intersects(
            Self::SHADER_RESOURCE_STORAGE
                | Self::COPY_DESTINATION
                | Self::COLOR_ATTACHMENT
                | Self::ACCELERATION_STRUCTURE_WRITE,
        )
    }
}

impl Default for AccessBits {
    fn default() -> Self {
        Self::empty()
    }
}

/// Memory layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents are undefined.
    #[default]
    Undefined,
    /// Usable by any access, required for storage access.
    General,
    /// Optimal for read-only shader access.
    ShaderResource,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal as a copy source.
    CopySource,
    /// Optimal as a copy destination.
    CopyDestination,
    /// Ready for presentation.
    Present,
}

/// Declared `(access, layout)` pair of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceState {
    pub access: AccessBits,
    pub layout: ImageLayout,
}

impl ResourceState {
    /// Unknown contents.
    pub const UNDEFINED: Self = Self::new(AccessBits::empty(), ImageLayout::Undefined);
    /// Read-only shader access.
    pub const SHADER_RESOURCE: Self =
        Self::new(AccessBits::SHADER_RESOURCE, ImageLayout::ShaderResource);
    /// Read-write shader access.
    pub const STORAGE: Self = Self::new(AccessBits::SHADER_RESOURCE_STORAGE, ImageLayout::General);
    /// Copy source.
    pub const COPY_SOURCE: Self = Self::new(AccessBits::COPY_SOURCE, ImageLayout::CopySource);
    /// Copy destination.
    pub const COPY_DESTINATION: Self =
        Self::new(AccessBits::COPY_DESTINATION, ImageLayout::CopyDestination);
    /// Color attachment.
    pub const COLOR_ATTACHMENT: Self =
        Self::new(AccessBits::COLOR_ATTACHMENT, ImageLayout::ColorAttachment);
    /// Presentable.
    pub const PRESENT: Self = Self::new(AccessBits::empty(), ImageLayout::Present);

    pub const fn new(access: AccessBits, layout: ImageLayout) -> Self {
        Self { access, layout }
    }

    /// State an image starts in when created with `access`.
    ///
    /// Read-only shader access gets the shader-resource layout, everything
    /// else starts in the general layout.
    pub fn initial(access: AccessBits) -> Self {
        let layout = if access == AccessBits::SHADER_RESOURCE {
            ImageLayout::ShaderResource
        } else {
            ImageLayout::General
        };
        Self::new(access, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_layout() {
        assert_eq!(
            ResourceState::initial(AccessBits::SHADER_RESOURCE),
            ResourceState::SHADER_RESOURCE
        );
        assert_eq!(
            ResourceState::initial(AccessBits::SHADER_RESOURCE_STORAGE),
            ResourceState::STORAGE
        );
        assert_eq!(
            ResourceState::initial(AccessBits::COPY_SOURCE).layout,
            ImageLayout::General
        );
    }

    #[test]
    fn test_access_classification() {
        assert!(AccessBits::SHADER_RESOURCE_STORAGE.is_storage());
        assert!(!AccessBits::SHADER_RESOURCE.is_storage());
        assert!(AccessBits::COPY_DESTINATION.is_write());
        assert!(!AccessBits::COPY_SOURCE.is_write());
    }
}
