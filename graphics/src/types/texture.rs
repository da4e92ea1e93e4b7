//! Texture types and descriptors.

use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 32-bit red channel, float.
    R32Float,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// Packed 11/11/10-bit unsigned float RGB.
    Rg11B10Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10A2Unorm,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
}

impl TextureFormat {
    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R32Float
            | Self::Rg16Float
            | Self::Rg11B10Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgb10A2Unorm => 4,
            Self::Rgba16Float => 8,
        }
    }

    /// Returns true if reads and writes go through sRGB conversion.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const SHADER_RESOURCE = 1 << 2;
        /// Texture can be used as a storage texture.
        const STORAGE = 1 << 3;
        /// Texture can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Two-dimensional size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square extent.
    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Extent scaled by `scale` with round-to-nearest, at least 1x1.
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            width: ((self.width as f32 * scale + 0.5) as u32).max(1),
            height: ((self.height as f32 * scale + 0.5) as u32).max(1),
        }
    }

    /// Number of `tile`-sized groups needed to cover the extent.
    pub fn groups(&self, tile: u32) -> [u32; 3] {
        [self.width.div_ceil(tile), self.height.div_ceil(tile), 1]
    }

    /// `[width, height]` as floats.
    pub fn as_f32(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent2d,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(size: Extent2d, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size,
            format,
            usage,
        }
    }

    /// Set the debug label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Size of the image contents in bytes.
    pub fn byte_size(&self) -> u64 {
        self.size.width as u64 * self.size.height as u64 * self.format.block_size() as u64
    }
}
