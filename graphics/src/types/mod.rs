//! Descriptor and state types shared by the registry, tracker and backends.

mod buffer;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use state::{AccessBits, ImageLayout, ResourceState};
pub use texture::{Extent2d, TextureDescriptor, TextureFormat, TextureUsage};
