//! GPU-facing instance records.
//!
//! Instances are identified by an [`InstanceId`] while the TLAS is being
//! assembled. The id is packed into the 24-bit custom index of a native
//! instance record only when it is serialized:
//!
//! ```text
//!  23     20 19                    0
//! +---------+-----------------------+
//! |  flag   |    instance index     |
//! +---------+-----------------------+
//! ```

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use rtframe_core::math::Rows3x4;
use rtframe_core::scene::Material;

use crate::error::{GraphicsError, GraphicsResult};

/// Bit position of the flag inside a packed instance id.
pub const FLAG_FIRST_BIT: u32 = 20;

/// Number of distinct instance indices a packed id can address.
pub const INSTANCE_INDEX_LIMIT: u32 = 1 << FLAG_FIRST_BIT;

/// Classification of a TLAS instance. Exactly one per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceFlag {
    /// Opaque or alpha-tested geometry.
    Opaque,
    Transparent,
    /// Emissive material with emission enabled.
    Emissive,
    /// Non-emissive geometry promoted to a light source.
    ForcedEmissive,
}

impl InstanceFlag {
    /// Flag bits as stored in the id and the instance mask.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Opaque => 0x01,
            Self::Transparent => 0x02,
            Self::Emissive => 0x04,
            Self::ForcedEmissive => 0x08,
        }
    }

    /// Whether instances with this flag belong in the light TLAS.
    pub const fn is_light(self) -> bool {
        matches!(self, Self::Emissive | Self::ForcedEmissive)
    }
}

/// Dense instance index plus classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    pub index: u32,
    pub flag: InstanceFlag,
}

impl InstanceId {
    pub fn new(index: u32, flag: InstanceFlag) -> Self {
        Self { index, flag }
    }

    /// Pack into the `index | flag << 20` layout read by shaders.
    pub fn pack(self) -> GraphicsResult<u32> {
        if self.index >= INSTANCE_INDEX_LIMIT {
            return Err(GraphicsError::InstanceCapacityExceeded {
                requested: self.index as usize + 1,
                capacity: INSTANCE_INDEX_LIMIT as usize,
            });
        }
        Ok(self.index | (self.flag.bits() << FLAG_FIRST_BIT))
    }
}

bitflags! {
    /// Per-instance flags of a native TLAS record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TlasInstanceFlags: u8 {
        const TRIANGLE_CULL_DISABLE = 1 << 0;
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 1 << 1;
        const FORCE_OPAQUE = 1 << 2;
        const FORCE_NO_OPAQUE = 1 << 3;
    }
}

/// Per-instance data read by the ray tracing shaders.
///
/// The `w` column of the object-to-world rows carries bit-cast payload:
/// base primitive id, material index and packed material colour.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub object_to_world: Rows3x4,
    pub world_to_world_prev: Rows3x4,
}

const_assert_eq!(std::mem::size_of::<InstanceData>(), 96);

impl InstanceData {
    pub fn new(
        object_to_world: Rows3x4,
        world_to_world_prev: Rows3x4,
        base_primitive_id: u32,
        material_index: u32,
        packed_material: u32,
    ) -> Self {
        let mut rows = object_to_world;
        rows[0][3] = f32::from_bits(base_primitive_id);
        rows[1][3] = f32::from_bits(material_index);
        rows[2][3] = f32::from_bits(packed_material);
        Self {
            object_to_world: rows,
            world_to_world_prev,
        }
    }

    pub fn base_primitive_id(&self) -> u32 {
        self.object_to_world[0][3].to_bits()
    }

    pub fn material_index(&self) -> u32 {
        self.object_to_world[1][3].to_bits()
    }

    pub fn packed_material(&self) -> u32 {
        self.object_to_world[2][3].to_bits()
    }
}

/// Native top-level instance record (64 bytes, the layout ray tracing APIs
/// consume directly).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TlasInstanceDesc {
    pub transform: Rows3x4,
    /// Custom index in the low 24 bits, visibility mask in the high 8.
    pub custom_index_and_mask: u32,
    /// Shader binding table offset in the low 24 bits, flags in the high 8.
    pub sbt_offset_and_flags: u32,
    /// Device address of the referenced BLAS.
    pub blas_address: u64,
}

const_assert_eq!(std::mem::size_of::<TlasInstanceDesc>(), 64);

impl TlasInstanceDesc {
    pub fn new(
        transform: Rows3x4,
        custom_index: u32,
        mask: u8,
        sbt_offset: u32,
        flags: TlasInstanceFlags,
        blas_address: u64,
    ) -> Self {
        Self {
            transform,
            custom_index_and_mask: (custom_index & 0x00FF_FFFF) | ((mask as u32) << 24),
            sbt_offset_and_flags: (sbt_offset & 0x00FF_FFFF) | ((flags.bits() as u32) << 24),
            blas_address,
        }
    }

    pub fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & 0x00FF_FFFF
    }

    pub fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub fn flags(&self) -> TlasInstanceFlags {
        TlasInstanceFlags::from_bits_truncate((self.sbt_offset_and_flags >> 24) as u8)
    }
}

/// Quantize `value` (clamped to `[0, 1]`) to an unsigned normalized integer of `bits` bits.
pub fn pack_unorm(value: f32, bits: u32) -> u32 {
    if bits == 0 {
        return 0;
    }
    let max = ((1u32 << bits) - 1) as f32;
    (value.clamp(0.0, 1.0) * max + 0.5) as u32
}

/// Average material colour packed into 32 bits.
///
/// Base colour RGB at 7 bits each (bits 0..21), specular green at 6 bits
/// (bits 21..27) and specular blue at 5 bits (bits 27..32).
pub fn packed_material_color(material: &Material) -> u32 {
    let [r, g, b, _] = material.avg_base_color;
    let [_, spec_g, spec_b] = material.avg_specular_color;

    pack_unorm(r, 7)
        | pack_unorm(g, 7) << 7
        | pack_unorm(b, 7) << 14
        | pack_unorm(spec_g, 6) << 21
        | pack_unorm(spec_b, 5) << 27
}
