//! Typed arenas for resource records.
//!
//! Each resource kind lives in its own [`Arena`] and is addressed by its own
//! id type, so an [`ImageId`] can never be used to look up a buffer. Slots
//! are never reused: destroying a record leaves a hole and later lookups of
//! that id fail.

use std::marker::PhantomData;

/// Conversion between an id type and its slot index.
pub trait ArenaId: Copy {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl ArenaId for $name {
            fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Id of an image in the [`ResourceRegistry`](super::ResourceRegistry).
    ImageId
);
arena_id!(
    /// Id of a buffer in the [`ResourceRegistry`](super::ResourceRegistry).
    BufferId
);
arena_id!(
    /// Id of a pipeline in the [`ResourceRegistry`](super::ResourceRegistry).
    PipelineId
);
arena_id!(
    /// Id of a descriptor set in the [`ResourceRegistry`](super::ResourceRegistry).
    DescriptorSetId
);
arena_id!(
    /// Id of an acceleration structure in the [`ResourceRegistry`](super::ResourceRegistry).
    AccelerationStructureId
);

/// Append-only storage of `T` addressed by `I`.
#[derive(Debug)]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    _id: PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            _id: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> I {
        self.slots.push(Some(value));
        I::from_index(self.slots.len() - 1)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Take a record out, leaving its slot empty.
    pub fn remove(&mut self, id: I) -> Option<T> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}
