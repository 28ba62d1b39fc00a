//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the entity record table
//! - A generation counter for safe reuse
//! - The id of the world that issued them
//!
//! The record behind an index is never freed, only recycled with a higher
//! generation, so stale handles are detected rather than misdirected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use super::registry::presence_bit;
use crate::error::{EcsError, EcsResult};
use crate::memory::PoolHandle;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the record table
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The index into the record table (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the packed 64-bit value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

/// Identifies the world that issued an entity handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u32);

impl WorldId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Handle to an entity in a specific world.
///
/// Two handles are equal only if index, generation and world all match.
/// A handle owns nothing; it stays `Copy` and goes stale on destroy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    id: EntityId,
    world: WorldId,
}

impl Entity {
    #[inline]
    pub(crate) const fn new(id: EntityId, world: WorldId) -> Self {
        Self { id, world }
    }

    /// Returns the packed generational id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Returns the record index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.id.index()
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.id.generation()
    }

    /// Returns the issuing world.
    #[inline]
    #[must_use]
    pub const fn world(self) -> WorldId {
        self.world
    }
}

/// Per-slot entity state.
#[derive(Debug)]
pub(crate) struct EntityRecord {
    pub(crate) generation: u32,
    pub(crate) alive: bool,
    pub(crate) destroying: bool,
    /// OR of held presence bits; may over-approximate.
    pub(crate) mask: u64,
    pub(crate) slots: HashMap<u32, PoolHandle>,
}

impl EntityRecord {
    fn fresh() -> Self {
        Self {
            generation: 1,
            alive: false,
            destroying: false,
            mask: 0,
            slots: HashMap::new(),
        }
    }

    /// Exact presence test: the bit narrows, the slot map decides.
    #[inline]
    pub(crate) fn holds(&self, type_index: u32) -> bool {
        self.mask & presence_bit(type_index) != 0 && self.slots.contains_key(&type_index)
    }

    #[inline]
    pub(crate) fn slot(&self, type_index: u32) -> Option<PoolHandle> {
        if self.mask & presence_bit(type_index) == 0 {
            return None;
        }
        self.slots.get(&type_index).copied()
    }
}

/// Pooled entity records with a free list of recyclable indices.
pub(crate) struct EntityStore {
    records: Vec<EntityRecord>,
    free_indices: Vec<u32>,
    alive_count: usize,
    segment_size: usize,
    max_entities: Option<usize>,
}

impl EntityStore {
    pub(crate) fn new(segment_size: usize, max_entities: Option<usize>) -> Self {
        Self {
            records: Vec::with_capacity(segment_size),
            free_indices: Vec::new(),
            alive_count: 0,
            segment_size,
            max_entities,
        }
    }

    #[inline]
    pub(crate) const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Issues an id, reusing the most recently freed index first.
    pub(crate) fn allocate(&mut self) -> EcsResult<EntityId> {
        if let Some(max) = self.max_entities {
            if self.alive_count >= max {
                return Err(EcsError::CapacityExhausted { max });
            }
        }

        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                if self.records.len() == self.records.capacity() {
                    self.records.reserve(self.segment_size);
                }
                let index = u32::try_from(self.records.len()).map_err(|_| {
                    EcsError::CapacityExhausted {
                        max: u32::MAX as usize,
                    }
                })?;
                self.records.push(EntityRecord::fresh());
                index
            }
        };

        let record = &mut self.records[index as usize];
        record.alive = true;
        self.alive_count += 1;

        Ok(EntityId::new(index, record.generation))
    }

    /// Returns the record if `id` is current.
    #[inline]
    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records
            .get(id.index() as usize)
            .filter(|record| record.alive && record.generation == id.generation())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records
            .get_mut(id.index() as usize)
            .filter(|record| record.alive && record.generation == id.generation())
    }

    #[inline]
    pub(crate) fn is_current(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Retires `id` and bumps the slot's generation. An index whose
    /// generation would overflow is never reissued.
    ///
    /// The caller must have released every pool slot first.
    pub(crate) fn recycle(&mut self, id: EntityId) -> bool {
        let Some(record) = self.get_mut(id) else {
            return false;
        };

        record.alive = false;
        record.destroying = false;
        record.mask = 0;
        record.slots.clear();
        // An exhausted index is retired so old handles never match again.
        let next = record.generation.checked_add(1);
        if let Some(generation) = next {
            record.generation = generation;
        }

        self.alive_count -= 1;
        match next {
            Some(_) => self.free_indices.push(id.index()),
            None => tracing::debug!(index = id.index(), "entity index retired"),
        }
        true
    }
}
