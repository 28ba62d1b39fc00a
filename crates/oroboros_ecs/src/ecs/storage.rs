//! # Component Storage
//!
//! One [`ComponentPool`] per (world, component type), created lazily on the
//! first add. Slots handed out by a pool stay valid until released.

use std::any::Any;

use super::component::Component;
use super::registry::ComponentType;
use crate::memory::{PoolAllocator, PoolHandle};

/// Dense storage for one component type.
pub struct ComponentPool<C: Component> {
    type_index: u32,
    pool: PoolAllocator<C>,
}

impl<C: Component> ComponentPool<C> {
    /// Creates an empty pool that grows by the descriptor's segment size.
    #[must_use]
    pub fn new(descriptor: &ComponentType) -> Self {
        Self {
            type_index: descriptor.type_index(),
            pool: PoolAllocator::new(descriptor.segment_size()),
        }
    }

    /// Type index of the stored component.
    #[inline]
    #[must_use]
    pub const fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Stores `value` in a free slot.
    #[inline]
    pub fn allocate(&mut self, value: C) -> PoolHandle {
        self.pool.allocate(value)
    }

    /// Reads the component in `slot`.
    #[inline]
    #[must_use]
    pub fn dereference(&self, slot: PoolHandle) -> Option<&C> {
        self.pool.get(slot)
    }

    /// Mutably reads the component in `slot`.
    #[inline]
    pub fn dereference_mut(&mut self, slot: PoolHandle) -> Option<&mut C> {
        self.pool.get_mut(slot)
    }

    /// Frees `slot` and returns its value.
    #[inline]
    pub fn release(&mut self, slot: PoolHandle) -> Option<C> {
        self.pool.free(slot)
    }

    /// Number of live components.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pool.allocated_count()
    }

    /// Returns true if no component is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pool.allocated_count() == 0
    }

    /// Total slots reserved so far.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Iterates live components with their slots.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &C)> {
        self.pool.iter()
    }
}

/// Type-erased pool operations, used where the component type is only
/// known by index.
trait ErasedPool {
    fn release(&mut self, slot: PoolHandle) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> ErasedPool for ComponentPool<C> {
    fn release(&mut self, slot: PoolHandle) -> bool {
        self.pool.free(slot).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All component pools of one world, indexed by type index.
#[derive(Default)]
pub struct ComponentPools {
    pools: Vec<Option<Box<dyn ErasedPool>>>,
}

impl ComponentPools {
    /// Returns the pool for `C`, if one was created.
    #[must_use]
    pub fn get<C: Component>(&self, type_index: u32) -> Option<&ComponentPool<C>> {
        self.pools
            .get(type_index as usize)?
            .as_ref()?
            .as_any()
            .downcast_ref::<ComponentPool<C>>()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut<C: Component>(&mut self, type_index: u32) -> Option<&mut ComponentPool<C>> {
        self.pools
            .get_mut(type_index as usize)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<ComponentPool<C>>()
    }

    /// Returns the pool for `C`, creating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the slot for this type index holds a different type.
    pub fn ensure<C: Component>(&mut self, descriptor: &ComponentType) -> &mut ComponentPool<C> {
        let index = descriptor.type_index() as usize;
        if self.pools.len() <= index {
            self.pools.resize_with(index + 1, || None);
        }

        let entry = self.pools[index].get_or_insert_with(|| {
            tracing::trace!(
                component = descriptor.name(),
                segment_size = descriptor.segment_size(),
                "component pool created"
            );
            Box::new(ComponentPool::<C>::new(descriptor))
        });
        match entry.as_any_mut().downcast_mut::<ComponentPool<C>>() {
            Some(pool) => pool,
            None => panic!(
                "pool #{} does not store {}",
                descriptor.type_index(),
                descriptor.name()
            ),
        }
    }

    /// Releases `slot` in the pool at `type_index`.
    pub(crate) fn release(&mut self, type_index: u32, slot: PoolHandle) -> bool {
        self.pools
            .get_mut(type_index as usize)
            .and_then(Option::as_mut)
            .is_some_and(|pool| pool.release(slot))
    }

    /// Number of pools created so far.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.iter().filter(|pool| pool.is_some()).count()
    }
}
