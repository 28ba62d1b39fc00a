//! # Component Registry
//!
//! Maps each component type to a [`ComponentType`] descriptor: a sequential
//! type index, a presence bit and the pool segment size.
//!
//! Two ways to use it:
//! - Build a [`ComponentRegistry`] explicitly and hand it to
//!   [`World::with_registry`](crate::World::with_registry).
//! - Stage types in the process-wide registry with
//!   [`register_component_type`]. The first [`World::new`](crate::World::new)
//!   seals it and every later world shares the same type indices.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::component::Component;
use crate::error::{EcsError, EcsResult};

/// Returns the presence bit for a type index.
///
/// Indices 64 apart share a bit, so the bit alone never proves presence.
#[inline]
#[must_use]
pub const fn presence_bit(type_index: u32) -> u64 {
    1u64 << (type_index % 64)
}

/// Immutable descriptor of a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentType {
    type_index: u32,
    bit: u64,
    segment_size: usize,
    name: &'static str,
    type_id: TypeId,
}

impl ComponentType {
    /// Sequential index, starting at 1.
    #[inline]
    #[must_use]
    pub const fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Presence bit, `1 << (type_index % 64)`.
    #[inline]
    #[must_use]
    pub const fn bit(&self) -> u64 {
        self.bit
    }

    /// Number of slots each pool segment holds.
    #[inline]
    #[must_use]
    pub const fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Rust type name, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type id of the component.
    #[inline]
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// Write-once table of component descriptors.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: HashMap<TypeId, ComponentType>,
    by_index: Vec<ComponentType>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and assigns it the next type index.
    ///
    /// # Arguments
    ///
    /// * `segment_size` - Slots per growth step of `T`'s pools
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `T` is known, `InvalidSegmentSize` if the
    /// segment size is zero.
    pub fn register<T: Component>(&mut self, segment_size: usize) -> EcsResult<ComponentType> {
        let name = type_name::<T>();
        if segment_size == 0 {
            return Err(EcsError::InvalidSegmentSize {
                name,
                size: segment_size,
            });
        }

        let type_id = TypeId::of::<T>();
        if self.types.contains_key(&type_id) {
            return Err(EcsError::AlreadyRegistered(name));
        }

        let type_index = u32::try_from(self.by_index.len() + 1)
            .map_err(|_| EcsError::InvalidConfig("component type index overflow".to_string()))?;
        let descriptor = ComponentType {
            type_index,
            bit: presence_bit(type_index),
            segment_size,
            name,
            type_id,
        };
        self.types.insert(type_id, descriptor);
        self.by_index.push(descriptor);

        Ok(descriptor)
    }

    /// Looks up `T`'s descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    #[must_use]
    pub fn lookup<T: Component>(&self) -> &ComponentType {
        match self.try_lookup::<T>() {
            Some(descriptor) => descriptor,
            None => panic!("{}", EcsError::NotRegistered(type_name::<T>())),
        }
    }

    /// Looks up `T`'s descriptor without panicking.
    #[inline]
    #[must_use]
    pub fn try_lookup<T: Component>(&self) -> Option<&ComponentType> {
        self.types.get(&TypeId::of::<T>())
    }

    /// Looks up a descriptor by its type index.
    #[must_use]
    pub fn by_index(&self, type_index: u32) -> Option<&ComponentType> {
        let slot = usize::try_from(type_index).ok()?.checked_sub(1)?;
        self.by_index.get(slot)
    }

    /// Number of registered types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Returns true if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Iterates descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentType> {
        self.by_index.iter()
    }
}

// =============================================================================
// Process-wide registry
// =============================================================================

static STAGING: Mutex<Option<ComponentRegistry>> = parking_lot::const_mutex(None);
static SEALED: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();

/// Registers `T` in the process-wide registry.
///
/// Must run during startup, before the first [`World::new`](crate::World::new).
///
/// # Errors
///
/// `RegistrySealed` once a world exists, otherwise as [`ComponentRegistry::register`].
pub fn register_component_type<T: Component>(segment_size: usize) -> EcsResult<ComponentType> {
    let mut staging = STAGING.lock();
    if SEALED.get().is_some() {
        return Err(EcsError::RegistrySealed(type_name::<T>()));
    }
    staging
        .get_or_insert_with(ComponentRegistry::new)
        .register::<T>(segment_size)
}

/// Looks up `T` in the process-wide registry.
///
/// # Panics
///
/// Panics if `T` was never registered.
#[must_use]
pub fn component_type<T: Component>() -> ComponentType {
    if let Some(sealed) = SEALED.get() {
        return *sealed.lookup::<T>();
    }
    let staging = STAGING.lock();
    match staging.as_ref().and_then(ComponentRegistry::try_lookup::<T>) {
        Some(descriptor) => *descriptor,
        None => panic!("{}", EcsError::NotRegistered(type_name::<T>())),
    }
}

/// Freezes the process-wide registry and returns the shared snapshot.
pub(crate) fn sealed_registry() -> Arc<ComponentRegistry> {
    Arc::clone(SEALED.get_or_init(|| {
        let registry = STAGING.lock().take().unwrap_or_default();
        tracing::debug!(types = registry.len(), "component registry sealed");
        Arc::new(registry)
    }))
}
