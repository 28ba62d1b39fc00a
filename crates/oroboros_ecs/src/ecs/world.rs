//! # ECS World
//!
//! The central container for entities, component pools, filters, group
//! filters and lifecycle delegates.
//!
//! All maintenance is synchronous: by the time a mutation returns, every
//! filter and group filter reflects it and every listener has run.

use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use super::component::Component;
use super::entity::{Entity, EntityStore, WorldId};
use super::event::{
    ComponentEvent, ComponentEvents, SlotEvent, Subscription, SubscriptionTarget,
};
use super::filter::{FilterCore, FilterId};
use super::group::{GroupEntry, GroupId};
use super::registry::{sealed_registry, ComponentRegistry, ComponentType};
use super::storage::ComponentPools;
use crate::config::WorldConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::PoolHandle;

/// The ECS World - container for all entity state.
///
/// A world is single-threaded. Callbacks are `Rc`, so it is neither `Send`
/// nor `Sync`; serialize access externally if several threads need it.
///
/// # Example
///
/// ```rust,ignore
/// register_component_type::<Name>(256)?;
///
/// let mut world = World::new();
/// let named = world.register_filter(Filter1::<Name>::new(&world));
///
/// let bob = world.new_entity();
/// world.replace(bob, Name("Bob".into()));
/// assert!(named.contains(&world, bob));
/// ```
pub struct World {
    id: WorldId,
    config: WorldConfig,
    registry: Arc<ComponentRegistry>,
    pub(crate) entities: EntityStore,
    pub(crate) pools: ComponentPools,
    events: HashMap<u32, ComponentEvents>,

    // =========================================================================
    // Filter routing
    // =========================================================================
    pub(crate) filters: Vec<FilterCore>,
    pub(crate) filter_shapes: HashMap<TypeId, FilterId>,
    pub(crate) included_routes: HashMap<u32, Vec<FilterId>>,
    pub(crate) excluded_routes: HashMap<u32, Vec<FilterId>>,

    // =========================================================================
    // Group filter routing
    // =========================================================================
    pub(crate) groups: Vec<GroupEntry>,
    pub(crate) group_shapes: HashMap<TypeId, GroupId>,
    pub(crate) group_key_routes: HashMap<u32, Vec<GroupId>>,

    subscription_counter: u64,
}

impl World {
    /// Creates a world over the process-wide registry.
    ///
    /// The first call seals the registry: later
    /// [`register_component_type`](crate::register_component_type) calls fail.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world over the process-wide registry with explicit sizing.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self::with_registry(sealed_registry(), config)
    }

    /// Creates a world over an explicit, already populated registry.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation.
    #[must_use]
    pub fn with_registry(registry: Arc<ComponentRegistry>, config: WorldConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }

        let id = WorldId::next();
        tracing::debug!(
            world = id.get(),
            component_types = registry.len(),
            "world created"
        );

        Self {
            id,
            entities: EntityStore::new(config.entity_segment_size, config.max_entities),
            config,
            registry,
            pools: ComponentPools::default(),
            events: HashMap::new(),
            filters: Vec::new(),
            filter_shapes: HashMap::new(),
            included_routes: HashMap::new(),
            excluded_routes: HashMap::new(),
            groups: Vec::new(),
            group_shapes: HashMap::new(),
            group_key_routes: HashMap::new(),
            subscription_counter: 0,
        }
    }

    /// Returns this world's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> WorldId {
        self.id
    }

    /// Returns the sizing this world was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the component registry this world resolves types against.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Returns the component pools.
    #[inline]
    #[must_use]
    pub const fn pools(&self) -> &ComponentPools {
        &self.pools
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Number of registered filters.
    #[inline]
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Number of registered group filters.
    #[inline]
    #[must_use]
    pub fn group_filter_count(&self) -> usize {
        self.groups.len()
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Creates an entity with no components.
    ///
    /// # Panics
    ///
    /// Panics if the configured `max_entities` is reached.
    pub fn new_entity(&mut self) -> Entity {
        match self.try_new_entity() {
            Ok(entity) => entity,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`new_entity`](Self::new_entity).
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the configured `max_entities` is reached.
    pub fn try_new_entity(&mut self) -> EcsResult<Entity> {
        let id = self.entities.allocate()?;
        tracing::trace!(index = id.index(), generation = id.generation(), "entity created");
        Ok(Entity::new(id, self.id))
    }

    /// Checks if an entity handle is current in this world.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.world() == self.id && self.entities.is_current(entity.id())
    }

    /// Destroys an entity and all of its components.
    ///
    /// Idempotent: stale handles and entities already being destroyed are
    /// ignored. Filters drop the entity before its slots are released.
    ///
    /// # Panics
    ///
    /// Panics if `entity` belongs to another world.
    pub fn destroy(&mut self, entity: Entity) {
        self.assert_same_world(entity);
        let Some(record) = self.entities.get_mut(entity.id()) else {
            return;
        };
        if record.destroying {
            return;
        }
        record.destroying = true;

        let mut held: Vec<u32> = record.slots.keys().copied().collect();
        held.sort_unstable();
        for type_index in held {
            self.update_filters_before_remove(entity, type_index);
        }

        // Listeners may have added or removed components meanwhile.
        if let Some(record) = self.entities.get_mut(entity.id()) {
            let slots = std::mem::take(&mut record.slots);
            for (type_index, slot) in slots {
                self.pools.release(type_index, slot);
            }
        }
        self.entities.recycle(entity.id());
        tracing::trace!(index = entity.index(), generation = entity.generation(), "entity destroyed");
    }

    // =========================================================================
    // Lifecycle delegates
    // =========================================================================

    /// Subscribes to a lifecycle event of component `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn subscribe<T: Component>(
        &mut self,
        event: ComponentEvent,
        callback: impl Fn(&mut World, Entity) + 'static,
    ) -> Subscription {
        let type_index = self.registry.lookup::<T>().type_index();
        let subscription = self.next_subscription(SubscriptionTarget::Component { type_index, event });
        self.events
            .entry(type_index)
            .or_default()
            .entity_mut(event)
            .add(subscription.id, Rc::new(callback));
        subscription
    }

    /// Subscribes to an add event of component `T` that also carries the
    /// new pool slot.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn subscribe_slot<T: Component>(
        &mut self,
        event: SlotEvent,
        callback: impl Fn(&mut World, Entity, PoolHandle) + 'static,
    ) -> Subscription {
        let type_index = self.registry.lookup::<T>().type_index();
        let subscription = self.next_subscription(SubscriptionTarget::Slot { type_index, event });
        self.events
            .entry(type_index)
            .or_default()
            .slot_mut(event)
            .add(subscription.id, Rc::new(callback));
        subscription
    }

    /// Detaches a callback. Returns false if it was already detached.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        match subscription.target {
            SubscriptionTarget::Component { type_index, event } => self
                .events
                .get_mut(&type_index)
                .is_some_and(|events| events.entity_mut(event).remove(subscription.id)),
            SubscriptionTarget::Slot { type_index, event } => self
                .events
                .get_mut(&type_index)
                .is_some_and(|events| events.slot_mut(event).remove(subscription.id)),
            SubscriptionTarget::Filter(id) => self
                .filters
                .get_mut(id.0)
                .is_some_and(|filter| filter.listeners.remove(subscription.id)),
        }
    }

    pub(crate) fn next_subscription(&mut self, target: SubscriptionTarget) -> Subscription {
        self.subscription_counter += 1;
        Subscription {
            id: self.subscription_counter,
            target,
        }
    }

    pub(crate) fn fire(&mut self, type_index: u32, event: ComponentEvent, entity: Entity) {
        let Some(handlers) = self
            .events
            .get(&type_index)
            .and_then(|events| events.entity(event).snapshot())
        else {
            return;
        };
        for handler in handlers {
            handler(self, entity);
        }
    }

    pub(crate) fn fire_slot(&mut self, type_index: u32, event: SlotEvent, entity: Entity, slot: PoolHandle) {
        let Some(handlers) = self
            .events
            .get(&type_index)
            .and_then(|events| events.slot(event).snapshot())
        else {
            return;
        };
        for handler in handlers {
            handler(self, entity, slot);
        }
    }

    // =========================================================================
    // Contract checks
    // =========================================================================

    fn assert_same_world(&self, entity: Entity) {
        assert!(
            entity.world() == self.id,
            "entity {:?} belongs to world {}, not {}",
            entity.id(),
            entity.world().get(),
            self.id.get()
        );
    }

    /// Resolves `T` and validates the handle.
    ///
    /// # Panics
    ///
    /// Panics on a foreign or stale handle, or an unregistered type.
    pub(crate) fn check_entity<T: Component>(&self, entity: Entity) -> ComponentType {
        self.assert_same_world(entity);
        assert!(
            self.entities.is_current(entity.id()),
            "stale entity handle: index {} generation {}",
            entity.index(),
            entity.generation()
        );
        match self.registry.try_lookup::<T>() {
            Some(descriptor) => *descriptor,
            None => panic!("{}", EcsError::NotRegistered(std::any::type_name::<T>())),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id.get())
            .field("alive", &self.alive_count())
            .field("filters", &self.filters.len())
            .field("group_filters", &self.groups.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default, Debug, PartialEq)]
    struct Health(i32);
    impl Component for Health {}

    fn world() -> World {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>(8).unwrap();
        World::with_registry(Arc::new(registry), WorldConfig::compact())
    }

    #[test]
    fn test_spawn_destroy() {
        let mut world = world();
        let entity = world.new_entity();
        assert!(world.is_alive(entity));
        assert_eq!(world.alive_count(), 1);

        world.destroy(entity);
        assert!(!world.is_alive(entity));
        assert_eq!(world.alive_count(), 0);

        // Second destroy is a no-op.
        world.destroy(entity);
        assert_eq!(world.alive_count(), 0);
    }

    #[test]
    fn test_generation_prevents_stale_access() {
        let mut world = world();
        let first = world.new_entity();
        world.destroy(first);

        let second = world.new_entity();
        assert_eq!(first.index(), second.index());
        assert!(second.generation() > first.generation());
        assert!(!world.is_alive(first));
        assert!(world.is_alive(second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>(8).unwrap();
        let config = WorldConfig {
            max_entities: Some(1),
            ..WorldConfig::compact()
        };
        let mut world = World::with_registry(Arc::new(registry), config);

        world.new_entity();
        assert_eq!(
            world.try_new_entity(),
            Err(EcsError::CapacityExhausted { max: 1 })
        );
    }

    #[test]
    fn test_destroy_releases_slots() {
        let mut world = world();
        let entity = world.new_entity();
        world.replace(entity, Health(5));
        let index = world.registry().lookup::<Health>().type_index();
        assert_eq!(world.pools().get::<Health>(index).unwrap().len(), 1);

        world.destroy(entity);
        assert!(world.pools().get::<Health>(index).unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let mut world = world();
        let log = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&log);
        let sub = world.subscribe::<Health>(ComponentEvent::AfterAdd, move |_, e| {
            sink.borrow_mut().push(e);
        });

        let a = world.new_entity();
        world.replace(a, Health(1));
        assert!(world.unsubscribe(sub));
        assert!(!world.unsubscribe(sub));

        let b = world.new_entity();
        world.replace(b, Health(1));
        assert_eq!(*log.borrow(), vec![a]);
    }

    #[test]
    #[should_panic(expected = "belongs to world")]
    fn test_foreign_entity_panics() {
        let mut first = world();
        let second = world();
        let entity = first.new_entity();
        let _ = second.has::<Health>(entity);
    }

    #[test]
    #[should_panic(expected = "invalid configuration")]
    fn test_invalid_config_panics() {
        let config = WorldConfig {
            entity_segment_size: 0,
            ..WorldConfig::default()
        };
        let _ = World::with_registry(Arc::new(ComponentRegistry::new()), config);
    }
}
