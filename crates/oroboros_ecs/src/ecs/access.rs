//! # Component Access
//!
//! The only path that touches component data. Every call here keeps
//! filters, group filters and lifecycle delegates in step with the entity
//! record.
//!
//! Contract violations panic: a stale or foreign handle, or an
//! unregistered component type. Absence is an expected outcome and comes
//! back as `Option` or `bool`.

use super::component::Component;
use super::entity::Entity;
use super::event::{ComponentEvent, SlotEvent};
use super::registry::{presence_bit, ComponentType};
use super::world::World;
use crate::memory::PoolHandle;

impl World {
    /// Checks whether `entity` holds a `T`. O(1).
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        let descriptor = self.check_entity::<T>(entity);
        self.entities
            .get(entity.id())
            .is_some_and(|record| record.holds(descriptor.type_index()))
    }

    /// Sets `entity`'s `T` to `value`.
    ///
    /// If `T` is absent it is added and every filter routed on `T` is
    /// re-evaluated. If present, the value is overwritten in place and group
    /// filters keyed on `T` re-bucket; membership cannot change.
    pub fn replace<T: Component>(&mut self, entity: Entity, value: T) {
        let descriptor = self.check_entity::<T>(entity);
        let type_index = descriptor.type_index();
        if !self.has::<T>(entity) {
            self.add_component(entity, &descriptor, value);
            return;
        }

        self.fire(type_index, ComponentEvent::BeforeUpdate, entity);
        self.group_keys_before_change(entity, type_index);
        if let Some(slot) = self.slot_of(entity, type_index) {
            if let Some(current) = self
                .pools
                .get_mut::<T>(type_index)
                .and_then(|pool| pool.dereference_mut(slot))
            {
                *current = value;
            }
        } else if self.is_alive(entity) {
            // A before-update listener deleted it.
            self.add_component(entity, &descriptor, value);
            return;
        }
        self.group_keys_after_change(entity, type_index);
    }

    /// Mutates `entity`'s `T` in place with the same notifications as an
    /// overwriting [`replace`](Self::replace).
    ///
    /// Returns false if `T` is absent.
    pub fn update<T: Component>(&mut self, entity: Entity, f: impl FnOnce(&mut T)) -> bool {
        let descriptor = self.check_entity::<T>(entity);
        let type_index = descriptor.type_index();
        if !self.has::<T>(entity) {
            return false;
        }

        self.fire(type_index, ComponentEvent::BeforeUpdate, entity);
        self.group_keys_before_change(entity, type_index);
        let applied = match self.slot_of(entity, type_index) {
            Some(slot) => match self
                .pools
                .get_mut::<T>(type_index)
                .and_then(|pool| pool.dereference_mut(slot))
            {
                Some(current) => {
                    f(current);
                    true
                }
                None => false,
            },
            None => false,
        };
        self.group_keys_after_change(entity, type_index);
        applied
    }

    /// Borrows `entity`'s `T`, if present.
    #[must_use]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let descriptor = self.check_entity::<T>(entity);
        let slot = self.slot_of(entity, descriptor.type_index())?;
        self.pools
            .get::<T>(descriptor.type_index())?
            .dereference(slot)
    }

    /// Borrows `entity`'s `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is absent.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> &T {
        match self.try_get::<T>(entity) {
            Some(value) => value,
            None => panic!(
                "entity {}:{} has no {}",
                entity.index(),
                entity.generation(),
                std::any::type_name::<T>()
            ),
        }
    }

    /// Mutably borrows `entity`'s `T` after firing before-update.
    ///
    /// The write bypasses group re-keying; use [`update`](Self::update) or
    /// [`replace`](Self::replace) for key-contributing components.
    ///
    /// # Panics
    ///
    /// Panics if `T` is absent, before or after the event.
    pub fn get_for_write<T: Component>(&mut self, entity: Entity) -> &mut T {
        let descriptor = self.check_entity::<T>(entity);
        assert!(
            self.has::<T>(entity),
            "entity {}:{} has no {}",
            entity.index(),
            entity.generation(),
            descriptor.name()
        );
        self.fire(descriptor.type_index(), ComponentEvent::BeforeUpdate, entity);
        match self.component_mut::<T>(entity, descriptor.type_index()) {
            Some(value) => value,
            None => panic!(
                "{} removed from entity {}:{} during before-update",
                descriptor.name(),
                entity.index(),
                entity.generation()
            ),
        }
    }

    /// Returns `entity`'s `T`, adding a default value first if absent.
    ///
    /// # Panics
    ///
    /// Panics if an add listener destroys the entity or deletes `T`.
    pub fn ensure<T: Component>(&mut self, entity: Entity) -> &mut T {
        let descriptor = self.check_entity::<T>(entity);
        if !self.has::<T>(entity) {
            self.add_component(entity, &descriptor, T::default());
        }
        match self.component_mut::<T>(entity, descriptor.type_index()) {
            Some(value) => value,
            None => panic!(
                "{} removed from entity {}:{} during add",
                descriptor.name(),
                entity.index(),
                entity.generation()
            ),
        }
    }

    /// Fires before-update for `T` without touching the data. No-op if
    /// `T` is absent.
    pub fn mark_dirty<T: Component>(&mut self, entity: Entity) {
        let descriptor = self.check_entity::<T>(entity);
        if self.has::<T>(entity) {
            self.fire(descriptor.type_index(), ComponentEvent::BeforeUpdate, entity);
        }
    }

    /// Removes `entity`'s `T`.
    ///
    /// Filters drop the entity before the slot is released. Returns false
    /// if `T` was absent, or if a before-delete listener destroyed the
    /// entity, in which case the destroy already released everything.
    pub fn del<T: Component>(&mut self, entity: Entity) -> bool {
        let descriptor = self.check_entity::<T>(entity);
        let type_index = descriptor.type_index();
        if !self.has::<T>(entity) {
            return false;
        }

        self.update_filters_before_remove(entity, type_index);
        self.fire(type_index, ComponentEvent::BeforeDelete, entity);

        let Some(record) = self.entities.get_mut(entity.id()) else {
            tracing::debug!(
                index = entity.index(),
                component = descriptor.name(),
                "delete aborted, entity destroyed by listener"
            );
            return false;
        };
        let Some(slot) = record.slots.remove(&type_index) else {
            return false;
        };
        // Another held type may share the bit.
        if !record.slots.keys().any(|&t| presence_bit(t) == descriptor.bit()) {
            record.mask &= !descriptor.bit();
        }
        // Before-delete listeners may have changed membership while the slot
        // was still held. The slot stays allocated until no filter projects it.
        self.update_filters_after_remove(entity, type_index);
        self.pools.release(type_index, slot);

        if !self.is_alive(entity) {
            return false;
        }
        self.fire(type_index, ComponentEvent::AfterDelete, entity);
        true
    }

    fn add_component<T: Component>(&mut self, entity: Entity, descriptor: &ComponentType, value: T) {
        let type_index = descriptor.type_index();
        let slot = self.pools.ensure::<T>(descriptor).allocate(value);
        let Some(record) = self.entities.get_mut(entity.id()) else {
            self.pools.release(type_index, slot);
            return;
        };
        record.mask |= descriptor.bit();
        record.slots.insert(type_index, slot);

        self.fire(type_index, ComponentEvent::BeforeAdd, entity);
        self.fire_slot(type_index, SlotEvent::BeforeAdd, entity, slot);
        self.update_filters_after_add(entity, type_index);
        if self.slot_of(entity, type_index) != Some(slot) {
            // A filter listener already took it away again.
            return;
        }
        self.fire(type_index, ComponentEvent::AfterAdd, entity);
        self.fire_slot(type_index, SlotEvent::AfterAdd, entity, slot);
    }

    fn slot_of(&self, entity: Entity, type_index: u32) -> Option<PoolHandle> {
        self.entities.get(entity.id())?.slot(type_index)
    }

    fn component_mut<T: Component>(&mut self, entity: Entity, type_index: u32) -> Option<&mut T> {
        let slot = self.slot_of(entity, type_index)?;
        self.pools.get_mut::<T>(type_index)?.dereference_mut(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::registry::ComponentRegistry;
    use crate::WorldConfig;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Default, Debug, Clone, PartialEq)]
    struct Name(String);
    impl Component for Name {}

    #[derive(Default, Debug, Clone, PartialEq)]
    struct Age(u32);
    impl Component for Age {}

    fn world() -> World {
        let mut registry = ComponentRegistry::new();
        registry.register::<Name>(8).unwrap();
        registry.register::<Age>(8).unwrap();
        World::with_registry(Arc::new(registry), WorldConfig::compact())
    }

    fn record_events(world: &mut World) -> Rc<RefCell<Vec<&'static str>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let events = [
            (ComponentEvent::BeforeAdd, "before_add"),
            (ComponentEvent::AfterAdd, "after_add"),
            (ComponentEvent::BeforeUpdate, "before_update"),
            (ComponentEvent::BeforeDelete, "before_delete"),
            (ComponentEvent::AfterDelete, "after_delete"),
        ];
        for (event, label) in events {
            let sink = Rc::clone(&log);
            let _ = world.subscribe::<Name>(event, move |_, _| sink.borrow_mut().push(label));
        }
        log
    }

    #[test]
    fn test_replace_then_get() {
        let mut world = world();
        let entity = world.new_entity();
        assert!(!world.has::<Name>(entity));
        assert!(world.try_get::<Name>(entity).is_none());

        world.replace(entity, Name("A".into()));
        assert!(world.has::<Name>(entity));
        assert_eq!(world.get::<Name>(entity), &Name("A".into()));

        world.replace(entity, Name("B".into()));
        assert_eq!(world.get::<Name>(entity), &Name("B".into()));
    }

    #[test]
    fn test_del_twice() {
        let mut world = world();
        let entity = world.new_entity();
        world.replace(entity, Age(3));

        assert!(world.del::<Age>(entity));
        assert!(!world.has::<Age>(entity));
        assert!(!world.del::<Age>(entity));
    }

    #[test]
    fn test_event_order() {
        let mut world = world();
        let log = record_events(&mut world);
        let entity = world.new_entity();

        world.replace(entity, Name("A".into()));
        world.replace(entity, Name("B".into()));
        world.mark_dirty::<Name>(entity);
        world.mark_dirty::<Age>(entity);
        world.del::<Name>(entity);

        assert_eq!(
            *log.borrow(),
            [
                "before_add",
                "after_add",
                "before_update",
                "before_update",
                "before_delete",
                "after_delete"
            ]
        );
    }

    #[test]
    fn test_ensure_adds_default_once() {
        let mut world = world();
        let log = record_events(&mut world);
        let entity = world.new_entity();

        world.ensure::<Name>(entity).0.push_str("x");
        world.ensure::<Name>(entity).0.push_str("y");
        assert_eq!(world.get::<Name>(entity).0, "xy");
        assert_eq!(*log.borrow(), ["before_add", "after_add"]);
    }

    #[test]
    fn test_get_for_write_fires_before_update() {
        let mut world = world();
        let log = record_events(&mut world);
        let entity = world.new_entity();
        world.replace(entity, Name("A".into()));

        world.get_for_write::<Name>(entity).0 = "Z".into();
        assert_eq!(world.get::<Name>(entity).0, "Z");
        assert_eq!(log.borrow().last(), Some(&"before_update"));
    }

    #[test]
    fn test_update_in_place() {
        let mut world = world();
        let entity = world.new_entity();
        assert!(!world.update::<Age>(entity, |age| age.0 += 1));

        world.replace(entity, Age(1));
        assert!(world.update::<Age>(entity, |age| age.0 += 1));
        assert_eq!(world.get::<Age>(entity), &Age(2));
    }

    #[test]
    fn test_slot_events_carry_slot() {
        let mut world = world();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _ = world.subscribe_slot::<Age>(SlotEvent::AfterAdd, move |world, entity, slot| {
            let index = world.registry().lookup::<Age>().type_index();
            let age = world.pools().get::<Age>(index).unwrap().dereference(slot).unwrap().0;
            sink.borrow_mut().push((entity, age));
        });

        let entity = world.new_entity();
        world.replace(entity, Age(7));
        assert_eq!(*seen.borrow(), [(entity, 7)]);
    }

    #[test]
    #[should_panic(expected = "has no")]
    fn test_get_absent_panics() {
        let mut world = world();
        let entity = world.new_entity();
        let _ = world.get::<Age>(entity);
    }

    #[test]
    #[should_panic(expected = "stale entity handle")]
    fn test_stale_handle_panics() {
        let mut world = world();
        let entity = world.new_entity();
        world.destroy(entity);
        world.replace(entity, Age(1));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_unregistered_type_panics() {
        #[derive(Default)]
        struct Unknown;
        impl Component for Unknown {}

        let mut world = world();
        let entity = world.new_entity();
        let _ = world.has::<Unknown>(entity);
    }
}
