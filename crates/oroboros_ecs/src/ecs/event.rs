//! # Events
//!
//! Ordered, synchronous callback lists.
//!
//! Callbacks receive `&mut World` and may re-enter the mutation API. A
//! dispatch works on a snapshot of the list, so subscribing or
//! unsubscribing from inside a callback takes effect on the next event.

use std::rc::Rc;

use super::entity::Entity;
use super::filter::FilterId;
use super::group::GroupId;
use super::world::World;
use crate::memory::PoolHandle;

/// Callback for component lifecycle events.
pub type EntityCallback = Rc<dyn Fn(&mut World, Entity)>;

/// Callback for lifecycle events that carry the new pool slot.
pub type SlotCallback = Rc<dyn Fn(&mut World, Entity, PoolHandle)>;

/// Ordered list of handlers keyed by subscription id.
pub struct Delegate<H> {
    handlers: Vec<(u64, H)>,
}

impl<H> Default for Delegate<H> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<H: Clone> Delegate<H> {
    /// Appends a handler.
    pub fn add(&mut self, id: u64, handler: H) {
        self.handlers.push((id, handler));
    }

    /// Removes the handler with `id`, keeping the others in order.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.handlers.iter().position(|(handler_id, _)| *handler_id == id) {
            Some(position) => {
                self.handlers.remove(position);
                true
            }
            None => false,
        }
    }

    /// Copies the handler list for dispatch. `None` when empty.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<H>> {
        if self.handlers.is_empty() {
            return None;
        }
        Some(self.handlers.iter().map(|(_, handler)| handler.clone()).collect())
    }

    /// Number of handlers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Component lifecycle events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentEvent {
    /// Slot allocated and recorded, filters not yet updated.
    BeforeAdd,
    /// Filters updated after an add.
    AfterAdd,
    /// In-place write is about to happen.
    BeforeUpdate,
    /// Filters dropped the entity, slot still live.
    BeforeDelete,
    /// Slot released.
    AfterDelete,
}

impl ComponentEvent {
    const COUNT: usize = 5;

    const fn slot(self) -> usize {
        match self {
            Self::BeforeAdd => 0,
            Self::AfterAdd => 1,
            Self::BeforeUpdate => 2,
            Self::BeforeDelete => 3,
            Self::AfterDelete => 4,
        }
    }
}

/// Add events that also pass the freshly allocated pool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotEvent {
    /// Fired right after [`ComponentEvent::BeforeAdd`].
    BeforeAdd,
    /// Fired right after [`ComponentEvent::AfterAdd`].
    AfterAdd,
}

impl SlotEvent {
    const fn slot(self) -> usize {
        match self {
            Self::BeforeAdd => 0,
            Self::AfterAdd => 1,
        }
    }
}

/// Every lifecycle delegate of one component type in one world.
#[derive(Default)]
pub(crate) struct ComponentEvents {
    entity: [Delegate<EntityCallback>; ComponentEvent::COUNT],
    slot: [Delegate<SlotCallback>; 2],
}

impl ComponentEvents {
    pub(crate) fn entity(&self, event: ComponentEvent) -> &Delegate<EntityCallback> {
        &self.entity[event.slot()]
    }

    pub(crate) fn entity_mut(&mut self, event: ComponentEvent) -> &mut Delegate<EntityCallback> {
        &mut self.entity[event.slot()]
    }

    pub(crate) fn slot(&self, event: SlotEvent) -> &Delegate<SlotCallback> {
        &self.slot[event.slot()]
    }

    pub(crate) fn slot_mut(&mut self, event: SlotEvent) -> &mut Delegate<SlotCallback> {
        &mut self.slot[event.slot()]
    }
}

/// Receives membership changes of a filter.
pub trait FilterListener {
    /// The entity became a member.
    fn on_entity_added(&self, world: &mut World, entity: Entity);
    /// The entity stopped being a member.
    fn on_entity_removed(&self, world: &mut World, entity: Entity);
}

/// One entry of a filter's listener list.
#[derive(Clone)]
pub(crate) enum MembershipHandler {
    Group(GroupId),
    Added(EntityCallback),
    Removed(EntityCallback),
    Listener(Rc<dyn FilterListener>),
}

/// What a [`Subscription`] is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SubscriptionTarget {
    Component {
        type_index: u32,
        event: ComponentEvent,
    },
    Slot {
        type_index: u32,
        event: SlotEvent,
    },
    Filter(FilterId),
}

/// Token returned by every subscribe call.
///
/// Pass it to [`World::unsubscribe`] to detach the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the token makes the callback impossible to unsubscribe"]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) target: SubscriptionTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegate_keeps_order() {
        let mut delegate: Delegate<&'static str> = Delegate::default();
        assert!(delegate.snapshot().is_none());

        delegate.add(1, "first");
        delegate.add(2, "second");
        delegate.add(3, "third");
        assert!(delegate.remove(2));
        assert!(!delegate.remove(2));

        assert_eq!(delegate.snapshot().unwrap(), ["first", "third"]);
        assert_eq!(delegate.len(), 2);
    }

    #[test]
    fn test_event_slots_are_distinct() {
        let all = [
            ComponentEvent::BeforeAdd,
            ComponentEvent::AfterAdd,
            ComponentEvent::BeforeUpdate,
            ComponentEvent::BeforeDelete,
            ComponentEvent::AfterDelete,
        ];
        let mut slots: Vec<usize> = all.iter().map(|e| e.slot()).collect();
        slots.dedup();
        assert_eq!(slots, [0, 1, 2, 3, 4]);
    }
}
