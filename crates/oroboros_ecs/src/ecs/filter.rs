//! # Filters
//!
//! A filter is a materialized view: the entities holding every included
//! component and none of the excluded ones. The [`World`] keeps it current
//! on every add and remove of a routed type; a filter is never rescanned.
//!
//! Members live in a dense swap-remove list. Next to it sit one projection
//! array per included type with the member's pool slot, so iteration reads
//! components without touching the entity record.
//!
//! ```rust,ignore
//! let adults = world.register_filter(Filter::<(Name, Age), (Child,)>::new(&world));
//! for (entity, (name, age)) in adults.iter(&world) {
//!     println!("{entity:?}: {} is {}", name.0, age.0);
//! }
//! ```

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use super::component::ComponentSet;
use super::entity::{Entity, EntityRecord, WorldId};
use super::event::{Delegate, FilterListener, MembershipHandler, Subscription, SubscriptionTarget};
use super::registry::ComponentType;
use super::world::World;
use crate::error::{EcsError, EcsResult};
use crate::memory::PoolHandle;

/// Position of a filter in its world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FilterId(pub(crate) usize);

/// Untyped filter state shared by every shape.
pub(crate) struct FilterCore {
    shape: &'static str,
    include: Vec<u32>,
    exclude: Vec<u32>,
    include_mask: u64,
    exclude_mask: u64,
    members: Vec<Entity>,
    member_index: HashMap<Entity, usize>,
    /// `projections[k][row]` is the slot of `include[k]` for `members[row]`.
    projections: Vec<Vec<PoolHandle>>,
    pub(crate) listeners: Delegate<MembershipHandler>,
}

impl FilterCore {
    fn new(
        shape: &'static str,
        include: &[ComponentType],
        exclude: &[ComponentType],
        capacity: usize,
    ) -> Self {
        Self {
            shape,
            include: include.iter().map(ComponentType::type_index).collect(),
            exclude: exclude.iter().map(ComponentType::type_index).collect(),
            include_mask: include.iter().fold(0, |mask, t| mask | t.bit()),
            exclude_mask: exclude.iter().fold(0, |mask, t| mask | t.bit()),
            members: Vec::with_capacity(capacity),
            member_index: HashMap::with_capacity(capacity),
            projections: include.iter().map(|_| Vec::with_capacity(capacity)).collect(),
            listeners: Delegate::default(),
        }
    }

    #[inline]
    pub(crate) const fn shape(&self) -> &'static str {
        self.shape
    }

    #[inline]
    pub(crate) fn include(&self) -> &[u32] {
        &self.include
    }

    #[inline]
    pub(crate) fn exclude(&self) -> &[u32] {
        &self.exclude
    }

    #[inline]
    pub(crate) fn members(&self) -> &[Entity] {
        &self.members
    }

    #[inline]
    pub(crate) fn contains(&self, entity: Entity) -> bool {
        self.member_index.contains_key(&entity)
    }

    #[inline]
    pub(crate) fn projection(&self, column: usize, row: usize) -> PoolHandle {
        self.projections[column][row]
    }

    /// Membership test on the current record.
    #[inline]
    pub(crate) fn is_compatible(&self, record: &EntityRecord) -> bool {
        self.matches(record, None)
    }

    /// Membership test that treats `lifted` as already gone from the
    /// exclude side. Used before a removal commits.
    #[inline]
    pub(crate) fn is_compatible_without(&self, record: &EntityRecord, lifted: u32) -> bool {
        self.matches(record, Some(lifted))
    }

    fn matches(&self, record: &EntityRecord, lifted: Option<u32>) -> bool {
        if record.destroying {
            return false;
        }
        if record.mask & self.include_mask != self.include_mask {
            return false;
        }
        if !self.include.iter().all(|&t| record.slots.contains_key(&t)) {
            return false;
        }
        if record.mask & self.exclude_mask == 0 {
            return true;
        }
        !self
            .exclude
            .iter()
            .any(|&t| Some(t) != lifted && record.holds(t))
    }

    /// Appends `entity` and captures its slots. No-op if already a member.
    pub(crate) fn add(&mut self, entity: Entity, record: &EntityRecord) -> bool {
        if self.member_index.contains_key(&entity) {
            return false;
        }
        let mut slots = Vec::with_capacity(self.include.len());
        for &t in &self.include {
            match record.slots.get(&t) {
                Some(&slot) => slots.push(slot),
                None => return false,
            }
        }

        self.member_index.insert(entity, self.members.len());
        self.members.push(entity);
        for (column, slot) in self.projections.iter_mut().zip(slots) {
            column.push(slot);
        }
        true
    }

    /// Swap-removes `entity`. No-op if not a member.
    pub(crate) fn remove(&mut self, entity: Entity) -> bool {
        let Some(row) = self.member_index.remove(&entity) else {
            return false;
        };

        self.members.swap_remove(row);
        for column in &mut self.projections {
            column.swap_remove(row);
        }
        if let Some(&moved) = self.members.get(row) {
            self.member_index.insert(moved, row);
        }
        true
    }
}

/// An unregistered filter over include set `I` and exclude set `E`.
///
/// Build it against a world, then hand it to
/// [`World::register_filter`]. Each `(I, E)` shape exists at most once per
/// world.
pub struct Filter<I: ComponentSet, E: ComponentSet = ()> {
    core: FilterCore,
    _marker: PhantomData<fn() -> (I, E)>,
}

/// Filter over one component.
pub type Filter1<A> = Filter<(A,)>;
/// Filter over two components.
pub type Filter2<A, B> = Filter<(A, B)>;
/// Filter over three components.
pub type Filter3<A, B, C> = Filter<(A, B, C)>;
/// Filter over four components.
pub type Filter4<A, B, C, D> = Filter<(A, B, C, D)>;

impl<I: ComponentSet, E: ComponentSet> Filter<I, E> {
    /// Resolves the include and exclude types against `world`'s registry.
    ///
    /// # Panics
    ///
    /// Panics if a member type is not registered.
    #[must_use]
    pub fn new(world: &World) -> Self {
        match Self::try_new(world) {
            Ok(filter) => filter,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`new`](Self::new).
    ///
    /// # Errors
    ///
    /// `NotRegistered` naming the first unknown member type.
    pub fn try_new(world: &World) -> EcsResult<Self> {
        let registry = world.registry();
        let include = I::try_component_types(registry).map_err(EcsError::NotRegistered)?;
        let exclude = E::try_component_types(registry).map_err(EcsError::NotRegistered)?;
        let capacity = world.config().filter_initial_capacity;

        Ok(Self {
            core: FilterCore::new(type_name::<Self>(), &include, &exclude, capacity),
            _marker: PhantomData,
        })
    }
}

/// Handle to a registered filter.
pub struct FilterRef<I: ComponentSet, E: ComponentSet = ()> {
    id: FilterId,
    world: WorldId,
    _marker: PhantomData<fn() -> (I, E)>,
}

impl<I: ComponentSet, E: ComponentSet> Clone for FilterRef<I, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: ComponentSet, E: ComponentSet> Copy for FilterRef<I, E> {}

impl<I: ComponentSet, E: ComponentSet> std::fmt::Debug for FilterRef<I, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRef")
            .field("shape", &type_name::<Filter<I, E>>())
            .field("id", &self.id.0)
            .finish()
    }
}

impl<I: ComponentSet, E: ComponentSet> FilterRef<I, E> {
    fn core<'w>(&self, world: &'w World) -> &'w FilterCore {
        assert_eq!(
            self.world,
            world.id(),
            "filter handle used with a different world"
        );
        world.filter_core(self.id)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self, world: &World) -> usize {
        self.core(world).members().len()
    }

    /// Returns true if the filter has no members.
    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.core(world).members().is_empty()
    }

    /// Membership test, O(1).
    #[must_use]
    pub fn contains(&self, world: &World, entity: Entity) -> bool {
        self.core(world).contains(entity)
    }

    /// Members in current dense order. Order is not stable across removals.
    #[must_use]
    pub fn entities<'w>(&self, world: &'w World) -> &'w [Entity] {
        self.core(world).members()
    }

    /// Iterates members with their included components.
    pub fn iter<'w>(&self, world: &'w World) -> impl Iterator<Item = (Entity, I::Refs<'w>)> + 'w {
        let core = self.core(world);
        let pools = world.pools();
        core.members()
            .iter()
            .enumerate()
            .filter_map(move |(row, &entity)| {
                let refs = I::fetch(pools, core.include(), |column| {
                    Some(core.projection(column, row))
                });
                debug_assert!(
                    refs.is_some(),
                    "{} member {}:{} projects a released slot",
                    core.shape(),
                    entity.index(),
                    entity.generation()
                );
                refs.map(|refs| (entity, refs))
            })
    }

    /// Calls `f` for each member in a single pass.
    pub fn foreach<'w, F>(&self, world: &'w World, mut f: F)
    where
        F: FnMut(Entity, I::Refs<'w>),
    {
        for (entity, refs) in self.iter(world) {
            f(entity, refs);
        }
    }

    /// Subscribes to entities joining the filter.
    pub fn on_added(
        &self,
        world: &mut World,
        callback: impl Fn(&mut World, Entity) + 'static,
    ) -> Subscription {
        self.core(world);
        world.subscribe_filter(self.id, MembershipHandler::Added(Rc::new(callback)))
    }

    /// Subscribes to entities leaving the filter.
    pub fn on_removed(
        &self,
        world: &mut World,
        callback: impl Fn(&mut World, Entity) + 'static,
    ) -> Subscription {
        self.core(world);
        world.subscribe_filter(self.id, MembershipHandler::Removed(Rc::new(callback)))
    }

    /// Subscribes a listener to both membership events.
    pub fn add_listener(&self, world: &mut World, listener: Rc<dyn FilterListener>) -> Subscription {
        self.core(world);
        world.subscribe_filter(self.id, MembershipHandler::Listener(listener))
    }

    pub(crate) const fn id(&self) -> FilterId {
        self.id
    }
}

// =============================================================================
// World integration
// =============================================================================

impl World {
    /// Registers a filter and returns its handle.
    ///
    /// Register filters before creating entities: a filter only reacts to
    /// later mutations.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate shape or if entities already exist.
    pub fn register_filter<I: ComponentSet, E: ComponentSet>(
        &mut self,
        filter: Filter<I, E>,
    ) -> FilterRef<I, E> {
        match self.try_register_filter(filter) {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`register_filter`](Self::register_filter).
    ///
    /// # Errors
    ///
    /// `DuplicateFilter` or `EntitiesExist`.
    pub fn try_register_filter<I: ComponentSet, E: ComponentSet>(
        &mut self,
        filter: Filter<I, E>,
    ) -> EcsResult<FilterRef<I, E>> {
        let shape = TypeId::of::<Filter<I, E>>();
        if self.filter_shapes.contains_key(&shape) {
            return Err(EcsError::DuplicateFilter(filter.core.shape().to_string()));
        }
        let alive = self.alive_count();
        if alive > 0 {
            return Err(EcsError::EntitiesExist {
                shape: filter.core.shape().to_string(),
                alive,
            });
        }

        let id = FilterId(self.filters.len());
        for &t in filter.core.include() {
            self.included_routes.entry(t).or_default().push(id);
        }
        for &t in filter.core.exclude() {
            self.excluded_routes.entry(t).or_default().push(id);
        }
        tracing::debug!(world = self.id().get(), shape = filter.core.shape(), "filter registered");
        self.filters.push(filter.core);
        self.filter_shapes.insert(shape, id);

        Ok(self.filter_ref(id))
    }

    /// Returns the registered filter of shape `(I, E)`.
    #[must_use]
    pub fn get_filter<I: ComponentSet, E: ComponentSet>(&self) -> Option<FilterRef<I, E>> {
        self.filter_shapes
            .get(&TypeId::of::<Filter<I, E>>())
            .map(|&id| self.filter_ref(id))
    }

    fn filter_ref<I: ComponentSet, E: ComponentSet>(&self, id: FilterId) -> FilterRef<I, E> {
        FilterRef {
            id,
            world: self.id(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn filter_core(&self, id: FilterId) -> &FilterCore {
        &self.filters[id.0]
    }

    pub(crate) fn subscribe_filter(&mut self, id: FilterId, handler: MembershipHandler) -> Subscription {
        let subscription = self.next_subscription(SubscriptionTarget::Filter(id));
        self.filters[id.0].listeners.add(subscription.id, handler);
        subscription
    }

    /// Re-evaluates every filter routed on `type_index` after it was added.
    pub(crate) fn update_filters_after_add(&mut self, entity: Entity, type_index: u32) {
        let included = self.included_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..included {
            let id = self.included_routes[&type_index][i];
            let Some(record) = self.entities.get(entity.id()) else {
                return;
            };
            let filter = &mut self.filters[id.0];
            if filter.is_compatible(record) && filter.add(entity, record) {
                self.dispatch_membership(id, entity, true);
            }
        }

        let excluded = self.excluded_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..excluded {
            let id = self.excluded_routes[&type_index][i];
            let Some(record) = self.entities.get(entity.id()) else {
                return;
            };
            // Deleted again by a listener; that delete settled these filters.
            if !record.holds(type_index) {
                return;
            }
            if self.filters[id.0].remove(entity) {
                self.dispatch_membership(id, entity, false);
            }
        }
    }

    /// Settles every filter routed on `type_index` once it is gone from the
    /// record. Idempotent after [`update_filters_before_remove`](Self::update_filters_before_remove).
    pub(crate) fn update_filters_after_remove(&mut self, entity: Entity, type_index: u32) {
        let included = self.included_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..included {
            let id = self.included_routes[&type_index][i];
            if self.filters[id.0].remove(entity) {
                self.dispatch_membership(id, entity, false);
            }
        }

        let excluded = self.excluded_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..excluded {
            let id = self.excluded_routes[&type_index][i];
            let Some(record) = self.entities.get(entity.id()) else {
                return;
            };
            let filter = &mut self.filters[id.0];
            if filter.is_compatible(record) && filter.add(entity, record) {
                self.dispatch_membership(id, entity, true);
            }
        }
    }

    /// Re-evaluates every filter routed on `type_index` before it is removed.
    pub(crate) fn update_filters_before_remove(&mut self, entity: Entity, type_index: u32) {
        let included = self.included_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..included {
            let id = self.included_routes[&type_index][i];
            if self.filters[id.0].remove(entity) {
                self.dispatch_membership(id, entity, false);
            }
        }

        let excluded = self.excluded_routes.get(&type_index).map_or(0, Vec::len);
        for i in 0..excluded {
            let id = self.excluded_routes[&type_index][i];
            let Some(record) = self.entities.get(entity.id()) else {
                return;
            };
            let filter = &mut self.filters[id.0];
            if filter.is_compatible_without(record, type_index) && filter.add(entity, record) {
                self.dispatch_membership(id, entity, true);
            }
        }
    }

    fn dispatch_membership(&mut self, id: FilterId, entity: Entity, added: bool) {
        let Some(handlers) = self.filters[id.0].listeners.snapshot() else {
            return;
        };
        for handler in handlers {
            match (handler, added) {
                (MembershipHandler::Group(group), true) => self.group_insert(group, entity),
                (MembershipHandler::Group(group), false) => self.group_remove(group, entity),
                (MembershipHandler::Added(callback), true)
                | (MembershipHandler::Removed(callback), false) => callback(self, entity),
                (MembershipHandler::Listener(listener), true) => {
                    listener.on_entity_added(self, entity);
                }
                (MembershipHandler::Listener(listener), false) => {
                    listener.on_entity_removed(self, entity);
                }
                (MembershipHandler::Added(_) | MembershipHandler::Removed(_), _) => {}
            }
        }
    }
}
