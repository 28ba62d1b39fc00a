//! # Group Filters
//!
//! A group filter is a keyed secondary index over one registered filter.
//! Each member of the filter sits in exactly one bucket, keyed by a value
//! derived from its components. Lookups by key are O(1).
//!
//! Buckets follow the filter's membership events. Value changes made
//! through [`World::replace`] or [`World::update`] re-bucket the entity:
//! it is removed under the stored old key before the write and inserted
//! under the new key after it.
//!
//! ```rust,ignore
//! let named = world.register_filter(Filter1::<Name>::new(&world));
//! let by_name = world.register_group_filter(GroupFilter::<GroupKey1<Name, ByName>>::new(&world));
//!
//! let bob = by_name.find_one(&world, &"Bob".to_string());
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;

use super::component::{Component, ComponentSet};
use super::entity::{Entity, EntityRecord, WorldId};
use super::event::MembershipHandler;
use super::filter::FilterId;
use super::registry::ComponentType;
use super::storage::ComponentPools;
use super::world::World;
use crate::error::{EcsError, EcsResult};

/// Position of a group filter in its world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct GroupId(pub(crate) usize);

/// Maps one component value to a key part.
pub trait KeyMap<Source>: 'static {
    /// The derived key part.
    type Key: Eq + Hash + Clone + 'static;

    /// Derives the key part from the component.
    fn map_key(&self, source: &Source) -> Self::Key;
}

/// Uses the component value itself as the key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<S: Eq + Hash + Clone + 'static> KeyMap<S> for Identity {
    type Key = S;

    fn map_key(&self, source: &S) -> S {
        source.clone()
    }
}

/// Derives a bucket key from a set of source components.
pub trait KeyStrategy: 'static {
    /// Components the key is read from.
    type Sources: ComponentSet;
    /// Bucket key.
    type Key: Eq + Hash + Clone + 'static;

    /// Computes the key from the entity's current source values.
    fn derive_key<'w>(&self, sources: <Self::Sources as ComponentSet>::Refs<'w>) -> Self::Key;
}

/// Key derived from one component.
pub struct GroupKey1<A, MA = Identity> {
    map_a: MA,
    _marker: PhantomData<fn() -> A>,
}

/// Key derived from two components, as a tuple of the mapped parts.
pub struct GroupKey2<A, B, MA = Identity, MB = Identity> {
    map_a: MA,
    map_b: MB,
    _marker: PhantomData<fn() -> (A, B)>,
}

/// Key derived from three components, as a tuple of the mapped parts.
pub struct GroupKey3<A, B, C, MA = Identity, MB = Identity, MC = Identity> {
    map_a: MA,
    map_b: MB,
    map_c: MC,
    _marker: PhantomData<fn() -> (A, B, C)>,
}

impl<A, MA> GroupKey1<A, MA> {
    /// Builds the strategy from a key mapper.
    pub const fn with_mapper(map_a: MA) -> Self {
        Self {
            map_a,
            _marker: PhantomData,
        }
    }
}

impl<A, MA: Default> Default for GroupKey1<A, MA> {
    fn default() -> Self {
        Self::with_mapper(MA::default())
    }
}

impl<A, B, MA, MB> GroupKey2<A, B, MA, MB> {
    /// Builds the strategy from one mapper per component.
    pub const fn with_mappers(map_a: MA, map_b: MB) -> Self {
        Self {
            map_a,
            map_b,
            _marker: PhantomData,
        }
    }
}

impl<A, B, MA: Default, MB: Default> Default for GroupKey2<A, B, MA, MB> {
    fn default() -> Self {
        Self::with_mappers(MA::default(), MB::default())
    }
}

impl<A, B, C, MA, MB, MC> GroupKey3<A, B, C, MA, MB, MC> {
    /// Builds the strategy from one mapper per component.
    pub const fn with_mappers(map_a: MA, map_b: MB, map_c: MC) -> Self {
        Self {
            map_a,
            map_b,
            map_c,
            _marker: PhantomData,
        }
    }
}

impl<A, B, C, MA: Default, MB: Default, MC: Default> Default for GroupKey3<A, B, C, MA, MB, MC> {
    fn default() -> Self {
        Self::with_mappers(MA::default(), MB::default(), MC::default())
    }
}

impl<A, MA> KeyStrategy for GroupKey1<A, MA>
where
    A: Component,
    MA: KeyMap<A>,
{
    type Sources = (A,);
    type Key = MA::Key;

    fn derive_key<'w>(&self, sources: (&'w A,)) -> Self::Key {
        let (a,) = sources;
        self.map_a.map_key(a)
    }
}

impl<A, B, MA, MB> KeyStrategy for GroupKey2<A, B, MA, MB>
where
    A: Component,
    B: Component,
    MA: KeyMap<A>,
    MB: KeyMap<B>,
{
    type Sources = (A, B);
    type Key = (MA::Key, MB::Key);

    fn derive_key<'w>(&self, sources: (&'w A, &'w B)) -> Self::Key {
        let (a, b) = sources;
        (self.map_a.map_key(a), self.map_b.map_key(b))
    }
}

impl<A, B, C, MA, MB, MC> KeyStrategy for GroupKey3<A, B, C, MA, MB, MC>
where
    A: Component,
    B: Component,
    C: Component,
    MA: KeyMap<A>,
    MB: KeyMap<B>,
    MC: KeyMap<C>,
{
    type Sources = (A, B, C);
    type Key = (MA::Key, MB::Key, MC::Key);

    fn derive_key<'w>(&self, sources: (&'w A, &'w B, &'w C)) -> Self::Key {
        let (a, b, c) = sources;
        (
            self.map_a.map_key(a),
            self.map_b.map_key(b),
            self.map_c.map_key(c),
        )
    }
}

/// Bucket maps of one group filter.
pub(crate) struct GroupIndex<S: KeyStrategy> {
    strategy: S,
    source_types: Vec<u32>,
    buckets: HashMap<S::Key, HashSet<Entity>>,
    /// Key each entity is currently filed under.
    keys: HashMap<Entity, S::Key>,
}

impl<S: KeyStrategy> GroupIndex<S> {
    fn new(strategy: S, sources: &[ComponentType]) -> Self {
        Self {
            strategy,
            source_types: sources.iter().map(ComponentType::type_index).collect(),
            buckets: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    fn file(&mut self, entity: Entity, key: S::Key) {
        self.unfile(entity);
        self.buckets.entry(key.clone()).or_default().insert(entity);
        self.keys.insert(entity, key);
    }

    fn unfile(&mut self, entity: Entity) -> bool {
        let Some(key) = self.keys.remove(&entity) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.remove(&entity);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        true
    }

    fn bucket(&self, key: &S::Key) -> Option<&HashSet<Entity>> {
        self.buckets.get(key)
    }
}

/// Type-erased bucket maintenance, driven by the world.
pub(crate) trait ErasedGroupIndex {
    fn insert(&mut self, pools: &ComponentPools, record: &EntityRecord, entity: Entity);
    fn remove(&mut self, entity: Entity) -> bool;
    fn source_types(&self) -> &[u32];
    fn as_any(&self) -> &dyn Any;
}

impl<S: KeyStrategy> ErasedGroupIndex for GroupIndex<S> {
    fn insert(&mut self, pools: &ComponentPools, record: &EntityRecord, entity: Entity) {
        let types = &self.source_types;
        let Some(sources) = S::Sources::fetch(pools, types, |k| record.slot(types[k])) else {
            return;
        };
        let key = self.strategy.derive_key(sources);
        self.file(entity, key);
    }

    fn remove(&mut self, entity: Entity) -> bool {
        self.unfile(entity)
    }

    fn source_types(&self) -> &[u32] {
        &self.source_types
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A group filter bound to its underlying filter and owning world.
pub(crate) struct GroupEntry {
    pub(crate) filter: FilterId,
    pub(crate) name: &'static str,
    pub(crate) index: Box<dyn ErasedGroupIndex>,
}

/// An unregistered group filter with strategy `S`.
///
/// The underlying `Filter<S::Sources>` must be registered first.
pub struct GroupFilter<S: KeyStrategy> {
    filter: FilterId,
    index: GroupIndex<S>,
}

impl<S: KeyStrategy + Default> GroupFilter<S> {
    /// Builds a group filter with the default strategy.
    ///
    /// # Panics
    ///
    /// Panics if the underlying filter is not registered.
    #[must_use]
    pub fn new(world: &World) -> Self {
        Self::with_strategy(world, S::default())
    }
}

impl<S: KeyStrategy> GroupFilter<S> {
    /// Builds a group filter with an explicit strategy.
    ///
    /// # Panics
    ///
    /// Panics if the underlying filter is not registered.
    #[must_use]
    pub fn with_strategy(world: &World, strategy: S) -> Self {
        match Self::try_new(world, strategy) {
            Ok(group) => group,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`with_strategy`](Self::with_strategy).
    ///
    /// # Errors
    ///
    /// `FilterNotRegistered` if `Filter<S::Sources>` is missing.
    pub fn try_new(world: &World, strategy: S) -> EcsResult<Self> {
        let Some(filter) = world.get_filter::<S::Sources, ()>() else {
            return Err(EcsError::FilterNotRegistered(
                type_name::<super::filter::Filter<S::Sources>>().to_string(),
            ));
        };
        let sources = S::Sources::component_types(world.registry());

        Ok(Self {
            filter: filter.id(),
            index: GroupIndex::new(strategy, &sources),
        })
    }
}

/// Handle to a registered group filter.
pub struct GroupFilterRef<S: KeyStrategy> {
    id: GroupId,
    world: WorldId,
    _marker: PhantomData<fn() -> S>,
}

impl<S: KeyStrategy> Clone for GroupFilterRef<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: KeyStrategy> Copy for GroupFilterRef<S> {}

impl<S: KeyStrategy> std::fmt::Debug for GroupFilterRef<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupFilterRef")
            .field("strategy", &type_name::<S>())
            .field("id", &self.id.0)
            .finish()
    }
}

impl<S: KeyStrategy> GroupFilterRef<S> {
    fn index<'w>(&self, world: &'w World) -> &'w GroupIndex<S> {
        assert_eq!(
            self.world,
            world.id(),
            "group filter handle used with a different world"
        );
        let entry = world.group_entry(self.id);
        match entry.index.as_any().downcast_ref() {
            Some(index) => index,
            None => panic!("group filter {} is not a {}", entry.name, type_name::<S>()),
        }
    }

    /// Returns some entity filed under `key`. Ties have no defined order.
    #[must_use]
    pub fn find_one(&self, world: &World, key: &S::Key) -> Option<Entity> {
        self.index(world).bucket(key)?.iter().next().copied()
    }

    /// Calls `f` for every entity filed under `key`.
    pub fn foreach(&self, world: &World, key: &S::Key, mut f: impl FnMut(Entity)) {
        if let Some(bucket) = self.index(world).bucket(key) {
            for &entity in bucket {
                f(entity);
            }
        }
    }

    /// Iterates the entities filed under `key`.
    pub fn entities<'w>(&self, world: &'w World, key: &S::Key) -> impl Iterator<Item = Entity> + 'w {
        self.index(world)
            .bucket(key)
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    /// Number of entities filed under `key`.
    #[must_use]
    pub fn count(&self, world: &World, key: &S::Key) -> usize {
        self.index(world).bucket(key).map_or(0, HashSet::len)
    }

    /// Key `entity` is filed under, if any.
    #[must_use]
    pub fn key_of<'w>(&self, world: &'w World, entity: Entity) -> Option<&'w S::Key> {
        self.index(world).keys.get(&entity)
    }

    /// Number of filed entities.
    #[must_use]
    pub fn len(&self, world: &World) -> usize {
        self.index(world).keys.len()
    }

    /// Returns true if no entity is filed.
    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.index(world).keys.is_empty()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn bucket_count(&self, world: &World) -> usize {
        self.index(world).buckets.len()
    }
}

// =============================================================================
// World integration
// =============================================================================

impl World {
    /// Registers a group filter and files the current members of its filter.
    ///
    /// # Panics
    ///
    /// Panics if strategy `S` is already registered in this world.
    pub fn register_group_filter<S: KeyStrategy>(&mut self, group: GroupFilter<S>) -> GroupFilterRef<S> {
        match self.try_register_group_filter(group) {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible variant of [`register_group_filter`](Self::register_group_filter).
    ///
    /// # Errors
    ///
    /// `DuplicateGroupFilter` if `S` is already registered.
    pub fn try_register_group_filter<S: KeyStrategy>(
        &mut self,
        group: GroupFilter<S>,
    ) -> EcsResult<GroupFilterRef<S>> {
        let shape = TypeId::of::<S>();
        let name = type_name::<S>();
        if self.group_shapes.contains_key(&shape) {
            return Err(EcsError::DuplicateGroupFilter(name));
        }

        let id = GroupId(self.groups.len());
        let GroupFilter { filter, mut index } = group;
        for &entity in self.filter_core(filter).members() {
            if let Some(record) = self.entities.get(entity.id()) {
                index.insert(&self.pools, record, entity);
            }
        }
        for &t in index.source_types() {
            self.group_key_routes.entry(t).or_default().push(id);
        }

        self.groups.push(GroupEntry {
            filter,
            name,
            index: Box::new(index),
        });
        self.group_shapes.insert(shape, id);
        // Dispatch only; the token is never handed out.
        let _ = self.subscribe_filter(filter, MembershipHandler::Group(id));
        tracing::debug!(world = self.id().get(), strategy = name, "group filter registered");

        Ok(GroupFilterRef {
            id,
            world: self.id(),
            _marker: PhantomData,
        })
    }

    /// Returns the registered group filter with strategy `S`.
    #[must_use]
    pub fn get_group_filter<S: KeyStrategy>(&self) -> Option<GroupFilterRef<S>> {
        self.group_shapes.get(&TypeId::of::<S>()).map(|&id| GroupFilterRef {
            id,
            world: self.id(),
            _marker: PhantomData,
        })
    }

    pub(crate) fn group_entry(&self, id: GroupId) -> &GroupEntry {
        &self.groups[id.0]
    }

    /// Files `entity` under its current key.
    pub(crate) fn group_insert(&mut self, id: GroupId, entity: Entity) {
        let Some(record) = self.entities.get(entity.id()) else {
            return;
        };
        self.groups[id.0].index.insert(&self.pools, record, entity);
    }

    pub(crate) fn group_remove(&mut self, id: GroupId, entity: Entity) {
        self.groups[id.0].index.remove(entity);
    }

    /// First half of a re-key pulse: unfile under the stored key.
    pub(crate) fn group_keys_before_change(&mut self, entity: Entity, type_index: u32) {
        let Some(routes) = self.group_key_routes.get(&type_index) else {
            return;
        };
        for &id in routes {
            self.groups[id.0].index.remove(entity);
        }
    }

    /// Second half of a re-key pulse: refile members under the new key.
    pub(crate) fn group_keys_after_change(&mut self, entity: Entity, type_index: u32) {
        let Some(routes) = self.group_key_routes.get(&type_index) else {
            return;
        };
        let Some(record) = self.entities.get(entity.id()) else {
            return;
        };
        for &id in routes {
            let entry = &mut self.groups[id.0];
            if self.filters[entry.filter.0].contains(entity) {
                entry.index.insert(&self.pools, record, entity);
            }
        }
    }
}
