//! # Entity Component System
//!
//! Entities, pooled components and incrementally maintained queries.
//!
//! ## Design Philosophy
//!
//! - Component types are registered once, before any world exists
//! - Entity IDs are indices with generation counters
//! - Filters and group filters are updated on mutation, never rescanned
//! - All maintenance runs synchronously on the caller's thread

mod access;
mod component;
mod entity;
mod event;
mod filter;
mod group;
mod registry;
mod storage;
mod world;

pub use component::{Component, ComponentSet};
pub use entity::{Entity, EntityId, WorldId};
pub use event::{
    ComponentEvent, Delegate, EntityCallback, FilterListener, SlotCallback, SlotEvent,
    Subscription,
};
pub use filter::{Filter, Filter1, Filter2, Filter3, Filter4, FilterRef};
pub use group::{
    GroupFilter, GroupFilterRef, GroupKey1, GroupKey2, GroupKey3, Identity, KeyMap, KeyStrategy,
};
pub use registry::{
    component_type, presence_bit, register_component_type, ComponentRegistry, ComponentType,
};
pub use storage::{ComponentPool, ComponentPools};
pub use world::World;
