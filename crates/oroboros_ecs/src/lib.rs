//! # OROBOROS ECS
//!
//! Entity/component runtime with incrementally maintained queries:
//! - Generational entity handles over recycled records
//! - Segmented component pools with stable slots
//! - Filters that track include/exclude composition without rescans
//! - Group filters: O(1) lookup of entities by component value
//!
//! ## Architecture Rules
//!
//! 1. **Register first** - Component types are registered before any world exists
//! 2. **Filters before entities** - A filter only tracks mutations made after it
//! 3. **Synchronous maintenance** - Every index is current when a mutation returns
//!
//! ## Example
//!
//! ```rust,ignore
//! use oroboros_ecs::{register_component_type, Component, Filter, World};
//!
//! #[derive(Default)]
//! struct Name(String);
//! impl Component for Name {}
//!
//! #[derive(Default)]
//! struct Fly;
//! impl Component for Fly {}
//!
//! register_component_type::<Name>(256)?;
//! register_component_type::<Fly>(256)?;
//!
//! let mut world = World::new();
//! let walkers = world.register_filter(Filter::<(Name,), (Fly,)>::new(&world));
//!
//! let bob = world.new_entity();
//! world.replace(bob, Name("Bob".into()));
//! assert!(walkers.contains(&world, bob));
//!
//! world.replace(bob, Fly);
//! assert!(!walkers.contains(&world, bob));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::WorldConfig;
pub use ecs::{
    component_type, presence_bit, register_component_type, Component, ComponentEvent,
    ComponentPool, ComponentPools, ComponentRegistry, ComponentSet, ComponentType, Delegate,
    Entity, EntityCallback, EntityId, Filter, Filter1, Filter2, Filter3, Filter4, FilterListener,
    FilterRef, GroupFilter, GroupFilterRef, GroupKey1, GroupKey2, GroupKey3, Identity, KeyMap,
    KeyStrategy, SlotCallback, SlotEvent, Subscription, World, WorldId,
};
pub use error::{EcsError, EcsResult};
pub use memory::{PoolAllocator, PoolHandle};
