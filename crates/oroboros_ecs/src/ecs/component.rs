//! # Component Definitions
//!
//! Components are plain data attached to entities. Any `Default + 'static`
//! type opts in with an empty [`Component`] impl.
//!
//! [`ComponentSet`] describes an ordered list of component types as a tuple.
//! Filters use it for their include and exclude lists and group filters use
//! it for their key sources.

use super::registry::{ComponentRegistry, ComponentType};
use super::storage::ComponentPools;
use crate::memory::PoolHandle;

/// Marker trait for data that can be attached to an entity.
///
/// `Default` supplies the zero value used by
/// [`World::ensure`](crate::World::ensure).
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Name(String);
/// impl Component for Name {}
/// ```
pub trait Component: Default + 'static {}

/// An ordered tuple of component types.
///
/// Implemented for `()` and for tuples of one to four components.
pub trait ComponentSet: 'static {
    /// Shared references to each member, in tuple order.
    type Refs<'w>;

    /// Number of component types in the set.
    const LEN: usize;

    /// Resolves every member against a registry.
    ///
    /// # Panics
    ///
    /// Panics if a member type is not registered.
    fn component_types(registry: &ComponentRegistry) -> Vec<ComponentType>;

    /// Like [`component_types`](Self::component_types), but reports the
    /// first unregistered member instead of panicking.
    fn try_component_types(registry: &ComponentRegistry) -> Result<Vec<ComponentType>, &'static str>;

    /// Borrows each member from its pool.
    ///
    /// `types` holds the members' type indices in tuple order and `slot`
    /// maps a tuple position to the pool slot to read.
    fn fetch<'w>(
        pools: &'w ComponentPools,
        types: &[u32],
        slot: impl Fn(usize) -> Option<PoolHandle>,
    ) -> Option<Self::Refs<'w>>;
}

impl ComponentSet for () {
    type Refs<'w> = ();

    const LEN: usize = 0;

    fn component_types(_registry: &ComponentRegistry) -> Vec<ComponentType> {
        Vec::new()
    }

    fn try_component_types(_registry: &ComponentRegistry) -> Result<Vec<ComponentType>, &'static str> {
        Ok(Vec::new())
    }

    fn fetch<'w>(
        _pools: &'w ComponentPools,
        _types: &[u32],
        _slot: impl Fn(usize) -> Option<PoolHandle>,
    ) -> Option<Self::Refs<'w>> {
        Some(())
    }
}

macro_rules! impl_component_set {
    ($len:expr; $($name:ident => $idx:tt),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'w> = ($(&'w $name,)+);

            const LEN: usize = $len;

            fn component_types(registry: &ComponentRegistry) -> Vec<ComponentType> {
                vec![$(*registry.lookup::<$name>()),+]
            }

            fn try_component_types(
                registry: &ComponentRegistry,
            ) -> Result<Vec<ComponentType>, &'static str> {
                Ok(vec![$(
                    *registry
                        .try_lookup::<$name>()
                        .ok_or(std::any::type_name::<$name>())?
                ),+])
            }

            fn fetch<'w>(
                pools: &'w ComponentPools,
                types: &[u32],
                slot: impl Fn(usize) -> Option<PoolHandle>,
            ) -> Option<Self::Refs<'w>> {
                Some(($(
                    pools.get::<$name>(types[$idx])?.dereference(slot($idx)?)?,
                )+))
            }
        }
    };
}

impl_component_set!(1; A => 0);
impl_component_set!(2; A => 0, B => 1);
impl_component_set!(3; A => 0, B => 1, C => 2);
impl_component_set!(4; A => 0, B => 1, C => 2, D => 3);
