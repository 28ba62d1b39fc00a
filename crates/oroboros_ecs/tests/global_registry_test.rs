//! Process-wide registry lifecycle. Kept to a single test: the registry is
//! global state shared by every test in this binary.

use oroboros_ecs::{
    component_type, register_component_type, Component, EcsError, Filter, GroupFilter, GroupKey1,
    World,
};

#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
struct Name(String);
impl Component for Name {}

#[derive(Default, Debug, Clone, PartialEq)]
struct Age(u32);
impl Component for Age {}

#[derive(Default)]
struct Fly;
impl Component for Fly {}

#[derive(Default)]
struct Late;
impl Component for Late {}

#[test]
fn test_register_seal_and_share() {
    let name = register_component_type::<Name>(64).unwrap();
    let age = register_component_type::<Age>(64).unwrap();
    register_component_type::<Fly>(64).unwrap();
    assert!(matches!(
        register_component_type::<Name>(64),
        Err(EcsError::AlreadyRegistered(_))
    ));
    assert_eq!(component_type::<Name>(), name);
    assert_eq!(age.type_index(), name.type_index() + 1);

    let mut world = World::new();
    assert!(matches!(
        register_component_type::<Late>(64),
        Err(EcsError::RegistrySealed(_))
    ));
    assert_eq!(component_type::<Age>(), age);

    let walkers = world.register_filter(Filter::<(Name, Age), (Fly,)>::new(&world));
    world.register_filter(Filter::<(Name,)>::new(&world));
    let by_name = world.register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));

    let bob = world.new_entity();
    world.replace(bob, Name("Bob".into()));
    world.replace(bob, Age(40));
    assert!(walkers.contains(&world, bob));
    assert_eq!(by_name.find_one(&world, &Name("Bob".into())), Some(bob));

    // A second world resolves the same indices.
    let other = World::new();
    assert_eq!(other.registry().lookup::<Name>(), &name);
    assert_ne!(other.id(), world.id());
}
