//! Integration tests for group filters.

use std::collections::HashMap;
use std::sync::Arc;

use oroboros_ecs::{
    Component, ComponentRegistry, EcsError, Entity, Filter1, Filter2, Filter3, GroupFilter,
    GroupKey1, GroupKey2, GroupKey3, Identity, KeyMap, World, WorldConfig,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
struct Name(String);
impl Component for Name {}

#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
struct Team(u8);
impl Component for Team {}

#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
struct Level(u32);
impl Component for Level {}

/// Buckets levels into tiers of ten.
#[derive(Default)]
struct Tier;

impl KeyMap<Level> for Tier {
    type Key = u32;

    fn map_key(&self, source: &Level) -> u32 {
        source.0 / 10
    }
}

fn world() -> World {
    let mut registry = ComponentRegistry::new();
    registry.register::<Name>(16).unwrap();
    registry.register::<Team>(16).unwrap();
    registry.register::<Level>(16).unwrap();
    World::with_registry(Arc::new(registry), WorldConfig::compact())
}

fn name(value: &str) -> Name {
    Name(value.to_string())
}

#[test]
fn test_find_one_follows_replace() {
    let mut world = world();
    world.register_filter(Filter1::<Name>::new(&world));
    let by_name = world.register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));

    let entity = world.new_entity();
    world.replace(entity, name("A"));
    assert_eq!(by_name.find_one(&world, &name("A")), Some(entity));

    world.replace(entity, name("B"));
    assert_eq!(by_name.find_one(&world, &name("A")), None);
    assert_eq!(by_name.find_one(&world, &name("B")), Some(entity));
    assert_eq!(by_name.len(&world), 1);
    assert_eq!(by_name.bucket_count(&world), 1);
}

#[test]
fn test_update_rekeys() {
    let mut world = world();
    world.register_filter(Filter1::<Level>::new(&world));
    let by_tier =
        world.register_group_filter(GroupFilter::<GroupKey1<Level, Tier>>::new(&world));

    let entity = world.new_entity();
    world.replace(entity, Level(5));
    assert_eq!(by_tier.key_of(&world, entity), Some(&0));

    assert!(world.update::<Level>(entity, |level| level.0 = 27));
    assert_eq!(by_tier.key_of(&world, entity), Some(&2));
    assert_eq!(by_tier.count(&world, &0), 0);
    assert_eq!(by_tier.count(&world, &2), 1);
}

#[test]
fn test_composite_key() {
    let mut world = world();
    world.register_filter(Filter2::<Team, Level>::new(&world));
    let by_team_tier = world.register_group_filter(GroupFilter::<
        GroupKey2<Team, Level, Identity, Tier>,
    >::new(&world));

    let mut red = Vec::new();
    for level in [1, 4, 12] {
        let entity = world.new_entity();
        world.replace(entity, Team(1));
        world.replace(entity, Level(level));
        red.push(entity);
    }

    let mut low: Vec<Entity> = by_team_tier.entities(&world, &(Team(1), 0)).collect();
    low.sort();
    assert_eq!(low, red[..2]);
    assert_eq!(by_team_tier.find_one(&world, &(Team(1), 1)), Some(red[2]));

    // Changing the other key part also re-buckets.
    world.replace(red[2], Team(2));
    assert_eq!(by_team_tier.find_one(&world, &(Team(1), 1)), None);
    assert_eq!(by_team_tier.find_one(&world, &(Team(2), 1)), Some(red[2]));

    let mut count = 0;
    by_team_tier.foreach(&world, &(Team(1), 0), |_| count += 1);
    assert_eq!(count, 2);
}

type Roster = GroupKey3<Team, Level, Name, Identity, Tier, Identity>;

#[test]
fn test_three_part_key_rebuckets() {
    let mut world = world();
    world.register_filter(Filter3::<Team, Level, Name>::new(&world));
    let roster = world.register_group_filter(GroupFilter::<Roster>::with_strategy(
        &world,
        Roster::with_mappers(Identity, Tier, Identity),
    ));

    let entity = world.new_entity();
    world.replace(entity, Team(3));
    world.replace(entity, Level(8));
    assert_eq!(roster.len(&world), 0);
    world.replace(entity, name("ada"));

    let start = (Team(3), 0, name("ada"));
    assert_eq!(roster.find_one(&world, &start), Some(entity));

    // Same tier: the key is unchanged.
    world.replace(entity, Level(9));
    assert_eq!(roster.key_of(&world, entity), Some(&start));

    // Each part re-buckets on its own.
    world.replace(entity, Level(31));
    assert_eq!(roster.find_one(&world, &start), None);
    assert_eq!(roster.find_one(&world, &(Team(3), 3, name("ada"))), Some(entity));

    world.replace(entity, name("bea"));
    world.update::<Team>(entity, |team| team.0 = 4);
    assert_eq!(roster.key_of(&world, entity), Some(&(Team(4), 3, name("bea"))));
    assert_eq!(roster.len(&world), 1);
    assert_eq!(roster.bucket_count(&world), 1);
}

#[test]
fn test_leaving_filter_unfiles() {
    let mut world = world();
    world.register_filter(Filter1::<Name>::new(&world));
    let by_name = world.register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));

    let kept = world.new_entity();
    let deleted = world.new_entity();
    let destroyed = world.new_entity();
    for entity in [kept, deleted, destroyed] {
        world.replace(entity, name("same"));
    }
    assert_eq!(by_name.count(&world, &name("same")), 3);

    world.del::<Name>(deleted);
    world.destroy(destroyed);
    assert_eq!(by_name.count(&world, &name("same")), 1);
    assert_eq!(by_name.find_one(&world, &name("same")), Some(kept));
    assert_eq!(by_name.key_of(&world, deleted), None);
}

#[test]
fn test_registration_files_existing_members() {
    let mut world = world();
    world.register_filter(Filter1::<Name>::new(&world));
    let entity = world.new_entity();
    world.replace(entity, name("early"));

    let by_name = world.register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));
    assert_eq!(by_name.find_one(&world, &name("early")), Some(entity));
    assert!(world.get_group_filter::<GroupKey1<Name>>().is_some());
    assert_eq!(world.group_filter_count(), 1);
}

#[test]
fn test_requires_underlying_filter() {
    let world = world();
    let result = GroupFilter::<GroupKey1<Name>>::try_new(&world, GroupKey1::default());
    assert!(matches!(result, Err(EcsError::FilterNotRegistered(_))));
}

#[test]
fn test_duplicate_strategy_fails() {
    let mut world = world();
    world.register_filter(Filter1::<Name>::new(&world));
    world.register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));
    let again = world.try_register_group_filter(GroupFilter::<GroupKey1<Name>>::new(&world));
    assert!(matches!(again, Err(EcsError::DuplicateGroupFilter(_))));
}

#[test]
fn test_every_member_in_exactly_one_bucket() {
    let mut world = world();
    let tiered = world.register_filter(Filter1::<Level>::new(&world));
    let by_tier =
        world.register_group_filter(GroupFilter::<GroupKey1<Level, Tier>>::new(&world));
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut entities: Vec<Entity> = (0..24).map(|_| world.new_entity()).collect();
    for _ in 0..3_000 {
        let slot = rng.gen_range(0..entities.len());
        let entity = entities[slot];
        match rng.gen_range(0..5) {
            0 | 1 => world.replace(entity, Level(rng.gen_range(0..50))),
            2 => {
                world.update::<Level>(entity, |level| level.0 = (level.0 + 7) % 50);
            }
            3 => {
                world.del::<Level>(entity);
            }
            _ => {
                world.destroy(entity);
                entities[slot] = world.new_entity();
            }
        }

        let mut per_tier: HashMap<u32, usize> = HashMap::new();
        for &e in &entities {
            match world.try_get::<Level>(e) {
                Some(level) => {
                    assert!(tiered.contains(&world, e));
                    assert_eq!(by_tier.key_of(&world, e), Some(&(level.0 / 10)));
                    *per_tier.entry(level.0 / 10).or_default() += 1;
                }
                None => assert_eq!(by_tier.key_of(&world, e), None),
            }
        }
        for (tier, count) in per_tier {
            assert_eq!(by_tier.count(&world, &tier), count);
        }
        assert_eq!(by_tier.len(&world), tiered.len(&world));
    }
}
