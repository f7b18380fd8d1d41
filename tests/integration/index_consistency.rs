//! Maintained indexes against direct evaluation
//!
//! Random sequences of structural edits are applied to a world holding
//! several indexed queries. After one resync, each index must hold exactly
//! the entities an unindexed run of the same query finds.

use std::collections::BTreeSet;

use mosaic::foundation::{EntityId, Value};
use mosaic::storage::{ComponentDef, Query, QuerySpec, World};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Spawn,
    Add(usize, &'static str),
    Remove(usize, &'static str),
    Tag(usize),
    Untag(usize),
    Destroy(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let ty = prop_oneof![Just("A"), Just("B"), Just("C")];
    prop_oneof![
        2 => Just(Op::Spawn),
        4 => (any::<usize>(), ty.clone()).prop_map(|(i, t)| Op::Add(i, t)),
        2 => (any::<usize>(), ty).prop_map(|(i, t)| Op::Remove(i, t)),
        1 => any::<usize>().prop_map(Op::Tag),
        1 => any::<usize>().prop_map(Op::Untag),
        1 => any::<usize>().prop_map(Op::Destroy),
    ]
}

fn setup_world() -> World {
    let mut world = World::new();
    for name in ["A", "B", "C"] {
        world.register_component(name, ComponentDef::new()).unwrap();
    }
    world.register_tags(["T"]).unwrap();
    world
}

fn specs() -> Vec<QuerySpec> {
    vec![
        QuerySpec::new().from_all(["A"]),
        QuerySpec::new().from_all(["A", "B"]).not(["C"]),
        QuerySpec::new().from_any(["B", "C"]).not(["T"]),
        QuerySpec::new().from_all(["T"]).from_any(["A", "C"]),
        QuerySpec::new().not(["A"]),
    ]
}

fn pick(entities: &[EntityId], i: usize) -> Option<&EntityId> {
    if entities.is_empty() {
        None
    } else {
        entities.get(i % entities.len())
    }
}

fn apply(world: &mut World, entities: &mut Vec<EntityId>, op: &Op) {
    match op {
        Op::Spawn => entities.push(world.spawn(None).unwrap()),
        Op::Add(i, ty) => {
            if let Some(e) = pick(entities, *i) {
                if !world.get_entity(e).unwrap().has_component(ty) {
                    world.add_component(e, ty, Value::Null).unwrap();
                }
            }
        }
        Op::Remove(i, ty) => {
            if let Some(e) = pick(entities, *i).cloned() {
                world.remove_component_by_type(&e, ty).unwrap();
            }
        }
        Op::Tag(i) => {
            if let Some(e) = pick(entities, *i).cloned() {
                world.add_tag(&e, "T").unwrap();
            }
        }
        Op::Untag(i) => {
            if let Some(e) = pick(entities, *i).cloned() {
                world.remove_tag(&e, "T").unwrap();
            }
        }
        Op::Destroy(i) => {
            if !entities.is_empty() {
                let e = entities.remove(i % entities.len());
                assert!(world.remove_entity(&e));
            }
        }
    }
}

fn members(world: &World, query: &Query) -> BTreeSet<String> {
    query.execute(world).iter().map(|e| e.as_str().to_string()).collect()
}

fn check(world: &World, pairs: &[(Query, Query)]) -> Result<(), TestCaseError> {
    for (indexed, direct) in pairs {
        prop_assert_eq!(members(world, indexed), members(world, direct));
    }
    Ok(())
}

fn build(world: &mut World) -> Vec<(Query, Query)> {
    specs()
        .into_iter()
        .enumerate()
        .map(|(n, spec)| {
            let indexed = world.create_query(spec.clone().index(format!("q{n}"))).unwrap();
            let direct = world.create_query(spec).unwrap();
            (indexed, direct)
        })
        .collect()
}

proptest! {
    #[test]
    fn indexes_match_direct_evaluation_after_tick(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut world = setup_world();
        let pairs = build(&mut world);
        let mut entities = Vec::new();
        for op in &ops {
            apply(&mut world, &mut entities, op);
        }
        world.tick();
        check(&world, &pairs)?;
    }

    #[test]
    fn indexes_match_after_per_entity_resync(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut world = setup_world();
        let pairs = build(&mut world);
        let mut entities = Vec::new();
        for op in &ops {
            apply(&mut world, &mut entities, op);
        }
        for e in &entities {
            world.update_indexes(e);
        }
        check(&world, &pairs)?;
    }

    #[test]
    fn index_built_late_matches_direct_evaluation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut world = setup_world();
        let mut entities = Vec::new();
        for op in &ops {
            apply(&mut world, &mut entities, op);
        }
        world.tick();
        let pairs = build(&mut world);
        check(&world, &pairs)?;
    }
}
