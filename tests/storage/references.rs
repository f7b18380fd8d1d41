//! Integration tests for link properties
//!
//! Tests single links, link sets, object links, nested link paths, eager
//! scrubbing on target destruction, and lazy resolution of unknown ids.

use std::sync::Arc;

use mosaic_foundation::{ErrorCategory, Value, record};
use mosaic_storage::{ComponentDef, EntityDef, Prop, World};

fn setup_world() -> World {
    let mut world = World::new();
    world
        .register_component("Holder", ComponentDef::new().property("target", Prop::entity_ref()))
        .unwrap();
    world
        .register_component(
            "Inventory",
            ComponentDef::new()
                .property("items", Prop::entity_set())
                .property("named", Prop::entity_object()),
        )
        .unwrap();
    world
        .register_component(
            "Deep",
            ComponentDef::new()
                .property("slot", Prop::record([("a", Prop::entity_ref())]))
                .property("things", Prop::record([("items", Prop::entity_set())])),
        )
        .unwrap();
    world
        .register_component(
            "Effect",
            ComponentDef::new()
                .property("equipment", "")
                .property("effects", Prop::component_set())
                .many(),
        )
        .unwrap();
    world
        .register_component("Burning", ComponentDef::new())
        .unwrap();
    world
        .register_component("Watch", ComponentDef::new().property("watched", Prop::component_ref()))
        .unwrap();
    world
}

fn ids(names: &[&str]) -> Vec<Arc<str>> {
    names.iter().map(|n| Arc::from(*n)).collect()
}

// =============================================================================
// Single Links
// =============================================================================

#[test]
fn single_link_resolves_and_scrubs() {
    let mut world = setup_world();
    let target = world.spawn(Some("target")).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Holder", record! { "target" => "target" }).unwrap();

    assert_eq!(world.link(&c, "target").unwrap().as_deref(), Some("target"));
    assert_eq!(world.linked_entity(&c, "target").unwrap().map(|e| e.id()), Some(&target));

    world.remove_entity(&target);
    assert_eq!(world.link(&c, "target").unwrap(), None);
    assert_eq!(world.get(&c, "target").unwrap(), Value::Null);
    assert!(world.linked_entity(&c, "target").unwrap().is_none());
}

#[test]
fn repointing_releases_old_target() {
    let mut world = setup_world();
    let first = world.spawn(Some("first")).unwrap();
    world.spawn(Some("second")).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Holder", Value::Null).unwrap();

    world.set_link(&c, "target", &first).unwrap();
    world.set(&c, "target", "second").unwrap();
    world.remove_entity(&first);
    assert_eq!(world.get(&c, "target").unwrap(), Value::from("second"));

    world.clear_link(&c, "target").unwrap();
    assert_eq!(world.link(&c, "target").unwrap(), None);
}

#[test]
fn link_to_unknown_id_resolves_once_created() {
    let mut world = setup_world();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Holder", record! { "target" => "later" }).unwrap();
    assert_eq!(world.get(&c, "target").unwrap(), Value::Null);

    world.spawn(Some("later")).unwrap();
    assert_eq!(world.get(&c, "target").unwrap(), Value::from("later"));

    world.remove_entity("later");
    world.spawn(Some("later")).unwrap();
    // The link was scrubbed when the first "later" went away.
    assert_eq!(world.get(&c, "target").unwrap(), Value::Null);
}

#[test]
fn wrong_link_operation_is_rejected() {
    let mut world = setup_world();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Inventory", Value::Null).unwrap();
    assert!(world.set_link(&c, "items", "x").is_err());
    assert!(world.set_insert(&c, "named", "x").is_err());
    let err = world.set(&c, "items", 3).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Schema);
}

// =============================================================================
// Link Sets
// =============================================================================

#[test]
fn set_member_scrubbed_on_destroy() {
    let mut world = setup_world();
    let a = world.spawn(Some("a")).unwrap();
    world.spawn(Some("b")).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Inventory", Value::Null).unwrap();

    assert!(world.set_insert(&c, "items", &a).unwrap());
    assert!(!world.set_insert(&c, "items", &a).unwrap());
    world.set_insert(&c, "items", "b").unwrap();
    assert!(world.set_contains(&c, "items", &a).unwrap());

    world.remove_entity(&a);
    assert!(!world.set_contains(&c, "items", "a").unwrap());
    assert_eq!(world.set_members(&c, "items").unwrap(), ids(&["b"]));
    assert_eq!(world.get(&c, "items").unwrap(), Value::list(["b"]));
}

#[test]
fn set_remove_and_clear() {
    let mut world = setup_world();
    for id in ["a", "b", "c"] {
        world.spawn(Some(id)).unwrap();
    }
    let e = world.spawn(None).unwrap();
    let c = world
        .add_component(&e, "Inventory", record! { "items" => Value::list(["a", "b", "c"]) })
        .unwrap();
    assert!(world.set_remove(&c, "items", "b").unwrap());
    assert!(!world.set_remove(&c, "items", "b").unwrap());
    assert_eq!(world.set_members(&c, "items").unwrap(), ids(&["a", "c"]));
    world.set_clear(&c, "items").unwrap();
    assert!(world.set_members(&c, "items").unwrap().is_empty());
}

#[test]
fn component_set_scrubbed_on_component_removal() {
    let mut world = setup_world();
    let e = world.spawn(None).unwrap();
    let burning = world.add_component(&e, "Burning", Value::Null).unwrap();
    let effect = world
        .add_component(&e, "Effect", record! { "equipment" => "pants" })
        .unwrap();
    world.set_insert(&effect, "effects", &burning).unwrap();
    assert!(world.set_contains(&effect, "effects", burning.as_str()).unwrap());

    world.remove_component(&burning);
    assert!(!world.set_contains(&effect, "effects", &burning).unwrap());
}

// =============================================================================
// Object Links
// =============================================================================

#[test]
fn object_keys_survive_scrub() {
    let mut world = setup_world();
    let sword = world.spawn(Some("sword")).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world
        .add_component(&e, "Inventory", record! { "named" => record! { "main" => "sword" } })
        .unwrap();
    assert_eq!(world.link(&c, "named.main").unwrap().as_deref(), Some("sword"));

    world.remove_entity(&sword);
    assert_eq!(world.link_keys(&c, "named").unwrap(), ids(&["main"]));
    assert_eq!(world.get(&c, "named.main").unwrap(), Value::Null);

    assert!(world.remove_link_key(&c, "named.main").unwrap());
    assert!(world.link_keys(&c, "named").unwrap().is_empty());
    assert!(!world.remove_link_key(&c, "named.main").unwrap());
}

// =============================================================================
// Nested Link Paths
// =============================================================================

#[test]
fn nested_links_behave_like_top_level() {
    let mut world = setup_world();
    let target = world.spawn(Some("t")).unwrap();
    let member = world.spawn(Some("m")).unwrap();
    let e = world
        .create_entity(&EntityDef::new().with(
            "Deep",
            record! {
                "slot" => record! { "a" => "t" },
                "things" => record! { "items" => Value::list(["m"]) },
            },
        ))
        .unwrap();
    let c = world.component_of(&e, "Deep").unwrap().id().clone();

    assert_eq!(world.get(&c, "slot.a").unwrap(), Value::from("t"));
    assert!(world.set_contains(&c, "things.items", &member).unwrap());
    assert_eq!(
        world.get(&c, "slot").unwrap(),
        record! { "a" => "t" }
    );

    world.remove_entity(&target);
    world.remove_entity(&member);
    assert_eq!(world.get(&c, "slot.a").unwrap(), Value::Null);
    assert!(world.set_members(&c, "things.items").unwrap().is_empty());
}

#[test]
fn component_ref_scrubbed_when_owner_is_removed() {
    let mut world = setup_world();
    let owner = world.spawn(None).unwrap();
    let burning = world.add_component(&owner, "Burning", Value::Null).unwrap();
    let watcher = world.spawn(None).unwrap();
    let watch = world
        .add_component(&watcher, "Watch", record! { "watched" => burning.as_str() })
        .unwrap();
    assert_eq!(
        world.linked_component(&watch, "watched").unwrap().map(|c| c.id()),
        Some(&burning)
    );

    world.remove_entity(&owner);
    assert!(world.linked_component(&watch, "watched").unwrap().is_none());
}

#[test]
fn removed_holder_releases_its_links() {
    let mut world = setup_world();
    let target = world.spawn(Some("target")).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Holder", record! { "target" => "target" }).unwrap();
    world.remove_component(&c);
    assert!(world.remove_entity(&target));
    assert!(world.component(&c).is_none());
}
