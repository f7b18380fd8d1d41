//! Integration tests for change feeds
//!
//! Tests record contents per operation, subscriber isolation, read-once
//! draining, and disabled tracking.

use mosaic_foundation::{Value, record};
use mosaic_storage::{ChangeOp, ComponentDef, Prop, World, WorldConfig};

fn setup_world(config: WorldConfig) -> World {
    let mut world = World::with_config(config);
    world
        .register_component("Position", ComponentDef::new().property("x", 0).property("y", 0))
        .unwrap();
    world
        .register_component(
            "EquipmentSlot",
            ComponentDef::new()
                .property("name", "")
                .property("slot", Prop::entity_ref())
                .map_by("name"),
        )
        .unwrap();
    world
        .register_component("Bag", ComponentDef::new().property("items", Prop::entity_set()))
        .unwrap();
    world
}

// =============================================================================
// Record Contents
// =============================================================================

#[test]
fn property_write_records_before_and_after() {
    let mut world = setup_world(WorldConfig::default());
    let sub = world.register_subscriber(["Position"]).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Position", record! { "x" => 1 }).unwrap();
    world.tick();
    world.set(&c, "y", 3).unwrap();

    let changes = world.drain_changes(sub);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].op, ChangeOp::Added);
    assert_eq!(changes[0].component, c);
    assert_eq!(changes[0].entity, e);
    assert_eq!(changes[0].tick, 0);

    let write = &changes[1];
    assert_eq!(write.op, ChangeOp::Changed);
    assert_eq!(write.property.as_deref(), Some("y"));
    assert_eq!(write.new_value, Value::Int(3));
    assert_eq!(write.old_value, Value::Int(0));
    assert_eq!(write.component_type.as_ref(), "Position");
    assert_eq!(write.tick, 1);
}

#[test]
fn link_writes_and_scrubs_are_recorded() {
    let mut world = setup_world(WorldConfig::default());
    let sub = world.register_subscriber(["EquipmentSlot", "Bag"]).unwrap();
    let pants = world.spawn(Some("pants")).unwrap();
    let e = world.spawn(None).unwrap();
    let slot = world
        .add_component(&e, "EquipmentSlot", record! { "name" => "legs" })
        .unwrap();
    let bag = world.add_component(&e, "Bag", Value::Null).unwrap();
    world.drain_changes(sub);

    world.set(&slot, "slot", &pants).unwrap();
    world.set_insert(&bag, "items", &pants).unwrap();
    let changes = world.drain_changes(sub);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].op, ChangeOp::LinkSet);
    assert_eq!(changes[0].new_value, Value::from("pants"));
    assert_eq!(changes[0].old_value, Value::Null);
    assert_eq!(changes[1].op, ChangeOp::LinkAdded);

    world.remove_entity(&pants);
    let changes = world.drain_changes(sub);
    let ops: Vec<ChangeOp> = changes.iter().map(|c| c.op).collect();
    assert_eq!(ops.len(), 2);
    assert!(ops.contains(&ChangeOp::LinkSet));
    assert!(ops.contains(&ChangeOp::LinkRemoved));
    for change in &changes {
        assert_eq!(change.new_value, Value::Null);
        assert_eq!(change.old_value, Value::from("pants"));
    }
}

#[test]
fn removal_is_recorded() {
    let mut world = setup_world(WorldConfig::default());
    let sub = world.register_subscriber(["Position"]).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Position", Value::Null).unwrap();
    world.remove_entity(&e);
    let changes = world.drain_changes(sub);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].op, ChangeOp::Removed);
    assert_eq!(changes[1].component, c);
}

// =============================================================================
// Subscribers
// =============================================================================

#[test]
fn subscribers_receive_independent_sequences() {
    let mut world = setup_world(WorldConfig::default());
    let first = world.register_subscriber(["Position"]).unwrap();
    let second = world.register_subscriber(["Position"]).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Position", Value::Null).unwrap();

    let mut mine = world.drain_changes(first);
    mine.clear();
    assert_eq!(world.pending_changes(second).len(), 1);
    assert!(world.drain_changes(first).is_empty());

    world.set(&c, "x", 2).unwrap();
    assert_eq!(world.drain_changes(first).len(), 1);
    assert_eq!(world.drain_changes(second).len(), 2);
}

#[test]
fn only_watched_types_are_delivered() {
    let mut world = setup_world(WorldConfig::default());
    let sub = world.register_subscriber(["Bag"]).unwrap();
    let e = world.spawn(None).unwrap();
    world.add_component(&e, "Position", Value::Null).unwrap();
    assert!(world.pending_changes(sub).is_empty());

    assert!(world.subscribe(sub, "Position").unwrap());
    world.remove_component_by_type(&e, "Position").unwrap();
    assert_eq!(world.pending_changes(sub).len(), 1);
    assert!(world.subscribe(sub, "Nope").is_err());
    assert!(world.register_subscriber(["Nope"]).is_err());
}

#[test]
fn unregistered_subscriber_stops_receiving() {
    let mut world = setup_world(WorldConfig::default());
    let sub = world.register_subscriber(["Position"]).unwrap();
    world.unregister_subscriber(sub);
    let e = world.spawn(None).unwrap();
    world.add_component(&e, "Position", Value::Null).unwrap();
    assert!(world.drain_changes(sub).is_empty());
    assert!(!world.subscribe(sub, "Position").unwrap());
}

#[test]
fn disabled_tracking_records_nothing() {
    let mut world = setup_world(WorldConfig::new().with_track_changes(false));
    let sub = world.register_subscriber(["Position"]).unwrap();
    let e = world.spawn(None).unwrap();
    let c = world.add_component(&e, "Position", Value::Null).unwrap();
    world.set(&c, "x", 1).unwrap();
    assert!(world.drain_changes(sub).is_empty());
}
