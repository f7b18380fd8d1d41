//! Equipment systems reacting to slot changes
//!
//! A slot pointing at a wearable entity grants that wearable's effects as
//! components; emptying the slot (directly or by destroying the wearable)
//! takes them away again.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use mosaic_engine::{Scheduler, System, SystemContext};
use mosaic_foundation::{ComponentId, EntityId, Result, Tick, Value, record};
use mosaic_storage::{ChangeOp, ChangeRecord, ComponentDef, EntityDef, Prop, World};

type Seen = Rc<RefCell<Vec<ChangeRecord>>>;

fn setup_world() -> World {
    let mut world = World::new();
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
        .register_component(
            "EquipmentEffect",
            ComponentDef::new()
                .property("equipment", "")
                .property("effects", Prop::component_set())
                .many(),
        )
        .unwrap();
    world
        .register_component(
            "Wearable",
            ComponentDef::new()
                .property("name", "ring")
                .property("effects", record! { "Burning" => record! {} }),
        )
        .unwrap();
    world.register_component("Burning", ComponentDef::new()).unwrap();
    world
        .register_component(
            "Storage",
            ComponentDef::new()
                .property("name", "inventory")
                .property("size", 20)
                .property("items", Prop::entity_set())
                .map_by("name"),
        )
        .unwrap();
    world
        .register_component("Health", ComponentDef::new().property("hp", 10).property("max", 10))
        .unwrap();
    world
}

struct Equip {
    seen: Seen,
}

impl Equip {
    fn equip(world: &mut World, parent: &EntityId, item: &str) -> Result<()> {
        let Some(wearable) = world.component_of(item, "Wearable").map(|c| c.id().clone()) else {
            return Ok(());
        };
        let effects = world.get(&wearable, "effects")?;
        let mut granted = Vec::new();
        if let Some(effects) = effects.as_record() {
            for (component_type, props) in effects.iter() {
                granted.push(world.add_component(parent, component_type, props.clone())?);
            }
        }
        if granted.is_empty() {
            return Ok(());
        }
        let effect = world.add_component(parent, "EquipmentEffect", record! { "equipment" => item })?;
        for component in &granted {
            world.set_insert(&effect, "effects", component)?;
        }
        Ok(())
    }

    fn unequip(world: &mut World, parent: &EntityId, item: &Value) -> Result<()> {
        let matching: Vec<ComponentId> = world
            .components_of(parent, "EquipmentEffect")
            .into_iter()
            .filter(|effect| effect.get("equipment").is_ok_and(|e| &e == item))
            .map(|effect| effect.id().clone())
            .collect();
        for effect in matching {
            for granted in world.set_members(&effect, "effects")? {
                world.remove_component(&*granted);
            }
            world.remove_component(&effect);
        }
        Ok(())
    }
}

impl System for Equip {
    fn subscriptions(&self) -> Vec<Arc<str>> {
        vec![Arc::from("EquipmentSlot")]
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _tick: Tick) -> Result<()> {
        let changes = ctx.take_changes();
        self.seen.replace(changes.clone());
        for change in changes {
            if change.component_type.as_ref() != "EquipmentSlot" || change.op != ChangeOp::LinkSet {
                continue;
            }
            let parent = change.entity.clone();
            match (&change.new_value, &change.old_value) {
                (Value::String(item), _) => Self::equip(ctx.world_mut(), &parent, item)?,
                (Value::Null, old) if !old.is_null() => Self::unequip(ctx.world_mut(), &parent, old)?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Subscribes in setup and scribbles over its own copy.
struct Scribbler {
    seen: Seen,
}

impl System for Scribbler {
    fn setup(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        ctx.subscribe("EquipmentSlot")?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _tick: Tick) -> Result<()> {
        if let Some(first) = ctx.changes_mut().first_mut() {
            first.new_value = Value::from("scribbled");
        }
        self.seen.replace(ctx.changes().to_vec());
        Ok(())
    }
}

#[test]
fn equipment_grants_and_revokes_effects() {
    let mut world = setup_world();
    let mut scheduler = Scheduler::new();
    let changes: Seen = Rc::default();
    let changes2: Seen = Rc::default();
    scheduler
        .add_system(&mut world, "equipment", Equip { seen: Rc::clone(&changes) })
        .unwrap();
    scheduler
        .add_system(&mut world, "equipment", Scribbler { seen: Rc::clone(&changes2) })
        .unwrap();
    assert_eq!(scheduler.system_count("equipment"), 2);

    scheduler.run_group(&mut world, "equipment").unwrap();
    assert!(changes.borrow().is_empty());

    let entity = world
        .create_entity(
            &EntityDef::new()
                .with_alias("pockets", "Storage", record! { "size" => 4 })
                .with_alias("backpack", "Storage", record! { "size" => 25 })
                .with("EquipmentSlot", record! { "pants" => record! {}, "shirt" => record! {} })
                .with("Health", record! { "hp" => 10, "max" => 10 }),
        )
        .unwrap();
    assert_eq!(world.components_of(&entity, "Storage").len(), 2);
    let pants = world
        .create_entity(&EntityDef::new().with(
            "Wearable",
            record! { "name" => "Nice Pants", "effects" => record! { "Burning" => record! {} } },
        ))
        .unwrap();

    scheduler.run_group(&mut world, "equipment").unwrap();
    assert_eq!(changes.borrow().len(), 2);

    let slot = world
        .get_entity(&entity)
        .unwrap()
        .keyed("EquipmentSlot", "pants")
        .cloned()
        .unwrap();
    world.set(&slot, "slot", &pants).unwrap();
    scheduler.run_group(&mut world, "equipment").unwrap();

    {
        let seen = changes.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].op, ChangeOp::LinkSet);
        assert_eq!(seen[0].new_value, Value::from(&pants));
        assert_eq!(seen[0].old_value, Value::Null);
    }
    let burning = world.component_of(&entity, "Burning").unwrap().id().clone();
    let effect = world.component_of(&entity, "EquipmentEffect").unwrap().id().clone();
    assert!(world.set_contains(&effect, "effects", &burning).unwrap());

    world.remove_entity(&pants);
    scheduler.run_group(&mut world, "equipment").unwrap();
    assert_eq!(scheduler.run_group(&mut world, "asdf").unwrap(), 0);

    assert!(!changes2.borrow().is_empty());
    assert_eq!(changes2.borrow()[0].new_value, Value::from("scribbled"));
    assert!(!changes.borrow().is_empty());
    assert_eq!(changes.borrow()[0].new_value, Value::Null);
    let e = world.get_entity(&entity).unwrap();
    assert!(!e.has_component("EquipmentEffect"));
    assert!(!e.has_component("Burning"));
}

#[test]
fn scribbled_copies_do_not_leak_into_later_runs() {
    let mut world = setup_world();
    let mut scheduler = Scheduler::new();
    let scribbled: Seen = Rc::default();
    scheduler
        .add_system(&mut world, "g", Scribbler { seen: Rc::clone(&scribbled) })
        .unwrap();
    let sub = scheduler.subscribers("g")[0];

    let e = world
        .create_entity(&EntityDef::new().with("EquipmentSlot", record! { "a" => record! {} }))
        .unwrap();
    let slot = world.get_entity(&e).unwrap().keyed("EquipmentSlot", "a").cloned().unwrap();
    scheduler.run_group(&mut world, "g").unwrap();
    assert_eq!(scribbled.borrow()[0].new_value, Value::from("scribbled"));

    world.set(&slot, "name", "b").unwrap();
    assert_eq!(world.pending_changes(sub).len(), 1);
    assert_eq!(world.pending_changes(sub)[0].new_value, Value::from("b"));
}
