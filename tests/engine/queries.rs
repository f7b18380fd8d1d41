//! Systems holding maintained queries
//!
//! A system builds an index keyed by its own subscriber in setup and reads
//! it on every update.

use std::cell::RefCell;
use std::rc::Rc;

use mosaic_engine::{Scheduler, System, SystemContext};
use mosaic_foundation::{Result, Tick, Value, record};
use mosaic_storage::{ComponentDef, EntityDef, Query, QueryResult, QuerySpec, World};

struct TileSystem {
    query: Option<Query>,
    last: Rc<RefCell<QueryResult>>,
    ticks: Rc<RefCell<Vec<Tick>>>,
}

impl TileSystem {
    fn new(last: &Rc<RefCell<QueryResult>>, ticks: &Rc<RefCell<Vec<Tick>>>) -> Self {
        Self {
            query: None,
            last: Rc::clone(last),
            ticks: Rc::clone(ticks),
        }
    }
}

impl System for TileSystem {
    fn setup(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let spec = QuerySpec::new()
            .from_all(["Tile"])
            .not(["Hidden"])
            .index(ctx.subscriber());
        self.query = Some(ctx.world_mut().create_query(spec)?);
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, tick: Tick) -> Result<()> {
        if let Some(query) = &self.query {
            self.last.replace(query.execute(ctx.world()));
        }
        self.ticks.borrow_mut().push(tick);
        Ok(())
    }
}

fn setup_world() -> World {
    let mut world = World::new();
    world
        .register_component(
            "Tile",
            ComponentDef::new().property("x", 0).property("y", 0).property("level", 0),
        )
        .unwrap();
    world.register_component("Hidden", ComponentDef::new()).unwrap();
    world
}

#[test]
fn add_and_remove_forbidden_component() {
    let mut world = setup_world();
    let mut scheduler = Scheduler::new();
    let last = Rc::new(RefCell::new(QueryResult::default()));
    let ticks = Rc::new(RefCell::new(Vec::new()));
    let subscriber = scheduler
        .add_system(&mut world, "map", TileSystem::new(&last, &ticks))
        .unwrap();

    scheduler.run_group(&mut world, "map").unwrap();
    assert_eq!(last.borrow().len(), 0);

    let tile1 = world
        .create_entity(&EntityDef::new().with("Tile", record! { "x" => 10, "y" => 0, "level" => 0 }))
        .unwrap();
    let tile2 = world
        .create_entity(
            &EntityDef::new()
                .with("Tile", record! { "x" => 11, "y" => 0, "level" => 0 })
                .with("Hidden", Value::Null),
        )
        .unwrap();

    world.tick();
    scheduler.run_group(&mut world, "map").unwrap();
    assert_eq!(last.borrow().len(), 1);
    assert!(last.borrow().contains(&tile1));

    world.remove_component_by_type(&tile2, "Hidden").unwrap();
    world.tick();
    scheduler.run_group(&mut world, "map").unwrap();
    assert_eq!(last.borrow().len(), 2);
    assert!(last.borrow().contains(&tile1));
    assert!(last.borrow().contains(&tile2));

    world.add_component(&tile1, "Hidden", Value::Null).unwrap();
    world.update_indexes(&tile1);
    scheduler.run_group(&mut world, "map").unwrap();
    assert_eq!(last.borrow().len(), 1);
    assert!(last.borrow().contains(&tile2));

    assert_eq!(*ticks.borrow(), vec![0, 1, 2, 2]);
    assert_eq!(world.query_index(subscriber).unwrap(), *last.borrow());
}

#[test]
fn removing_group_drops_system_index() {
    let mut world = setup_world();
    let mut scheduler = Scheduler::new();
    let last = Rc::new(RefCell::new(QueryResult::default()));
    let ticks = Rc::new(RefCell::new(Vec::new()));
    let subscriber = scheduler
        .add_system(&mut world, "map", TileSystem::new(&last, &ticks))
        .unwrap();
    assert!(world.query_index(subscriber).is_some());

    assert!(scheduler.remove_group(&mut world, "map"));
    assert!(!scheduler.remove_group(&mut world, "map"));
    assert!(world.query_index(subscriber).is_none());
    assert_eq!(scheduler.run_group(&mut world, "map").unwrap(), 0);
}
