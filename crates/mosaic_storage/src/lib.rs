//! Entity-component storage, references, indexed queries, and change feeds
//! for Mosaic.
//!
//! This crate provides:
//! - [`World`] - Owner of every entity, component, index, and change buffer
//! - [`ComponentDef`] / [`ComponentType`] - Schemas compiled to slot layouts
//! - Link properties with eager scrubbing on target destruction
//! - [`QuerySpec`] / [`Query`] - On-demand and incrementally maintained queries
//! - [`ChangeLog`] - Per-subscriber change feeds
//! - [`EntityDef`] - Entity transfer form (JSON and `MessagePack`)
//!
//! ```
//! use mosaic_foundation::record;
//! use mosaic_storage::{ComponentDef, EntityDef, QuerySpec, World};
//!
//! let mut world = World::new();
//! world
//!     .register_component("Health", ComponentDef::new().property("hp", 25))
//!     .unwrap();
//! let hero = world
//!     .create_entity(&EntityDef::new().with("Health", record! { "hp" => 10 }))
//!     .unwrap();
//!
//! let query = world.create_query(QuerySpec::new().from_all(["Health"])).unwrap();
//! assert!(query.execute(&world).contains(&hero));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod changes;
pub mod component;
pub mod config;
pub mod entity;
mod index;
mod property;
pub mod query;
mod reference;
pub mod registry;
pub mod schema;
pub mod serialize;
pub mod world;

pub use changes::{ChangeLog, ChangeOp, ChangeRecord, SubscriberId};
pub use component::Component;
pub use config::WorldConfig;
pub use entity::Entity;
pub use query::{ExecuteOptions, IndexKey, Query, QueryResult, QuerySpec};
pub use registry::{Registry, Term};
pub use schema::{
    ComponentDef, ComponentType, Field, FieldKind, Hook, Layout, LinkKind, LinkTarget, Prop,
    RESERVED_PROPERTIES, SerializePolicy,
};
pub use serialize::EntityDef;
pub use world::World;
