//! Mosaic - In-memory entity-component store
//!
//! This crate re-exports all layers of the Mosaic system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: mosaic_engine     — Systems, per-group update scheduling
//! Layer 1: mosaic_storage    — World, references, indexed queries, change feeds
//! Layer 0: mosaic_foundation — Core types (Value, ids, Error, collections)
//! ```

pub use mosaic_engine as engine;
pub use mosaic_foundation as foundation;
pub use mosaic_storage as storage;
