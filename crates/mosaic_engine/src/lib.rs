//! Systems and per-group update scheduling for Mosaic.
//!
//! This crate provides:
//! - [`System`] - The contract a change-driven system implements
//! - [`SystemContext`] - A system's view of the world during one call
//! - [`Scheduler`] - Named groups of systems run in registration order

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod schedule;
pub mod system;

pub use schedule::Scheduler;
pub use system::{System, SystemContext};
