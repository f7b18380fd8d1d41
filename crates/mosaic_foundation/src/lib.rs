//! Core values, identifiers, errors, and ordered collections for Mosaic.
//!
//! This crate provides:
//! - [`Value`] - Dynamic values held by plain component properties
//! - [`EntityId`] / [`ComponentId`] - String identifiers
//! - [`Error`] - Error types with categories and context
//! - Persistent collections ([`LtVec`], [`LtMap`])
//! - Insertion-ordered collections ([`OrderedSet`], [`OrderedMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod ids;
pub mod value;

pub use collections::{LtMap, LtVec, OrderedMap, OrderedSet};
pub use error::{Error, ErrorCategory, ErrorContext, ErrorKind, Result};
pub use ids::{ComponentId, EntityId, IdGenerator};
pub use value::Value;

/// Logical time step. Advances exactly once per world tick.
pub type Tick = u64;

/// Builds a [`Value::Record`] from `key => value` pairs.
///
/// ```
/// use mosaic_foundation::{record, Value};
///
/// let hp = record! { "max" => 25, "current" => 10 };
/// assert_eq!(hp.get("max"), Some(&Value::Int(25)));
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Value::empty_record()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Value::record([$(($key, $crate::Value::from($value))),+])
    };
}
