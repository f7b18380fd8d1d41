//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, identifiers, Error, and collections.

mod collections;
mod errors;
mod values;
