//! Integration tests for Layer 1: Storage
//!
//! Tests for the world: components, entities, references, queries, change
//! feeds, and the transfer form.

mod changes;
mod references;
