//! Integration tests for Layer 2: Engine
//!
//! Tests systems driven by change feeds and maintained indexes.

mod equipment;
mod queries;
