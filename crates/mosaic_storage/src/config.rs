//! Configuration for a world.

use std::sync::Arc;

/// Configuration for a [`World`](crate::World).
///
/// Controls change tracking, table pre-sizing, and generated ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Whether change records are kept (false = no per-mutation overhead).
    pub track_changes: bool,

    /// Expected number of live entities; the entity and component tables are
    /// sized for it up front.
    pub entity_pool: usize,

    /// Prefix of generated entity and component ids.
    pub id_prefix: Arc<str>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            track_changes: true,
            entity_pool: 0,
            id_prefix: Arc::from(""),
        }
    }
}

impl WorldConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for bulk workloads: no change tracking and a
    /// pre-sized pool.
    #[must_use]
    pub fn throughput() -> Self {
        Self {
            track_changes: false,
            entity_pool: 65_536,
            ..Self::default()
        }
    }

    /// Builder method to set change tracking.
    #[must_use]
    pub fn with_track_changes(mut self, track_changes: bool) -> Self {
        self.track_changes = track_changes;
        self
    }

    /// Builder method to set the pool size.
    #[must_use]
    pub fn with_entity_pool(mut self, entity_pool: usize) -> Self {
        self.entity_pool = entity_pool;
        self
    }

    /// Builder method to set the generated id prefix.
    #[must_use]
    pub fn with_id_prefix(mut self, id_prefix: impl Into<Arc<str>>) -> Self {
        self.id_prefix = id_prefix.into();
        self
    }
}
