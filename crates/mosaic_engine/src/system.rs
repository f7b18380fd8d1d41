//! The system contract.
//!
//! A system is an external consumer of the change feed. It declares the
//! component types it watches, gets one [`System::setup`] call when it is
//! added to a [`Scheduler`](crate::Scheduler), and one [`System::update`]
//! call per run of its group. Each update sees only the records gathered
//! for that system since its previous update.

use std::sync::Arc;

use mosaic_foundation::{Result, Tick};
use mosaic_storage::{ChangeRecord, SubscriberId, World};

// =============================================================================
// System
// =============================================================================

/// A change-driven system.
pub trait System {
    /// Component types whose changes this system receives from the start.
    fn subscriptions(&self) -> Vec<Arc<str>> {
        Vec::new()
    }

    /// Called once when the system is added, after its subscriber exists.
    /// Queries indexed by [`SystemContext::subscriber`] belong here.
    ///
    /// # Errors
    ///
    /// Any error aborts adding the system.
    fn setup(&mut self, ctx: &mut SystemContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once per run of the system's group.
    ///
    /// # Errors
    ///
    /// Any error stops the group run and is returned to the caller.
    fn update(&mut self, ctx: &mut SystemContext<'_>, tick: Tick) -> Result<()>;
}

// =============================================================================
// SystemContext
// =============================================================================

/// A system's view of the world during [`System::setup`] or
/// [`System::update`].
///
/// The context owns the records handed to the system. They were already
/// taken from the world's buffer, so mutating them affects no other
/// subscriber and no later update.
pub struct SystemContext<'w> {
    world: &'w mut World,
    subscriber: SubscriberId,
    changes: Vec<ChangeRecord>,
}

impl<'w> SystemContext<'w> {
    /// Creates a context around already-drained records.
    #[must_use]
    pub fn new(world: &'w mut World, subscriber: SubscriberId, changes: Vec<ChangeRecord>) -> Self {
        Self {
            world,
            subscriber,
            changes,
        }
    }

    /// Returns the world.
    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    /// Returns the world for mutation.
    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Returns this system's subscriber id. It doubles as the key of the
    /// system's own maintained index.
    #[must_use]
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Returns the records delivered to this call.
    #[must_use]
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Returns the delivered records for mutation.
    pub fn changes_mut(&mut self) -> &mut Vec<ChangeRecord> {
        &mut self.changes
    }

    /// Takes the delivered records, leaving none behind.
    pub fn take_changes(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.changes)
    }

    /// Starts watching another component type. Watching a type twice is a
    /// no-op. Returns false once the subscriber has been unregistered.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the type is not registered.
    pub fn subscribe(&mut self, component_type: &str) -> Result<bool> {
        let subscriber = self.subscriber;
        self.world.subscribe(subscriber, component_type)
    }
}

impl std::fmt::Debug for SystemContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("subscriber", &self.subscriber)
            .field("changes", &self.changes.len())
            .finish_non_exhaustive()
    }
}
