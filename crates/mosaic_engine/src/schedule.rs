//! Named groups of systems.
//!
//! Running a group visits its systems in the order they were added. Each
//! system's pending records are drained from the world immediately before
//! its update, so a system sees everything since its own previous update
//! regardless of when other systems last ran.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_foundation::Result;
use mosaic_storage::{SubscriberId, World};
use tracing::{debug, trace};

use crate::system::{System, SystemContext};

/// A system together with the subscriber it was registered under.
struct Registered {
    subscriber: SubscriberId,
    system: Box<dyn System>,
}

/// Runs systems by group.
#[derive(Default)]
pub struct Scheduler {
    groups: HashMap<Arc<str>, Vec<Registered>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system to a group and returns its subscriber id.
    ///
    /// The subscriber is registered with the system's declared
    /// subscriptions before [`System::setup`] runs.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a declared subscription names an unknown
    /// type, or whatever `setup` returns. On error the system is not added.
    pub fn add_system(
        &mut self,
        world: &mut World,
        group: &str,
        mut system: impl System + 'static,
    ) -> Result<SubscriberId> {
        let subscriber = world.register_subscriber(system.subscriptions())?;
        let mut ctx = SystemContext::new(world, subscriber, Vec::new());
        if let Err(e) = system.setup(&mut ctx) {
            world.unregister_subscriber(subscriber);
            return Err(e);
        }
        debug!(group, %subscriber, "system added");
        self.groups.entry(Arc::from(group)).or_default().push(Registered {
            subscriber,
            system: Box::new(system),
        });
        Ok(subscriber)
    }

    /// Runs every system in a group once, in registration order, and
    /// returns how many ran. An unknown or empty group runs nothing.
    ///
    /// # Errors
    ///
    /// Returns the first error a system's update returns. Systems after it
    /// do not run; the failing system's records are already consumed.
    pub fn run_group(&mut self, world: &mut World, group: &str) -> Result<usize> {
        let Some(systems) = self.groups.get_mut(group) else {
            trace!(group, "no such group");
            return Ok(0);
        };
        let tick = world.current_tick();
        for entry in systems.iter_mut() {
            let changes = world.drain_changes(entry.subscriber);
            trace!(group, subscriber = %entry.subscriber, changes = changes.len(), "system update");
            let mut ctx = SystemContext::new(world, entry.subscriber, changes);
            entry.system.update(&mut ctx, tick)?;
        }
        Ok(systems.len())
    }

    /// Removes a group, unregistering its subscribers and their indexes.
    /// Returns false if the group did not exist.
    pub fn remove_group(&mut self, world: &mut World, group: &str) -> bool {
        let Some(systems) = self.groups.remove(group) else {
            return false;
        };
        for entry in &systems {
            world.unregister_subscriber(entry.subscriber);
        }
        debug!(group, systems = systems.len(), "group removed");
        true
    }

    /// Returns the subscriber ids in a group, in run order.
    #[must_use]
    pub fn subscribers(&self, group: &str) -> Vec<SubscriberId> {
        self.groups
            .get(group)
            .map(|systems| systems.iter().map(|entry| entry.subscriber).collect())
            .unwrap_or_default()
    }

    /// Returns the number of systems in a group.
    #[must_use]
    pub fn system_count(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut groups: Vec<_> = self
            .groups
            .iter()
            .map(|(name, systems)| (name.clone(), systems.len()))
            .collect();
        groups.sort();
        f.debug_struct("Scheduler").field("groups", &groups).finish()
    }
}
