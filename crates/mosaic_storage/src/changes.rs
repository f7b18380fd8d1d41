//! Per-subscriber change feeds.
//!
//! Every mutation that touches a watched component type appends one
//! [`ChangeRecord`] to the pending buffer of each subscriber watching that
//! type. A buffer is handed out whole and emptied by [`ChangeLog::drain`],
//! so each record is delivered to each subscriber at most once.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use mosaic_foundation::{ComponentId, EntityId, OrderedMap, Tick, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies a change subscriber (typically one system).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// What kind of mutation a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOp {
    /// Component attached.
    Added,
    /// Component detached.
    Removed,
    /// Plain property written.
    Changed,
    /// Single link (or one object key) set or cleared.
    LinkSet,
    /// Member inserted into a link set.
    LinkAdded,
    /// Member removed from a link set.
    LinkRemoved,
}

/// One mutation, as seen by a subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// The component that changed.
    pub component: ComponentId,
    /// Its owning entity.
    pub entity: EntityId,
    /// Its type.
    pub component_type: Arc<str>,
    /// What happened.
    pub op: ChangeOp,
    /// The property path written, for property and link operations.
    pub property: Option<Arc<str>>,
    /// Value after the write (null for removals and cleared links).
    pub new_value: Value,
    /// Value before the write (null when there was none).
    pub old_value: Value,
    /// The tick the mutation happened in.
    pub tick: Tick,
}

#[derive(Debug, Default)]
struct Subscriber {
    types: HashSet<Arc<str>>,
    pending: Vec<ChangeRecord>,
}

/// Fan-out of change records to subscribers.
#[derive(Debug)]
pub struct ChangeLog {
    enabled: bool,
    subscribers: OrderedMap<SubscriberId, Subscriber>,
    watchers: HashMap<Arc<str>, Vec<SubscriberId>>,
    next: u64,
}

impl ChangeLog {
    /// Creates a change log. When `enabled` is false nothing is recorded.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            subscribers: OrderedMap::new(),
            watchers: HashMap::new(),
            next: 0,
        }
    }

    /// Returns true if records are being kept.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Adds a subscriber watching `types`.
    pub fn register<I>(&mut self, types: I) -> SubscriberId
    where
        I: IntoIterator<Item = Arc<str>>,
    {
        let id = SubscriberId(self.next);
        self.next += 1;
        self.subscribers.insert(id, Subscriber::default());
        for ty in types {
            self.subscribe(id, ty);
        }
        debug!(subscriber = %id, "registered change subscriber");
        id
    }

    /// Adds `component_type` to what `subscriber` watches.
    ///
    /// Returns false if the subscriber is unknown.
    pub fn subscribe(&mut self, subscriber: SubscriberId, component_type: Arc<str>) -> bool {
        let Some(entry) = self.subscribers.get_mut(&subscriber) else {
            return false;
        };
        if entry.types.insert(component_type.clone()) {
            self.watchers
                .entry(component_type)
                .or_default()
                .push(subscriber);
        }
        true
    }

    /// Drops a subscriber and its pending records.
    pub fn unregister(&mut self, subscriber: SubscriberId) {
        if let Some(entry) = self.subscribers.remove(&subscriber) {
            for ty in entry.types {
                if let Some(list) = self.watchers.get_mut(&ty) {
                    list.retain(|s| *s != subscriber);
                }
            }
        }
    }

    /// Returns true if a record for `component_type` would be kept.
    #[must_use]
    pub fn is_watched(&self, component_type: &str) -> bool {
        self.enabled
            && self
                .watchers
                .get(component_type)
                .is_some_and(|list| !list.is_empty())
    }

    /// Appends `record` to every subscriber watching its type.
    pub fn record(&mut self, record: ChangeRecord) {
        if !self.enabled {
            return;
        }
        let Some(list) = self.watchers.get(&record.component_type) else {
            return;
        };
        for subscriber in list {
            if let Some(entry) = self.subscribers.get_mut(subscriber) {
                entry.pending.push(record.clone());
            }
        }
    }

    /// Takes everything pending for `subscriber`, leaving its buffer empty.
    pub fn drain(&mut self, subscriber: SubscriberId) -> Vec<ChangeRecord> {
        self.subscribers
            .get_mut(&subscriber)
            .map(|entry| std::mem::take(&mut entry.pending))
            .unwrap_or_default()
    }

    /// Returns what is pending for `subscriber` without draining it.
    #[must_use]
    pub fn pending(&self, subscriber: SubscriberId) -> &[ChangeRecord] {
        self.subscribers
            .get(&subscriber)
            .map_or(&[][..], |entry| entry.pending.as_slice())
    }
}
