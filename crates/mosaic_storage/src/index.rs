//! Maintained query indexes.
//!
//! Each index keeps the result set of one compiled filter. Listeners route
//! a mutation to exactly the indexes whose filter mentions the changed
//! type or tag, or the reverse-link target; only those are re-evaluated for
//! the affected entity.
//!
//! Component and link changes refresh synchronously. Tag changes mark the
//! entity stale; stale entities converge on [`World::tick`] or
//! [`World::update_indexes`].

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_foundation::{EntityId, OrderedSet};
use tracing::{debug, trace};

use crate::query::{Filter, IndexKey};
use crate::registry::Term;
use crate::schema::LinkTarget;
use crate::world::{Origin, World};

#[derive(Debug)]
struct Maintained {
    filter: Arc<Filter>,
    results: OrderedSet<EntityId>,
}

/// Maintained result sets and the listeners that feed them.
#[derive(Debug, Default)]
pub(crate) struct Indexer {
    indexes: HashMap<IndexKey, Maintained>,
    by_term: HashMap<Term, Vec<IndexKey>>,
    by_reverse: HashMap<(Arc<str>, Arc<str>), Vec<IndexKey>>,
    unconstrained: Vec<IndexKey>,
    stale: OrderedSet<EntityId>,
}

impl Indexer {
    /// Installs an index with its initial results, replacing any index
    /// under the same key.
    pub(crate) fn register(&mut self, key: IndexKey, filter: Arc<Filter>, initial: Vec<EntityId>) {
        self.unregister(&key);
        for term in filter.terms() {
            self.by_term.entry(term.clone()).or_default().push(key.clone());
        }
        if let Some(reverse) = &filter.reverse {
            self.by_reverse
                .entry((reverse.entity.clone(), reverse.component_type.clone()))
                .or_default()
                .push(key.clone());
        }
        if filter.is_unconstrained() {
            self.unconstrained.push(key.clone());
        }
        debug!(index = %key, size = initial.len(), "registered query index");
        self.indexes.insert(
            key,
            Maintained {
                filter,
                results: initial.into_iter().collect(),
            },
        );
    }

    /// Drops an index and its listeners. Returns true if it existed.
    pub(crate) fn unregister(&mut self, key: &IndexKey) -> bool {
        let Some(index) = self.indexes.remove(key) else {
            return false;
        };
        for term in index.filter.terms() {
            if let Some(keys) = self.by_term.get_mut(term) {
                keys.retain(|k| k != key);
            }
        }
        if let Some(reverse) = &index.filter.reverse {
            let listener = (reverse.entity.clone(), reverse.component_type.clone());
            if let Some(keys) = self.by_reverse.get_mut(&listener) {
                keys.retain(|k| k != key);
            }
        }
        self.unconstrained.retain(|k| k != key);
        debug!(index = %key, "removed query index");
        true
    }

    pub(crate) fn results(&self, key: &IndexKey) -> Option<&OrderedSet<EntityId>> {
        self.indexes.get(key).map(|index| &index.results)
    }

    /// Returns the results under `key` if they were built from `filter`.
    pub(crate) fn results_for(&self, key: &IndexKey, filter: &Arc<Filter>) -> Option<&OrderedSet<EntityId>> {
        self.indexes
            .get(key)
            .filter(|index| Arc::ptr_eq(&index.filter, filter) || *index.filter == **filter)
            .map(|index| &index.results)
    }

    fn term_listeners(&self, term: &Term) -> Vec<IndexKey> {
        self.by_term.get(term).cloned().unwrap_or_default()
    }

    fn reverse_listeners(&self, target: &Arc<str>, component_type: &Arc<str>) -> Vec<IndexKey> {
        self.by_reverse
            .get(&(target.clone(), component_type.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn all_keys(&self) -> Vec<IndexKey> {
        self.indexes.keys().cloned().collect()
    }

    fn mark_stale(&mut self, entity: EntityId) {
        self.stale.insert(entity);
    }

    fn take_stale(&mut self) -> Vec<EntityId> {
        let stale = self.stale.iter().cloned().collect();
        self.stale.clear();
        stale
    }

    /// Re-evaluates `entity` against the indexes under `keys`.
    fn refresh(&mut self, world: &World, entity: &EntityId, keys: &[IndexKey]) {
        let live = world.entities.get(entity.as_str());
        for key in keys {
            let Some(index) = self.indexes.get_mut(key) else {
                continue;
            };
            let member = live.is_some_and(|e| index.filter.matches(world, e));
            if member {
                if index.results.insert(entity.clone()) {
                    trace!(index = %key, entity = %entity, "entered index");
                }
            } else if index.results.remove(entity) {
                trace!(index = %key, entity = %entity, "left index");
            }
        }
    }

    /// Drops a destroyed entity from every result set.
    pub(crate) fn forget(&mut self, entity: &EntityId) {
        for index in self.indexes.values_mut() {
            index.results.remove(entity);
        }
        self.stale.remove(entity);
    }
}

impl World {
    /// Brings every maintained index up to date for `entity`, including
    /// pending tag changes.
    pub fn update_indexes(&mut self, entity: impl AsRef<str>) {
        let entity = EntityId::from(entity.as_ref());
        self.indexer.stale.remove(&entity);
        let keys = self.indexer.all_keys();
        self.refresh_indexes(&entity, &keys);
    }

    /// Refreshes every stale entity.
    pub(crate) fn converge_indexes(&mut self) {
        for entity in self.indexer.take_stale() {
            let keys = self.indexer.all_keys();
            self.refresh_indexes(&entity, &keys);
        }
    }

    /// A component of type `term` was attached to or detached from `entity`.
    pub(crate) fn reindex_term(&mut self, entity: &EntityId, term: &Term) {
        let keys = self.indexer.term_listeners(term);
        self.refresh_indexes(entity, &keys);
    }

    /// A tag changed on `entity`; membership converges later.
    pub(crate) fn reindex_tag(&mut self, entity: &EntityId, tag: &Arc<str>) {
        if !self.indexer.term_listeners(&Term::Tag(tag.clone())).is_empty() {
            self.indexer.mark_stale(entity.clone());
        }
    }

    /// A link held by `origin` started or stopped pointing at `target`.
    pub(crate) fn reindex_link(&mut self, origin: &Origin, target: &Arc<str>) {
        let keys = self.indexer.reverse_listeners(target, &origin.component_type);
        self.refresh_indexes(&origin.entity, &keys);
    }

    /// A new entity exists; indexes matching the empty entity pick it up,
    /// and reverse indexes targeting its id pick up links written before it
    /// existed.
    pub(crate) fn reindex_created(&mut self, entity: &EntityId) {
        let keys = self.indexer.unconstrained.clone();
        self.refresh_indexes(entity, &keys);

        let target = entity.as_arc();
        let waiting: Vec<(Arc<str>, Vec<IndexKey>)> = self
            .indexer
            .by_reverse
            .iter()
            .filter(|((id, _), keys)| id == target && !keys.is_empty())
            .map(|((_, component_type), keys)| (component_type.clone(), keys.clone()))
            .collect();
        for (component_type, keys) in waiting {
            let owners: OrderedSet<EntityId> = self
                .refs
                .holders(LinkTarget::Entity, target)
                .into_iter()
                .filter_map(|holder| self.components.get(&holder.component))
                .filter(|c| c.type_name() == &component_type)
                .map(|c| c.entity.clone())
                .collect();
            for owner in owners.iter() {
                self.refresh_indexes(owner, &keys);
            }
        }
    }

    fn refresh_indexes(&mut self, entity: &EntityId, keys: &[IndexKey]) {
        if keys.is_empty() {
            return;
        }
        let mut indexer = std::mem::take(&mut self.indexer);
        indexer.refresh(self, entity, keys);
        self.indexer = indexer;
    }
}
