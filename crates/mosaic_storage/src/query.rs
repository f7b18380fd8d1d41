//! Query specifications, compiled filters, and on-demand evaluation.
//!
//! A [`QuerySpec`] names component types and tags; [`World::create_query`]
//! compiles it against the registry into a [`Query`]. Unindexed queries are
//! evaluated per call from the smallest candidate set the filter allows.
//! Indexed queries are maintained by the indexer (see `index.rs`) and
//! execute by reading their result set.

use std::fmt;
use std::sync::Arc;

use mosaic_foundation::{EntityId, OrderedSet, Result, Tick};

use crate::changes::SubscriberId;
use crate::entity::Entity;
use crate::registry::{Registry, Term};
use crate::schema::LinkTarget;
use crate::world::World;

/// Names a maintained index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// Index registered under a caller-chosen name.
    Named(Arc<str>),
    /// Index bound to a subscriber (usually the system that owns it).
    Subscriber(SubscriberId),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Subscriber(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(name: &str) -> Self {
        Self::Named(name.into())
    }
}

impl From<String> for IndexKey {
    fn from(name: String) -> Self {
        Self::Named(name.into())
    }
}

impl From<SubscriberId> for IndexKey {
    fn from(id: SubscriberId) -> Self {
        Self::Subscriber(id)
    }
}

/// Uncompiled query: which entities to select, and whether to maintain
/// the result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySpec {
    all: Vec<Arc<str>>,
    any: Vec<Arc<str>>,
    not: Vec<Arc<str>>,
    from: Option<Vec<Arc<str>>>,
    reverse: Option<(Arc<str>, Arc<str>)>,
    index: Option<IndexKey>,
}

impl QuerySpec {
    /// Creates a spec matching every entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every named type or tag.
    #[must_use]
    pub fn from_all<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.all.extend(names.into_iter().map(Into::into));
        self
    }

    /// Requires at least one of the named types or tags.
    #[must_use]
    pub fn from_any<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.any.extend(names.into_iter().map(Into::into));
        self
    }

    /// Excludes entities holding any of the named types or tags.
    #[must_use]
    pub fn not<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.not.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restricts candidates to the given entities (handles or ids).
    #[must_use]
    pub fn from<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.from
            .get_or_insert_with(Vec::new)
            .extend(entities.into_iter().map(|e| Arc::from(e.as_ref())));
        self
    }

    /// Selects entities owning a `component_type` component that links to
    /// `entity`.
    #[must_use]
    pub fn reverse(mut self, entity: impl AsRef<str>, component_type: impl Into<Arc<str>>) -> Self {
        self.reverse = Some((Arc::from(entity.as_ref()), component_type.into()));
        self
    }

    /// Maintains the result set under `key`.
    #[must_use]
    pub fn index(mut self, key: impl Into<IndexKey>) -> Self {
        self.index = Some(key.into());
        self
    }
}

/// The reverse-link constraint of a filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Reverse {
    pub(crate) entity: Arc<str>,
    pub(crate) component_type: Arc<str>,
}

/// A spec compiled against the registry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Filter {
    pub(crate) all: Vec<Term>,
    pub(crate) any: Vec<Term>,
    pub(crate) not: Vec<Term>,
    pub(crate) from: Option<OrderedSet<Arc<str>>>,
    pub(crate) reverse: Option<Reverse>,
}

impl Filter {
    pub(crate) fn compile(spec: &QuerySpec, registry: &Registry) -> Result<Self> {
        let terms = |names: &[Arc<str>]| -> Result<Vec<Term>> {
            names.iter().map(|name| registry.term(name)).collect()
        };
        let reverse = match &spec.reverse {
            Some((entity, component_type)) => Some(Reverse {
                entity: entity.clone(),
                component_type: registry.require_type(component_type)?.name().clone(),
            }),
            None => None,
        };
        Ok(Self {
            all: terms(&spec.all)?,
            any: terms(&spec.any)?,
            not: terms(&spec.not)?,
            from: spec.from.as_ref().map(|ids| ids.iter().cloned().collect()),
            reverse,
        })
    }

    /// Terms whose presence changes can flip membership.
    pub(crate) fn terms(&self) -> impl Iterator<Item = &Term> {
        self.all.iter().chain(&self.any).chain(&self.not)
    }

    /// True if an entity holding nothing can match.
    pub(crate) fn is_unconstrained(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.reverse.is_none()
    }

    pub(crate) fn matches(&self, world: &World, entity: &Entity) -> bool {
        let holds = |term: &Term| match term {
            Term::Component(name) => entity.has_component(name),
            Term::Tag(name) => entity.has_tag(name),
        };
        if let Some(from) = &self.from {
            if !from.contains(entity.id.as_str()) {
                return false;
            }
        }
        if !self.all.iter().all(holds) {
            return false;
        }
        if !self.any.is_empty() && !self.any.iter().any(holds) {
            return false;
        }
        if self.not.iter().any(holds) {
            return false;
        }
        match &self.reverse {
            Some(reverse) => world.refers_to(&entity.id, &reverse.component_type, &reverse.entity),
            None => true,
        }
    }
}

/// A compiled query.
#[derive(Clone, Debug)]
pub struct Query {
    pub(crate) filter: Arc<Filter>,
    pub(crate) index: Option<IndexKey>,
}

impl Query {
    /// Returns the index key, if the result set is maintained.
    #[must_use]
    pub fn index_key(&self) -> Option<&IndexKey> {
        self.index.as_ref()
    }

    /// Runs the query.
    #[must_use]
    pub fn execute(&self, world: &World) -> QueryResult {
        world.execute(self, &ExecuteOptions::default())
    }

    /// Runs the query with change-recency filters.
    #[must_use]
    pub fn execute_with(&self, world: &World, options: &ExecuteOptions) -> QueryResult {
        world.execute(self, options)
    }
}

/// Change-recency filters applied at execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Keep entities whose components were attached or detached at or
    /// after this tick.
    pub updated_components: Option<Tick>,
    /// Keep entities with a property change at or after this tick.
    pub updated_values: Option<Tick>,
}

impl ExecuteOptions {
    /// No filtering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the structural-change threshold.
    #[must_use]
    pub fn updated_components(mut self, tick: Tick) -> Self {
        self.updated_components = Some(tick);
        self
    }

    /// Sets the property-change threshold.
    #[must_use]
    pub fn updated_values(mut self, tick: Tick) -> Self {
        self.updated_values = Some(tick);
        self
    }

    pub(crate) fn accepts(&self, entity: &Entity) -> bool {
        self.updated_components
            .is_none_or(|tick| entity.components_changed >= tick)
            && self
                .updated_values
                .is_none_or(|tick| entity.values_changed >= tick)
    }
}

/// Duplicate-free entity ids in membership order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult(Vec<EntityId>);

impl QueryResult {
    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `entity` (handle or id) matched.
    #[must_use]
    pub fn contains(&self, entity: impl AsRef<str>) -> bool {
        let entity = entity.as_ref();
        self.0.iter().any(|id| id.as_str() == entity)
    }

    /// Iterates matched ids.
    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.0.iter()
    }

    /// Returns the first matched id.
    #[must_use]
    pub fn first(&self) -> Option<&EntityId> {
        self.0.first()
    }

    /// Returns the ids as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.0
    }
}

impl IntoIterator for QueryResult {
    type Item = EntityId;
    type IntoIter = std::vec::IntoIter<EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a EntityId;
    type IntoIter = std::slice::Iter<'a, EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<EntityId> for QueryResult {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl World {
    /// Compiles `spec`. If it names an index, the result set is built now
    /// and maintained from then on; an existing index under the same key is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a name is neither a component type nor a
    /// tag, or the reverse type is not a component type.
    pub fn create_query(&mut self, spec: QuerySpec) -> Result<Query> {
        let filter = Arc::new(Filter::compile(&spec, &self.registry)?);
        if let Some(key) = &spec.index {
            let initial = self.evaluate(&filter);
            self.indexer.register(key.clone(), filter.clone(), initial);
        }
        Ok(Query {
            filter,
            index: spec.index,
        })
    }

    /// Runs `query` with `options`.
    #[must_use]
    pub fn execute(&self, query: &Query, options: &ExecuteOptions) -> QueryResult {
        if let Some(results) = query
            .index
            .as_ref()
            .and_then(|key| self.indexer.results_for(key, &query.filter))
        {
            return results
                .iter()
                .filter(|id| {
                    self.entities
                        .get(id.as_str())
                        .is_some_and(|e| options.accepts(e))
                })
                .cloned()
                .collect();
        }
        self.evaluate(&query.filter)
            .into_iter()
            .filter(|id| {
                self.entities
                    .get(id.as_str())
                    .is_some_and(|e| options.accepts(e))
            })
            .collect()
    }

    /// Returns the maintained result set stored under `key`.
    #[must_use]
    pub fn query_index(&self, key: impl Into<IndexKey>) -> Option<QueryResult> {
        self.indexer
            .results(&key.into())
            .map(|results| results.iter().cloned().collect())
    }

    /// Stops maintaining the index under `key`. Returns true if it existed.
    pub fn remove_index(&mut self, key: impl Into<IndexKey>) -> bool {
        self.indexer.unregister(&key.into())
    }

    /// Returns the entities holding a component type or carrying a tag.
    ///
    /// # Errors
    ///
    /// Returns a schema error if `name` is neither.
    pub fn entities_with(&self, name: &str) -> Result<QueryResult> {
        let term = self.registry.term(name)?;
        Ok(self
            .buckets
            .get(term.name())
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// True if `entity` owns a `component_type` component linking to
    /// `target`, and `target` is live.
    pub(crate) fn refers_to(&self, entity: &EntityId, component_type: &str, target: &Arc<str>) -> bool {
        self.is_live(LinkTarget::Entity, target)
            && self
                .refs
            .holders(LinkTarget::Entity, target)
                .into_iter()
                .any(|holder| {
                    self.components.get(&holder.component).is_some_and(|c| {
                        &c.entity == entity && c.type_name().as_ref() == component_type
                    })
                })
    }

    /// Evaluates `filter` from scratch, starting from the smallest candidate
    /// set it allows.
    pub(crate) fn evaluate(&self, filter: &Filter) -> Vec<EntityId> {
        let candidates: Vec<EntityId> = if let Some(from) = &filter.from {
            from.iter().map(|id| EntityId::from(id.clone())).collect()
        } else if let Some(reverse) = &filter.reverse {
            if !self.is_live(LinkTarget::Entity, &reverse.entity) {
                return Vec::new();
            }
            let owners: OrderedSet<EntityId> = self
                .refs
                .holders(LinkTarget::Entity, &reverse.entity)
                .into_iter()
                .filter_map(|holder| self.components.get(&holder.component))
                .filter(|c| c.type_name() == &reverse.component_type)
                .map(|c| c.entity.clone())
                .collect();
            owners.iter().cloned().collect()
        } else if !filter.all.is_empty() {
            let smallest = filter
                .all
                .iter()
                .map(|term| self.buckets.get(term.name()))
                .min_by_key(|bucket| bucket.map_or(0, OrderedSet::len));
            match smallest.flatten() {
                Some(bucket) => bucket.iter().cloned().collect(),
                None => Vec::new(),
            }
        } else if !filter.any.is_empty() {
            let union: OrderedSet<EntityId> = filter
                .any
                .iter()
                .filter_map(|term| self.buckets.get(term.name()))
                .flat_map(|bucket| bucket.iter().cloned())
                .collect();
            union.iter().cloned().collect()
        } else {
            self.entities.keys().cloned().collect()
        };

        candidates
            .into_iter()
            .filter(|id| {
                self.entities
                    .get(id.as_str())
                    .is_some_and(|entity| filter.matches(self, entity))
            })
            .collect()
    }
}
