//! The world: registry, live tables, and entity and component lifecycles.
//!
//! `World` is the single owner of every entity, component, index, and
//! change buffer. Callers hold ids, never references that outlive a call.
//! Every mutation is synchronous; the only deferred work is tag-driven
//! index convergence (see `index.rs`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mosaic_foundation::{
    ComponentId, EntityId, Error, ErrorKind, IdGenerator, LtMap, OrderedMap, OrderedSet, Result,
    Tick, Value,
};
use tracing::{debug, trace, warn};

use crate::changes::{ChangeLog, ChangeOp, ChangeRecord, SubscriberId};
use crate::component::Component;
use crate::config::WorldConfig;
use crate::entity::Entity;
use crate::index::Indexer;
use crate::query::IndexKey;
use crate::reference::ReferenceIndex;
use crate::registry::{Registry, Term};
use crate::schema::{ComponentDef, ComponentType, LinkTarget};

/// The component a mutation happened on, captured before the borrow ends.
#[derive(Clone, Debug)]
pub(crate) struct Origin {
    pub(crate) component: ComponentId,
    pub(crate) entity: EntityId,
    pub(crate) component_type: Arc<str>,
}

impl Origin {
    pub(crate) fn of(component: &Component) -> Self {
        Self {
            component: component.id.clone(),
            entity: component.entity.clone(),
            component_type: component.ty.name().clone(),
        }
    }
}

/// Entity-component store with reference tracking, indexed queries, and
/// change feeds.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) registry: Registry,
    pub(crate) entities: OrderedMap<EntityId, Entity>,
    pub(crate) components: HashMap<ComponentId, Component>,
    pub(crate) refs: ReferenceIndex,
    /// Entities per component type or tag, in the order they joined.
    pub(crate) buckets: HashMap<Arc<str>, OrderedSet<EntityId>>,
    pub(crate) indexer: Indexer,
    pub(crate) changes: ChangeLog,
    ids: IdGenerator,
    tick: Tick,
}

impl World {
    /// Creates an empty world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates an empty world.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        debug!(
            track_changes = config.track_changes,
            entity_pool = config.entity_pool,
            "created world"
        );
        Self {
            registry: Registry::new(),
            entities: OrderedMap::with_capacity(config.entity_pool),
            components: HashMap::with_capacity(config.entity_pool),
            refs: ReferenceIndex::default(),
            buckets: HashMap::new(),
            indexer: Indexer::default(),
            changes: ChangeLog::new(config.track_changes),
            ids: IdGenerator::new(config.id_prefix.clone()),
            tick: 0,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the current tick.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Advances the tick by one and converges indexes on pending tag
    /// changes. Returns the new tick.
    pub fn tick(&mut self) -> Tick {
        self.tick += 1;
        self.converge_indexes();
        trace!(tick = self.tick, "advanced tick");
        self.tick
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns the number of live components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Iterates live entity ids in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    // --- Registration ---

    /// Compiles and registers a component type.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the name is already a type or tag, or the
    /// definition does not compile.
    pub fn register_component(
        &mut self,
        name: impl Into<Arc<str>>,
        def: ComponentDef,
    ) -> Result<Arc<ComponentType>> {
        self.registry.register_component(name, def)
    }

    /// Adds names to the tag vocabulary.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a name is already a component type.
    pub fn register_tags<I, S>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.registry.register_tags(tags)
    }

    // --- Lookup ---

    /// Returns the live entity with this id (or handle).
    #[must_use]
    pub fn get_entity(&self, id: impl AsRef<str>) -> Option<&Entity> {
        self.entities.get(id.as_ref())
    }

    /// Returns the live component with this id.
    #[must_use]
    pub fn component(&self, id: impl AsRef<str>) -> Option<&Component> {
        self.components.get(id.as_ref())
    }

    /// Returns the component of `component_type` on `entity` (the earliest
    /// filed one for many types).
    #[must_use]
    pub fn component_of(&self, entity: impl AsRef<str>, component_type: &str) -> Option<&Component> {
        let id = self.get_entity(entity)?.component(component_type)?;
        self.components.get(id)
    }

    /// Returns every component of `component_type` on `entity`.
    #[must_use]
    pub fn components_of(&self, entity: impl AsRef<str>, component_type: &str) -> Vec<&Component> {
        self.get_entity(entity)
            .map(|e| {
                e.components(component_type)
                    .into_iter()
                    .filter_map(|id| self.components.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn component_or_err(&self, id: &str) -> Result<&Component> {
        self.components
            .get(id)
            .ok_or_else(|| Error::component_not_found(id))
    }

    // --- Entity lifecycle ---

    /// Creates an empty entity. A requested id must be free.
    ///
    /// # Errors
    ///
    /// Returns a duplicate entity error if the requested id is live.
    pub fn spawn(&mut self, id: Option<&str>) -> Result<EntityId> {
        let id = self.claim_entity_id(id)?;
        self.insert_entity(id.clone());
        Ok(id)
    }

    pub(crate) fn claim_entity_id(&mut self, requested: Option<&str>) -> Result<EntityId> {
        match requested {
            Some(id) if self.entities.contains_key(id) => {
                Err(Error::new(ErrorKind::DuplicateEntity(EntityId::from(id))))
            }
            Some(id) => Ok(EntityId::from(id)),
            None => loop {
                let id = self.ids.next_id();
                if !self.entities.contains_key(id.as_ref()) {
                    break Ok(EntityId::from(id));
                }
            },
        }
    }

    pub(crate) fn insert_entity(&mut self, id: EntityId) {
        self.entities
            .insert(id.clone(), Entity::new(id.clone(), self.tick));
        trace!(entity = %id, "created entity");
        self.reindex_created(&id);
    }

    /// Destroys an entity: its components' destroy hooks run, components
    /// detach, links to the entity and its components are cleared, and the
    /// id leaves every index. Returns false if it was not live.
    pub fn remove_entity(&mut self, id: impl AsRef<str>) -> bool {
        let id = id.as_ref();
        let Some(entity) = self.entities.get(id) else {
            return false;
        };
        let owned: Vec<ComponentId> = entity.component_ids().cloned().collect();
        for component in owned {
            self.remove_component(&component);
        }
        let target: Arc<str> = Arc::from(id);
        self.scrub(LinkTarget::Entity, &target);
        let Some(entity) = self.entities.remove(id) else {
            return false;
        };
        for tag in entity.tags() {
            self.leave_bucket(tag, &entity.id);
        }
        self.indexer.forget(&entity.id);
        trace!(entity = %entity.id, "removed entity");
        true
    }

    // --- Component lifecycle ---

    /// Attaches a component of `component_type` to `entity`.
    ///
    /// `props` is a record of property overrides. The reserved `id` key
    /// requests a component id and `key` sets the alias it is filed under.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the entity is not live, a schema error for
    /// an unknown type or property, or a cardinality error if a non-many
    /// type is already present.
    pub fn add_component(
        &mut self,
        entity: impl AsRef<str>,
        component_type: &str,
        props: impl Into<Value>,
    ) -> Result<ComponentId> {
        let entity = self
            .entities
            .get(entity.as_ref())
            .map(|e| e.id.clone())
            .ok_or_else(|| Error::entity_not_found(entity.as_ref()))?;
        let ty = self.registry.require_type(component_type)?.clone();
        if !ty.is_many() && self.entities.get(entity.as_str()).is_some_and(|e| e.has_component(component_type)) {
            return Err(Error::cardinality(entity, component_type));
        }
        let props = match props.into() {
            Value::Null => LtMap::new(),
            Value::Record(props) => props,
            other => return Err(Error::invalid_value("record of properties", other.kind_name())),
        };
        let component = self.build_component(&entity, ty, &props, None, &HashSet::new())?;
        Ok(self.install(component))
    }

    /// Builds a component ready to install: defaults, overrides, then the
    /// init hook. Nothing in the world changes.
    ///
    /// `claimed` holds ids already promised to other components being built
    /// alongside this one.
    pub(crate) fn build_component(
        &mut self,
        entity: &EntityId,
        ty: Arc<ComponentType>,
        props: &LtMap<Arc<str>, Value>,
        alias: Option<Arc<str>>,
        claimed: &HashSet<ComponentId>,
    ) -> Result<Component> {
        let requested = match props.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => return Err(Error::invalid_value("component id string", other.kind_name())),
        };
        let alias = match props.get("key") {
            Some(Value::String(key)) => Some(key.clone()),
            _ => alias,
        };
        let overrides = props.remove("id").remove("key").remove("type");

        let id = self.claim_component_id(requested, claimed);
        let mut component = Component::new(id, entity.clone(), ty.clone(), alias, self.tick);
        component.apply_overrides(&overrides).map_err(|err| {
            let context = mosaic_foundation::ErrorContext::new()
                .with_entity(entity.clone())
                .with_component_type(ty.name().as_ref());
            err.with_context(context)
        })?;
        if let Some(hook) = ty.init_hook() {
            hook(&mut component);
        }
        Ok(component)
    }

    fn claim_component_id(
        &mut self,
        requested: Option<Arc<str>>,
        claimed: &HashSet<ComponentId>,
    ) -> ComponentId {
        let taken = |world: &Self, id: &str| world.components.contains_key(id) || claimed.contains(id);
        if let Some(id) = requested {
            if !taken(self, id.as_ref()) {
                return ComponentId::from(id);
            }
            warn!(requested = %id, "component id is taken, generating a fresh one");
        }
        loop {
            let id = self.ids.next_id();
            if !taken(self, id.as_ref()) {
                return ComponentId::from(id);
            }
        }
    }

    /// Files a built component on its entity and registers its links.
    ///
    /// A many-type instance already filed under the same key is removed
    /// first through the normal removal path.
    pub(crate) fn install(&mut self, component: Component) -> ComponentId {
        let id = component.id.clone();
        let entity_id = component.entity.clone();
        let ty = component.ty.clone();
        let key = component.key();
        let alias = component.alias.clone();

        if ty.is_many() {
            let displaced = self
                .entities
                .get(entity_id.as_str())
                .and_then(|e| e.keyed(ty.name(), &key))
                .cloned();
            if let Some(displaced) = displaced {
                debug!(component = %displaced, key = %key, "replacing keyed component");
                self.remove_component(&displaced);
            }
        }

        self.components.insert(id.clone(), component);
        if let Some(entity) = self.entities.get_mut(entity_id.as_str()) {
            entity.attach(ty.name(), ty.is_many(), key, id.clone());
            if let Some(alias) = alias {
                entity.aliases.insert(alias, id.clone());
            }
            entity.components_changed = self.tick;
        }
        self.join_bucket(ty.name(), &entity_id);
        self.register_links(&id);

        let origin = Origin {
            component: id.clone(),
            entity: entity_id.clone(),
            component_type: ty.name().clone(),
        };
        self.emit(&origin, ChangeOp::Added, None, Value::Null, Value::Null);
        trace!(component = %id, entity = %entity_id, component_type = %ty.name(), "attached component");
        self.reindex_term(&entity_id, &Term::Component(ty.name().clone()));
        id
    }

    /// Detaches and destroys a component. The destroy hook runs first, then
    /// links held by and pointing at the component are released. Returns
    /// false if it was not live.
    pub fn remove_component(&mut self, id: impl AsRef<str>) -> bool {
        let id = id.as_ref();
        let Some(component) = self.components.get_mut(id) else {
            return false;
        };
        let key = component.key();
        if let Some(hook) = component.ty.destroy_hook().cloned() {
            hook(component);
        }
        let origin = Origin::of(component);

        if let Some(entity) = self.entities.get_mut(origin.entity.as_str()) {
            entity.detach(&origin.component_type, &key, &origin.component);
            entity.aliases.retain(|_, aliased| *aliased != origin.component);
            entity.components_changed = self.tick;
            if !entity.has_component(&origin.component_type) {
                let bucket = origin.component_type.clone();
                self.leave_bucket(&bucket, &origin.entity);
            }
        }

        let Some(component) = self.components.remove(id) else {
            return false;
        };
        self.release_links(&component);
        self.scrub(LinkTarget::Component, component.id.as_arc());
        self.emit(&origin, ChangeOp::Removed, None, Value::Null, Value::Null);
        trace!(component = %origin.component, entity = %origin.entity, "removed component");
        self.reindex_term(&origin.entity, &Term::Component(origin.component_type.clone()));
        true
    }

    /// Removes every component of `component_type` from `entity`. Returns
    /// how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the type is not registered.
    pub fn remove_component_by_type(
        &mut self,
        entity: impl AsRef<str>,
        component_type: &str,
    ) -> Result<usize> {
        self.registry.require_type(component_type)?;
        let owned: Vec<ComponentId> = self
            .get_entity(entity)
            .map(|e| e.components(component_type).into_iter().cloned().collect())
            .unwrap_or_default();
        Ok(owned
            .iter()
            .filter(|id| self.remove_component(id))
            .count())
    }

    // --- Tags ---

    /// Adds a tag. Returns false if the entity already carried it.
    ///
    /// Maintained indexes see the change at the next tick or
    /// [`update_indexes`](Self::update_indexes).
    ///
    /// # Errors
    ///
    /// Returns a schema error for an unregistered tag or a lookup error if
    /// the entity is not live.
    pub fn add_tag(&mut self, entity: impl AsRef<str>, tag: &str) -> Result<bool> {
        let tag = self.registry.require_tag(tag)?;
        let entity = entity.as_ref();
        let Some(e) = self.entities.get_mut(entity) else {
            return Err(Error::entity_not_found(entity));
        };
        if !e.tags.insert(tag.clone()) {
            return Ok(false);
        }
        let id = e.id.clone();
        self.join_bucket(&tag, &id);
        self.reindex_tag(&id, &tag);
        Ok(true)
    }

    /// Removes a tag. Returns false if the entity is not live or did not
    /// carry it.
    ///
    /// # Errors
    ///
    /// Returns a schema error for an unregistered tag.
    pub fn remove_tag(&mut self, entity: impl AsRef<str>, tag: &str) -> Result<bool> {
        let tag = self.registry.require_tag(tag)?;
        let Some(e) = self.entities.get_mut(entity.as_ref()) else {
            return Ok(false);
        };
        if !e.tags.remove(tag.as_ref()) {
            return Ok(false);
        }
        let id = e.id.clone();
        self.leave_bucket(&tag, &id);
        self.reindex_tag(&id, &tag);
        Ok(true)
    }

    fn join_bucket(&mut self, name: &Arc<str>, entity: &EntityId) {
        self.buckets
            .entry(name.clone())
            .or_default()
            .insert(entity.clone());
    }

    fn leave_bucket(&mut self, name: &Arc<str>, entity: &EntityId) {
        if let Some(bucket) = self.buckets.get_mut(name) {
            bucket.remove(entity);
        }
    }

    // --- Change feeds ---

    /// Registers a change subscriber watching `component_types`.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a type is not registered.
    pub fn register_subscriber<I, S>(&mut self, component_types: I) -> Result<SubscriberId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = component_types
            .into_iter()
            .map(|name| Ok(self.registry.require_type(name.as_ref())?.name().clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.changes.register(types))
    }

    /// Adds a watched type to a subscriber. Returns false if the subscriber
    /// is unknown.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the type is not registered.
    pub fn subscribe(&mut self, subscriber: SubscriberId, component_type: &str) -> Result<bool> {
        let name = self.registry.require_type(component_type)?.name().clone();
        Ok(self.changes.subscribe(subscriber, name))
    }

    /// Drops a subscriber, its pending records, and the index bound to it.
    pub fn unregister_subscriber(&mut self, subscriber: SubscriberId) {
        self.changes.unregister(subscriber);
        self.indexer.unregister(&IndexKey::Subscriber(subscriber));
    }

    /// Takes the subscriber's pending records. Each record is handed out
    /// once.
    pub fn drain_changes(&mut self, subscriber: SubscriberId) -> Vec<ChangeRecord> {
        self.changes.drain(subscriber)
    }

    /// Returns the subscriber's pending records without taking them.
    #[must_use]
    pub fn pending_changes(&self, subscriber: SubscriberId) -> &[ChangeRecord] {
        self.changes.pending(subscriber)
    }

    /// Stamps a property change on the component and its entity.
    pub(crate) fn touch_values(&mut self, origin: &Origin) {
        if let Some(component) = self.components.get_mut(&origin.component) {
            component.updated = self.tick;
        }
        if let Some(entity) = self.entities.get_mut(origin.entity.as_str()) {
            entity.values_changed = self.tick;
        }
    }

    /// Records a change for every subscriber watching the origin's type.
    pub(crate) fn emit(
        &mut self,
        origin: &Origin,
        op: ChangeOp,
        property: Option<Arc<str>>,
        new_value: Value,
        old_value: Value,
    ) {
        if !self.changes.is_watched(&origin.component_type) {
            return;
        }
        self.changes.record(ChangeRecord {
            component: origin.component.clone(),
            entity: origin.entity.clone(),
            component_type: origin.component_type.clone(),
            op,
            property,
            new_value,
            old_value,
            tick: self.tick,
        });
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("entities", &self.entities.len())
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}
