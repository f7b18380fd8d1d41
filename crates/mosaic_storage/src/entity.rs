//! Entities: identity, tags, and the components filed under each type.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_foundation::{ComponentId, EntityId, OrderedMap, OrderedSet, Tick};

/// Components of one type on one entity.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Members {
    /// The single instance of a non-many type.
    One(ComponentId),
    /// Instances of a many type, keyed by id, alias, or `map_by` value.
    Many(OrderedMap<Arc<str>, ComponentId>),
}

/// A live identity owning components and tags.
#[derive(Clone, Debug)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) tags: OrderedSet<Arc<str>>,
    pub(crate) types: OrderedMap<Arc<str>, Members>,
    pub(crate) aliases: HashMap<Arc<str>, ComponentId>,
    pub(crate) components_changed: Tick,
    pub(crate) values_changed: Tick,
}

impl Entity {
    pub(crate) fn new(id: EntityId, tick: Tick) -> Self {
        Self {
            id,
            tags: OrderedSet::new(),
            types: OrderedMap::new(),
            aliases: HashMap::new(),
            components_changed: tick,
            values_changed: tick,
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Returns true if `name` is a component type present on this entity
    /// or a tag it carries.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(name) || self.tags.contains(name)
    }

    /// Returns true if the entity carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns true if at least one component of `component_type` is attached.
    #[must_use]
    pub fn has_component(&self, component_type: &str) -> bool {
        self.types.contains_key(component_type)
    }

    /// Iterates tags in the order they were added.
    pub fn tags(&self) -> impl Iterator<Item = &Arc<str>> {
        self.tags.iter()
    }

    /// Iterates component type names in the order first attached.
    pub fn component_types(&self) -> impl Iterator<Item = &Arc<str>> {
        self.types.keys()
    }

    /// Returns the component of `component_type`.
    ///
    /// For many types this is the earliest filed instance.
    #[must_use]
    pub fn component(&self, component_type: &str) -> Option<&ComponentId> {
        match self.types.get(component_type)? {
            Members::One(id) => Some(id),
            Members::Many(keyed) => keyed.values().next(),
        }
    }

    /// Returns every component of `component_type` in filing order.
    #[must_use]
    pub fn components(&self, component_type: &str) -> Vec<&ComponentId> {
        match self.types.get(component_type) {
            Some(Members::One(id)) => vec![id],
            Some(Members::Many(keyed)) => keyed.values().collect(),
            None => Vec::new(),
        }
    }

    /// Returns the instance of a many type filed under `key`.
    #[must_use]
    pub fn keyed(&self, component_type: &str, key: &str) -> Option<&ComponentId> {
        match self.types.get(component_type)? {
            Members::Many(keyed) => keyed.get(key),
            Members::One(_) => None,
        }
    }

    /// Returns the keys a many type's instances are filed under.
    #[must_use]
    pub fn keys(&self, component_type: &str) -> Vec<&Arc<str>> {
        match self.types.get(component_type) {
            Some(Members::Many(keyed)) => keyed.keys().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the component created under the alias `key`.
    #[must_use]
    pub fn alias(&self, key: &str) -> Option<&ComponentId> {
        self.aliases.get(key)
    }

    /// Iterates every attached component id.
    pub fn component_ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.types.values().flat_map(|members| match members {
            Members::One(id) => vec![id],
            Members::Many(keyed) => keyed.values().collect(),
        })
    }

    /// Returns the last tick a component was attached or detached.
    #[must_use]
    pub fn updated_components(&self) -> Tick {
        self.components_changed
    }

    /// Returns the last tick a property of one of its components changed.
    #[must_use]
    pub fn updated_values(&self) -> Tick {
        self.values_changed
    }

    /// Files `id` under `component_type`. Returns the id it displaced, if any.
    pub(crate) fn attach(
        &mut self,
        component_type: &Arc<str>,
        many: bool,
        key: Arc<str>,
        id: ComponentId,
    ) -> Option<ComponentId> {
        if !many {
            return match self.types.insert(component_type.clone(), Members::One(id)) {
                Some(Members::One(old)) => Some(old),
                _ => None,
            };
        }
        match self.types.get_mut(component_type) {
            Some(Members::Many(keyed)) => keyed.insert(key, id),
            _ => {
                let mut keyed = OrderedMap::new();
                keyed.insert(key, id);
                self.types
                    .insert(component_type.clone(), Members::Many(keyed));
                None
            }
        }
    }

    /// Unfiles `id`. Returns true if it was filed.
    pub(crate) fn detach(&mut self, component_type: &str, key: &str, id: &ComponentId) -> bool {
        let removed = match self.types.get_mut(component_type) {
            Some(Members::One(current)) if current == id => {
                self.types.remove(component_type);
                true
            }
            Some(Members::Many(keyed)) => {
                let filed = keyed.get(key) == Some(id);
                if filed {
                    keyed.remove(key);
                    if keyed.is_empty() {
                        self.types.remove(component_type);
                    }
                }
                filed
            }
            _ => false,
        };
        if removed {
            self.aliases.retain(|_, aliased| aliased != id);
        }
        removed
    }

    /// Moves a many-type instance from `old_key` to `new_key`.
    /// Returns the id displaced at `new_key`, if any.
    pub(crate) fn rekey(
        &mut self,
        component_type: &str,
        old_key: &str,
        new_key: Arc<str>,
        id: &ComponentId,
    ) -> Option<ComponentId> {
        let Some(Members::Many(keyed)) = self.types.get_mut(component_type) else {
            return None;
        };
        if keyed.get(old_key) == Some(id) {
            keyed.remove(old_key);
        }
        keyed.insert(new_key, id.clone()).filter(|old| old != id)
    }
}
