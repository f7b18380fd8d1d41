//! Entity transfer form: building entities from definitions and exporting
//! them back.
//!
//! An [`EntityDef`] is a record of the shape
//!
//! ```text
//! { id?, tags?, <Type>: props | [props...] | {key: props}, <alias>: {type: Type, ...props} }
//! ```
//!
//! A many type takes a list of instances, or a keyed record (the key
//! becomes the `map_by` value when the type has one, the alias otherwise).
//! Within props, `id` requests a component id and `key` sets an alias.
//! A `components` entry may also list `{type, key?, ...props}` records; a
//! `key` equal to the type name files the component normally.
//!
//! Text transfer uses `serde_json`; binary transfer uses `MessagePack`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use mosaic_foundation::{
    ComponentId, EntityId, Error, LtMap, Result, Value,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::entity::Members;
use crate::schema::ComponentType;
use crate::world::World;
use crate::Component;

/// A transferable description of one entity.
#[derive(Clone, Default, PartialEq)]
pub struct EntityDef {
    id: Option<EntityId>,
    tags: Vec<Arc<str>>,
    entries: Vec<(Arc<str>, Value)>,
}

impl EntityDef {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an entity id.
    #[must_use]
    pub fn with_id(mut self, id: impl AsRef<str>) -> Self {
        self.id = Some(EntityId::from(id.as_ref()));
        self
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the entry for `name`: props of a single component, a list of
    /// instances, or a keyed record of instances.
    #[must_use]
    pub fn with(mut self, name: impl Into<Arc<str>>, props: impl Into<Value>) -> Self {
        self.put(name.into(), props.into());
        self
    }

    /// Sets a list of instances of a many type.
    #[must_use]
    pub fn with_many<I, V>(self, component_type: impl Into<Arc<str>>, instances: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(component_type, Value::list(instances))
    }

    /// Adds one keyed instance of a many type.
    #[must_use]
    pub fn with_keyed(
        mut self,
        component_type: impl Into<Arc<str>>,
        key: impl Into<Arc<str>>,
        props: impl Into<Value>,
    ) -> Self {
        let component_type = component_type.into();
        let keyed = match self.get(&component_type) {
            Some(Value::Record(existing)) => existing.insert(key.into(), props.into()),
            _ => LtMap::new().insert(key.into(), props.into()),
        };
        self.put(component_type, Value::Record(keyed));
        self
    }

    /// Adds a component filed under a custom alias.
    #[must_use]
    pub fn with_alias(
        mut self,
        alias: impl Into<Arc<str>>,
        component_type: impl Into<Arc<str>>,
        props: impl Into<Value>,
    ) -> Self {
        let props = match props.into() {
            Value::Record(map) => map,
            _ => LtMap::new(),
        };
        let entry = props.insert(Arc::from("type"), Value::String(component_type.into()));
        self.put(alias.into(), Value::Record(entry));
        self
    }

    /// Returns the requested entity id.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[Arc<str>] {
        &self.tags
    }

    /// Returns the entry stored under a type name or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.as_ref() == name)
            .map(|(_, value)| value)
    }

    /// Iterates component entries in the order they were added.
    pub fn entries(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(name, value)| (name, value))
    }

    fn put(&mut self, name: Arc<str>, value: Value) {
        match self.entries.iter_mut().find(|(entry, _)| *entry == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Renders the definition as a record.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = LtMap::new();
        if let Some(id) = &self.id {
            map = map.insert(Arc::from("id"), Value::from(id));
        }
        if !self.tags.is_empty() {
            map = map.insert(
                Arc::from("tags"),
                Value::list(self.tags.iter().cloned()),
            );
        }
        for (name, value) in &self.entries {
            map = map.insert(name.clone(), value.clone());
        }
        Value::Record(map)
    }

    /// Reads a definition from its record form.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the value is not a record, or `id` or
    /// `tags` have the wrong shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Record(map) = value else {
            return Err(Error::invalid_value("entity record", value.kind_name()));
        };
        let mut def = Self::new();
        for (name, entry) in map.iter() {
            match (name.as_ref(), entry) {
                ("id", Value::Null) => {}
                ("id", Value::String(id)) => def.id = Some(EntityId::from(id.clone())),
                ("id", other) => return Err(Error::invalid_value("entity id string", other.kind_name())),
                ("tags", Value::List(tags)) => {
                    for tag in tags {
                        match tag {
                            Value::String(tag) => def.tags.push(tag.clone()),
                            other => return Err(Error::invalid_value("tag string", other.kind_name())),
                        }
                    }
                }
                ("tags", other) => return Err(Error::invalid_value("list of tags", other.kind_name())),
                _ => def.entries.push((name.clone(), entry.clone())),
            }
        }
        Ok(def)
    }

    /// Encodes the definition as JSON text.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::serialization)
    }

    /// Decodes a definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the text is not a valid definition.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::serialization)
    }

    /// Encodes the definition as `MessagePack`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(Error::serialization)
    }

    /// Decodes a definition from `MessagePack`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the bytes are not a valid definition.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(Error::serialization)
    }
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityDef{}", self.to_value())
    }
}

impl From<EntityDef> for Value {
    fn from(def: EntityDef) -> Self {
        def.to_value()
    }
}

impl Serialize for EntityDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityDef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Definition entry holding a list of `{type, key?, ...props}` records.
const COMPONENT_LIST: &str = "components";

/// One component a definition asks for, validated but not yet built.
struct Planned {
    ty: Arc<ComponentType>,
    props: LtMap<Arc<str>, Value>,
    alias: Option<Arc<str>>,
}

impl World {
    /// Creates an entity from a definition.
    ///
    /// The whole definition is checked and every component built before the
    /// entity is inserted, so a failure leaves the world untouched.
    ///
    /// # Errors
    ///
    /// Returns a duplicate entity error if the requested id is live, a
    /// schema error for an unknown type, tag, or property, or a cardinality
    /// error if a non-many type is requested twice.
    pub fn create_entity(&mut self, def: &EntityDef) -> Result<EntityId> {
        if let Some(id) = def.id() {
            if self.entities.contains_key(id.as_str()) {
                return Err(Error::new(mosaic_foundation::ErrorKind::DuplicateEntity(
                    id.clone(),
                )));
            }
        }
        let tags = def
            .tags()
            .iter()
            .map(|tag| self.registry.require_tag(tag))
            .collect::<Result<Vec<_>>>()?;
        let plan = self.plan(def)?;

        let entity = self.claim_entity_id(def.id().map(EntityId::as_str))?;
        let mut singles: HashSet<Arc<str>> = HashSet::new();
        for planned in &plan {
            if !planned.ty.is_many() && !singles.insert(planned.ty.name().clone()) {
                return Err(Error::cardinality(entity, planned.ty.name().as_ref()));
            }
        }

        let mut claimed: HashSet<ComponentId> = HashSet::new();
        let mut built: Vec<Component> = Vec::with_capacity(plan.len());
        for planned in plan {
            let component =
                self.build_component(&entity, planned.ty, &planned.props, planned.alias, &claimed)?;
            claimed.insert(component.id.clone());
            built.push(component);
        }

        self.insert_entity(entity.clone());
        for tag in tags {
            self.add_tag(&entity, &tag)?;
        }
        for component in built {
            self.install(component);
        }
        debug!(entity = %entity, components = claimed.len(), "created entity from definition");
        Ok(entity)
    }

    fn plan(&self, def: &EntityDef) -> Result<Vec<Planned>> {
        let mut plan = Vec::new();
        for (name, value) in def.entries() {
            if let Some(ty) = self.registry.component_type(name) {
                if ty.is_many() {
                    plan_many(ty, name, value, &mut plan)?;
                } else {
                    plan.push(Planned {
                        ty: ty.clone(),
                        props: props_of(name, value)?,
                        alias: None,
                    });
                }
                continue;
            }
            if name.as_ref() == COMPONENT_LIST {
                if let Value::List(items) = value {
                    for item in items {
                        plan.push(self.plan_listed(item)?);
                    }
                    continue;
                }
            }
            match value.get("type") {
                Some(Value::String(type_name)) => {
                    let ty = self.registry.require_type(type_name)?;
                    plan.push(Planned {
                        ty: ty.clone(),
                        props: props_of(name, value)?,
                        alias: Some(name.clone()),
                    });
                }
                _ => return Err(Error::unknown_component(name.as_ref())),
            }
        }
        Ok(plan)
    }

    /// Plans one entry of the `components` list form: a record naming its
    /// `type`, optionally a `key` to file it under, and its properties.
    fn plan_listed(&self, item: &Value) -> Result<Planned> {
        let Some(Value::String(type_name)) = item.get("type") else {
            return Err(Error::invalid_value(
                format!("record with a type in {COMPONENT_LIST}"),
                item.kind_name(),
            ));
        };
        let ty = self.registry.require_type(type_name)?;
        let mut props = props_of(COMPONENT_LIST, item)?;
        if matches!(props.get("key"), Some(Value::String(key)) if key == type_name) {
            props = props.remove("key");
        }
        Ok(Planned {
            ty: ty.clone(),
            props,
            alias: None,
        })
    }

    /// Exports an entity to its transfer form.
    ///
    /// Links render as live target ids and pointers as their resolved
    /// values. Types marked to skip serialization are left out, and ignored
    /// properties are dropped.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the entity is not live.
    pub fn get_object(&self, entity: impl AsRef<str>) -> Result<EntityDef> {
        let entity = entity.as_ref();
        let e = self
            .get_entity(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        let mut def = EntityDef::new()
            .with_id(&e.id)
            .with_tags(e.tags().cloned());

        for (type_name, members) in e.types.iter() {
            let Some(ty) = self.registry.component_type(type_name) else {
                continue;
            };
            if ty.serialize_policy().skip {
                continue;
            }
            match members {
                Members::One(id) => {
                    let Some(c) = self.components.get(id) else {
                        continue;
                    };
                    let snapshot = self.snapshot(c);
                    def = match &c.alias {
                        Some(alias) => def.with_alias(alias.clone(), type_name.clone(), snapshot),
                        None => def.with(type_name.clone(), snapshot),
                    };
                }
                Members::Many(keyed) if ty.map_by().is_some() => {
                    for (key, id) in keyed.iter() {
                        let Some(c) = self.components.get(id) else {
                            continue;
                        };
                        let snapshot = self.snapshot(c);
                        def = match &c.alias {
                            Some(alias) => def.with_alias(alias.clone(), type_name.clone(), snapshot),
                            None => def.with_keyed(type_name.clone(), key.clone(), snapshot),
                        };
                    }
                }
                Members::Many(keyed) => {
                    let instances: Vec<Value> = keyed
                        .values()
                        .filter_map(|id| self.components.get(id))
                        .map(|c| match (self.snapshot(c), &c.alias) {
                            (Value::Record(map), Some(alias)) => {
                                Value::Record(map.insert(Arc::from("key"), Value::String(alias.clone())))
                            }
                            (snapshot, _) => snapshot,
                        })
                        .collect();
                    def = def.with_many(type_name.clone(), instances);
                }
            }
        }
        Ok(def)
    }

    /// Renders a component as JSON: its type, id, owning entity, and
    /// exported properties.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the component is not live, or a
    /// serialization error if encoding fails.
    pub fn stringify_component(&self, component: impl AsRef<str>) -> Result<String> {
        let c = self.component_or_err(component.as_ref())?;
        let value = match self.snapshot(c) {
            Value::Record(map) => Value::Record(
                map.insert(Arc::from("type"), Value::String(c.type_name().clone()))
                    .insert(Arc::from("entity"), Value::from(&c.entity)),
            ),
            other => other,
        };
        serde_json::to_string(&value).map_err(Error::serialization)
    }

    /// The component's id plus its exported properties.
    fn snapshot(&self, component: &Component) -> Value {
        let live = |target, id: &str| self.is_live(target, id);
        let props = component.export_properties(&live);
        Value::Record(
            std::iter::once((Arc::from("id"), Value::from(&component.id)))
                .chain(props)
                .collect(),
        )
    }
}

fn props_of(name: &str, value: &Value) -> Result<LtMap<Arc<str>, Value>> {
    match value {
        Value::Null => Ok(LtMap::new()),
        Value::Record(props) => Ok(props.clone()),
        other => Err(Error::invalid_value(
            format!("record of properties for {name}"),
            other.kind_name(),
        )),
    }
}

fn plan_many(
    ty: &Arc<ComponentType>,
    name: &str,
    value: &Value,
    plan: &mut Vec<Planned>,
) -> Result<()> {
    match value {
        Value::Null => {}
        Value::List(items) => {
            for item in items {
                plan.push(Planned {
                    ty: ty.clone(),
                    props: props_of(name, item)?,
                    alias: None,
                });
            }
        }
        Value::Record(keyed) => {
            for (key, item) in keyed.iter() {
                let mut props = props_of(name, item)?;
                let alias = match ty.map_by() {
                    Some(map_by) => {
                        if !props.contains_key(map_by) {
                            props = props.insert(map_by.clone(), Value::String(key.clone()));
                        }
                        None
                    }
                    None => Some(key.clone()),
                };
                plan.push(Planned {
                    ty: ty.clone(),
                    props,
                    alias,
                });
            }
        }
        other => {
            return Err(Error::invalid_value(
                format!("list or keyed record for {name}"),
                other.kind_name(),
            ));
        }
    }
    Ok(())
}
