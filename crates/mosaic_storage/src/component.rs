//! Component instances and their slot storage.
//!
//! A component stores one [`Slot`] per field of its type's [`Layout`].
//! Link slots hold canonical id strings; whether a stored id is live is a
//! question for the world, which owns the id tables.

use std::fmt;
use std::sync::Arc;

use mosaic_foundation::{
    ComponentId, EntityId, Error, LtMap, OrderedMap, OrderedSet, Result, Tick, Value,
};

use crate::schema::{ComponentType, Field, FieldKind, Layout, LinkKind, LinkTarget};

/// Storage for one field.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Slot {
    Value(Value),
    Record(Vec<Slot>),
    Ref(Option<Arc<str>>),
    Set(OrderedSet<Arc<str>>),
    Object(OrderedMap<Arc<str>, Option<Arc<str>>>),
    Pointer,
}

impl Slot {
    pub(crate) fn defaults(layout: &Layout) -> Vec<Slot> {
        layout
            .fields()
            .map(|field| match &field.kind {
                FieldKind::Value(default) => Slot::Value(default.clone()),
                FieldKind::Record(inner) => Slot::Record(Self::defaults(inner)),
                FieldKind::Link(LinkKind::Ref, _) => Slot::Ref(None),
                FieldKind::Link(LinkKind::Set, _) => Slot::Set(OrderedSet::new()),
                FieldKind::Link(LinkKind::Object, _) => Slot::Object(OrderedMap::new()),
                FieldKind::Pointer(_) => Slot::Pointer,
            })
            .collect()
    }

    /// Builds link storage from its transfer-form value.
    pub(crate) fn link_from_value(kind: LinkKind, value: &Value) -> Result<Slot> {
        let id = |v: &Value| -> Result<Option<Arc<str>>> {
            match v {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s.clone())),
                other => Err(Error::invalid_value("id string or null", other.kind_name())),
            }
        };
        match (kind, value) {
            (LinkKind::Ref, v) => Ok(Slot::Ref(id(v)?)),
            (LinkKind::Set, Value::Null) => Ok(Slot::Set(OrderedSet::new())),
            (LinkKind::Set, Value::List(items)) => {
                let mut set = OrderedSet::with_capacity(items.len());
                for item in items {
                    if let Some(member) = id(item)? {
                        set.insert(member);
                    }
                }
                Ok(Slot::Set(set))
            }
            (LinkKind::Object, Value::Null) => Ok(Slot::Object(OrderedMap::new())),
            (LinkKind::Object, Value::Record(entries)) => {
                let mut map = OrderedMap::with_capacity(entries.len());
                for (key, v) in entries.iter() {
                    map.insert(key.clone(), id(v)?);
                }
                Ok(Slot::Object(map))
            }
            (LinkKind::Set, other) => Err(Error::invalid_value("list of ids", other.kind_name())),
            (LinkKind::Object, other) => {
                Err(Error::invalid_value("record of ids", other.kind_name()))
            }
        }
    }
}

/// Where a dotted path lands inside a component.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Resolved {
    /// A plain value slot, plus segments descending into the value.
    Plain { slot: Vec<usize>, rest: Vec<Arc<str>> },
    /// A nested record level.
    Record { slot: Vec<usize> },
    /// A link slot; `key` addresses one entry of an object link.
    Link {
        slot: Vec<usize>,
        kind: LinkKind,
        target: LinkTarget,
        key: Option<Arc<str>>,
    },
}

/// Resolves `path` against `ty`, following pointers to the slot they name.
pub(crate) fn resolve(ty: &ComponentType, path: &str) -> Result<Resolved> {
    let segments: Vec<&str> = path.split('.').collect();
    let unknown = || Error::unknown_property(ty.name().as_ref(), path);
    let (slot, field, rest) = ty.layout().walk(segments.as_slice()).ok_or_else(unknown)?;
    match &field.kind {
        FieldKind::Value(_) => Ok(Resolved::Plain {
            slot,
            rest: rest.iter().map(|s| Arc::from(*s)).collect(),
        }),
        FieldKind::Record(_) => Ok(Resolved::Record { slot }),
        FieldKind::Link(kind, target) => match rest {
            [] => Ok(Resolved::Link {
                slot,
                kind: *kind,
                target: *target,
                key: None,
            }),
            [key] if *kind == LinkKind::Object => Ok(Resolved::Link {
                slot,
                kind: *kind,
                target: *target,
                key: Some(Arc::from(*key)),
            }),
            _ => Err(unknown()),
        },
        FieldKind::Pointer(pointer) if rest.is_empty() => resolve_pointer(ty, pointer),
        FieldKind::Pointer(_) => Err(unknown()),
    }
}

fn resolve_pointer(ty: &ComponentType, pointer: &[Arc<str>]) -> Result<Resolved> {
    match ty.layout().walk(pointer) {
        Some((slot, Field { kind: FieldKind::Value(_), .. }, rest)) => Ok(Resolved::Plain {
            slot,
            rest: rest.to_vec(),
        }),
        _ => Err(Error::path(pointer.join("."), "pointer does not reach a plain property")),
    }
}

/// A typed record attached to exactly one entity.
pub struct Component {
    pub(crate) id: ComponentId,
    pub(crate) entity: EntityId,
    pub(crate) ty: Arc<ComponentType>,
    pub(crate) alias: Option<Arc<str>>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) created: Tick,
    pub(crate) updated: Tick,
}

impl Component {
    pub(crate) fn new(
        id: ComponentId,
        entity: EntityId,
        ty: Arc<ComponentType>,
        alias: Option<Arc<str>>,
        tick: Tick,
    ) -> Self {
        let slots = Slot::defaults(ty.layout());
        Self {
            id,
            entity,
            ty,
            alias,
            slots,
            created: tick,
            updated: tick,
        }
    }

    /// Returns the component id.
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Returns the owning entity's id.
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    /// Returns the component type name.
    #[must_use]
    pub fn type_name(&self) -> &Arc<str> {
        self.ty.name()
    }

    /// Returns the compiled component type.
    #[must_use]
    pub fn component_type(&self) -> &ComponentType {
        &self.ty
    }

    /// Returns the alias given at creation, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&Arc<str>> {
        self.alias.as_ref()
    }

    /// Returns the tick the component was attached.
    #[must_use]
    pub fn created(&self) -> Tick {
        self.created
    }

    /// Returns the tick of the last property change.
    #[must_use]
    pub fn updated(&self) -> Tick {
        self.updated
    }

    /// Returns the key this instance is filed under on its entity.
    ///
    /// That is the alias when one was given, otherwise the current `map_by`
    /// value when the type has one, otherwise the component id.
    #[must_use]
    pub fn key(&self) -> Arc<str> {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if let Some(map_by) = self.ty.map_by() {
            if let Some((index, _)) = self.ty.layout().field(map_by) {
                if let Some(Slot::Value(value)) = self.slots.get(index) {
                    return key_string(value);
                }
            }
        }
        self.id.as_arc().clone()
    }

    /// Reads `path` as stored, without checking whether linked ids are live.
    ///
    /// Links read as id strings (sets as lists, objects as records); a
    /// pointer reads through to its target, or null if the path is broken.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the path names no property.
    pub fn get(&self, path: &str) -> Result<Value> {
        self.read(path, &|_, _| true)
    }

    /// Writes a plain property (directly or through a pointer) without
    /// change tracking. Intended for lifecycle hooks.
    ///
    /// Returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the path names no plain property, or a
    /// path error if the value cannot be followed to the target.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<Value> {
        match resolve(&self.ty, path)? {
            Resolved::Plain { slot, rest } => self.write_plain(&slot, &rest, value.into()),
            Resolved::Record { .. } | Resolved::Link { .. } => Err(Error::invalid_value(
                "plain property",
                format!("{}.{path}", self.ty.name()),
            )),
        }
    }

    pub(crate) fn read(&self, path: &str, live: &dyn Fn(LinkTarget, &str) -> bool) -> Result<Value> {
        Ok(match resolve(&self.ty, path)? {
            Resolved::Plain { slot, rest } => self.read_plain(&slot, &rest).unwrap_or_default(),
            Resolved::Record { slot } => {
                match (self.ty.layout().field_by_slot(&slot), self.slot(&slot)) {
                    (Some(field), Some(stored)) => {
                        self.field_value(field, stored, live).unwrap_or_default()
                    }
                    _ => Value::Null,
                }
            }
            Resolved::Link {
                slot, target, key, ..
            } => match (self.slot(&slot), key) {
                (Some(Slot::Object(map)), Some(key)) => match map.get(&key) {
                    Some(Some(id)) if live(target, &**id) => Value::String(id.clone()),
                    _ => Value::Null,
                },
                (Some(stored), _) => link_value(stored, target, live),
                (None, _) => Value::Null,
            },
        })
    }

    pub(crate) fn slot(&self, path: &[usize]) -> Option<&Slot> {
        let (first, rest) = path.split_first()?;
        let mut current = self.slots.get(*first)?;
        for index in rest {
            current = match current {
                Slot::Record(inner) => inner.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub(crate) fn slot_mut(&mut self, path: &[usize]) -> Option<&mut Slot> {
        let (first, rest) = path.split_first()?;
        let mut current = self.slots.get_mut(*first)?;
        for index in rest {
            current = match current {
                Slot::Record(inner) => inner.get_mut(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub(crate) fn read_plain(&self, slot: &[usize], rest: &[Arc<str>]) -> Option<Value> {
        match self.slot(slot)? {
            Slot::Value(value) => value.get_path(rest).cloned(),
            _ => None,
        }
    }

    pub(crate) fn write_plain(
        &mut self,
        slot: &[usize],
        rest: &[Arc<str>],
        value: Value,
    ) -> Result<Value> {
        let type_name = self.ty.name().clone();
        match self.slot_mut(slot) {
            Some(Slot::Value(current)) => {
                let old = current.get_path(rest).cloned().unwrap_or_default();
                *current = current.with_path(rest, value).map_err(|err| {
                    Error::path(
                        rest.join("."),
                        format!("{type_name}: {}", err.kind),
                    )
                })?;
                Ok(old)
            }
            _ => Err(Error::path(rest.join("."), "not a plain property")),
        }
    }

    /// Applies transfer-form overrides on top of the defaults.
    ///
    /// Pointer writes are deferred until every other field is in place,
    /// since they land inside sibling values.
    pub(crate) fn apply_overrides(&mut self, props: &LtMap<Arc<str>, Value>) -> Result<()> {
        let ty = self.ty.clone();
        let mut pointers = Vec::new();
        apply_level(
            ty.name(),
            ty.layout(),
            &mut self.slots,
            "",
            props,
            &mut pointers,
        )?;
        for (path, value) in pointers {
            if let Resolved::Plain { slot, rest } = resolve(&ty, &path)? {
                self.write_plain(&slot, &rest, value)?;
            }
        }
        Ok(())
    }

    /// Lists every stored link as (slot path, target kind, target id).
    ///
    /// An object holding the same id under two keys yields it twice.
    pub(crate) fn stored_links(&self) -> Vec<(Vec<usize>, LinkTarget, Arc<str>)> {
        let mut out = Vec::new();
        for (slot, _, target) in self.ty.link_slots() {
            match self.slot(slot) {
                Some(Slot::Ref(Some(id))) => out.push((slot.clone(), *target, id.clone())),
                Some(Slot::Set(members)) => {
                    out.extend(members.iter().map(|id| (slot.clone(), *target, id.clone())));
                }
                Some(Slot::Object(map)) => {
                    out.extend(
                        map.values()
                            .flatten()
                            .map(|id| (slot.clone(), *target, id.clone())),
                    );
                }
                _ => {}
            }
        }
        out
    }

    /// Exports top-level properties, dropping ignored ones.
    pub(crate) fn export_properties(
        &self,
        live: &dyn Fn(LinkTarget, &str) -> bool,
    ) -> Vec<(Arc<str>, Value)> {
        self.ty
            .layout()
            .fields()
            .zip(&self.slots)
            .filter(|(field, _)| !self.ty.ignores(&field.name))
            .filter_map(|(field, slot)| {
                self.field_value(field, slot, live)
                    .map(|value| (field.name.clone(), value))
            })
            .collect()
    }

    /// Snapshots one field. `None` means the field is omitted (a broken
    /// pointer).
    fn field_value(
        &self,
        field: &Field,
        slot: &Slot,
        live: &dyn Fn(LinkTarget, &str) -> bool,
    ) -> Option<Value> {
        match (&field.kind, slot) {
            (FieldKind::Value(_), Slot::Value(value)) => Some(value.clone()),
            (FieldKind::Record(inner), Slot::Record(slots)) => Some(Value::Record(
                inner
                    .fields()
                    .zip(slots)
                    .filter_map(|(f, s)| self.field_value(f, s, live).map(|v| (f.name.clone(), v)))
                    .collect(),
            )),
            (FieldKind::Link(_, target), stored) => Some(link_value(stored, *target, live)),
            (FieldKind::Pointer(pointer), _) => match resolve_pointer(&self.ty, pointer) {
                Ok(Resolved::Plain { slot, rest }) => self.read_plain(&slot, &rest),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("type", self.ty.name())
            .field("entity", &self.entity)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Renders a `map_by` value as a collection key.
pub(crate) fn key_string(value: &Value) -> Arc<str> {
    match value {
        Value::String(s) => s.clone(),
        other => Arc::from(other.to_string()),
    }
}

fn link_value(stored: &Slot, target: LinkTarget, live: &dyn Fn(LinkTarget, &str) -> bool) -> Value {
    let id = |id: &Arc<str>| {
        if live(target, &**id) {
            Value::String(id.clone())
        } else {
            Value::Null
        }
    };
    match stored {
        Slot::Ref(Some(target_id)) => id(target_id),
        Slot::Set(members) => Value::List(
            members
                .iter()
                .filter(|m| live(target, &***m))
                .map(|m| Value::String(m.clone()))
                .collect(),
        ),
        Slot::Object(map) => Value::Record(
            map.iter()
                .map(|(key, entry)| (key.clone(), entry.as_ref().map_or(Value::Null, id)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn apply_level(
    type_name: &Arc<str>,
    layout: &Layout,
    slots: &mut [Slot],
    prefix: &str,
    props: &LtMap<Arc<str>, Value>,
    pointers: &mut Vec<(String, Value)>,
) -> Result<()> {
    for (name, value) in props.iter() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let (index, field) = layout
            .field(name)
            .ok_or_else(|| Error::unknown_property(type_name.as_ref(), path.as_str()))?;
        match (&field.kind, &mut slots[index]) {
            (FieldKind::Value(_), Slot::Value(current)) => *current = current.merge(value),
            (FieldKind::Record(inner), Slot::Record(nested)) => match value {
                Value::Record(entries) => {
                    apply_level(type_name, inner, nested, &path, entries, pointers)?;
                }
                Value::Null => {}
                other => {
                    return Err(Error::invalid_value(
                        format!("record for {type_name}.{path}"),
                        other.kind_name(),
                    ));
                }
            },
            (FieldKind::Link(kind, _), slot) => *slot = Slot::link_from_value(*kind, value)?,
            (FieldKind::Pointer(_), _) => pointers.push((path, value.clone())),
            _ => {
                return Err(Error::new(mosaic_foundation::ErrorKind::Internal(format!(
                    "slot layout mismatch at {type_name}.{path}"
                ))));
            }
        }
    }
    Ok(())
}
