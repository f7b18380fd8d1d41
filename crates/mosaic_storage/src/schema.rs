//! Component type definitions and their compiled layouts.
//!
//! A [`ComponentDef`] is what callers register; the registry compiles it once
//! into a [`ComponentType`] whose [`Layout`] assigns every property a fixed
//! slot. Reference markers compile to [`FieldKind::Link`] and pointers to
//! [`FieldKind::Pointer`], so no per-write schema lookup by name is needed
//! beyond the path walk.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mosaic_foundation::{Error, ErrorKind, Result, Value};

use crate::component::Component;

/// Property names the transfer form reserves on every component object.
pub const RESERVED_PROPERTIES: [&str; 3] = ["id", "type", "key"];

/// How many targets a link property holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Single optional link.
    Ref,
    /// Duplicate-free, insertion-ordered collection of links.
    Set,
    /// String key to optional link.
    Object,
}

/// What a link property points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkTarget {
    /// Links name entities.
    Entity,
    /// Links name components.
    Component,
}

/// One property declaration in a [`ComponentDef`].
#[derive(Clone, Debug, PartialEq)]
pub enum Prop {
    /// Plain value with its default.
    Value(Value),
    /// Nested record whose fields may themselves be links or pointers.
    Record(Vec<(Arc<str>, Prop)>),
    /// Reference marker.
    Link(LinkKind, LinkTarget),
    /// Virtual property following a dotted path from the component root.
    Pointer(Arc<str>),
}

impl Prop {
    /// Plain property with a default value.
    pub fn value(default: impl Into<Value>) -> Self {
        Self::Value(default.into())
    }

    /// Nested record of properties.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Prop)>,
    {
        Self::Record(fields.into_iter().map(|(k, p)| (k.into(), p)).collect())
    }

    /// Single optional link to an entity.
    #[must_use]
    pub const fn entity_ref() -> Self {
        Self::Link(LinkKind::Ref, LinkTarget::Entity)
    }

    /// Single optional link to a component.
    #[must_use]
    pub const fn component_ref() -> Self {
        Self::Link(LinkKind::Ref, LinkTarget::Component)
    }

    /// Ordered set of entity links.
    #[must_use]
    pub const fn entity_set() -> Self {
        Self::Link(LinkKind::Set, LinkTarget::Entity)
    }

    /// Ordered set of component links.
    #[must_use]
    pub const fn component_set() -> Self {
        Self::Link(LinkKind::Set, LinkTarget::Component)
    }

    /// Keyed map of entity links.
    #[must_use]
    pub const fn entity_object() -> Self {
        Self::Link(LinkKind::Object, LinkTarget::Entity)
    }

    /// Keyed map of component links.
    #[must_use]
    pub const fn component_object() -> Self {
        Self::Link(LinkKind::Object, LinkTarget::Component)
    }

    /// Pointer following `path` (dot separated) from the component root.
    pub fn pointer(path: impl Into<Arc<str>>) -> Self {
        Self::Pointer(path.into())
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for Prop {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Prop {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for Prop {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

/// Lifecycle callback run against a component.
pub type Hook = Arc<dyn Fn(&mut Component) + Send + Sync>;

/// Controls how a component type appears in transfer form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializePolicy {
    /// Leave instances of this type out of exported entities.
    pub skip: bool,
    /// Top-level properties dropped from every exported instance.
    pub ignore: Vec<Arc<str>>,
}

/// Registration input for a component type.
#[derive(Clone, Default)]
pub struct ComponentDef {
    properties: Vec<(Arc<str>, Prop)>,
    many: bool,
    map_by: Option<Arc<str>>,
    init: Option<Hook>,
    destroy: Option<Hook>,
    serialize: SerializePolicy,
}

impl ComponentDef {
    /// Creates a definition with no properties.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<Arc<str>>, prop: impl Into<Prop>) -> Self {
        self.properties.push((name.into(), prop.into()));
        self
    }

    /// Allows several instances per entity.
    #[must_use]
    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    /// Keys instances on each entity by the current value of `property`.
    ///
    /// Implies [`many`](Self::many).
    #[must_use]
    pub fn map_by(mut self, property: impl Into<Arc<str>>) -> Self {
        self.many = true;
        self.map_by = Some(property.into());
        self
    }

    /// Runs `hook` once a new instance has its defaults and overrides applied.
    #[must_use]
    pub fn on_init(mut self, hook: impl Fn(&mut Component) + Send + Sync + 'static) -> Self {
        self.init = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` before an instance is detached.
    #[must_use]
    pub fn on_destroy(mut self, hook: impl Fn(&mut Component) + Send + Sync + 'static) -> Self {
        self.destroy = Some(Arc::new(hook));
        self
    }

    /// Omits this type from exported entities.
    #[must_use]
    pub fn skip_serialize(mut self) -> Self {
        self.serialize.skip = true;
        self
    }

    /// Drops `property` from exported instances.
    #[must_use]
    pub fn ignore(mut self, property: impl Into<Arc<str>>) -> Self {
        self.serialize.ignore.push(property.into());
        self
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("properties", &self.properties)
            .field("many", &self.many)
            .field("map_by", &self.map_by)
            .field("init", &self.init.is_some())
            .field("destroy", &self.destroy.is_some())
            .field("serialize", &self.serialize)
            .finish()
    }
}

// =============================================================================
// Compiled layout
// =============================================================================

/// Compiled property kind.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    /// Plain value with its default.
    Value(Value),
    /// Nested record.
    Record(Layout),
    /// Reference marker.
    Link(LinkKind, LinkTarget),
    /// Pointer path segments, resolved from the component root.
    Pointer(Vec<Arc<str>>),
}

/// A named slot in a [`Layout`].
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Property name.
    pub name: Arc<str>,
    /// What the slot holds.
    pub kind: FieldKind,
}

/// Fixed slot layout of a record level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    fields: Vec<Field>,
    by_name: HashMap<Arc<str>, usize>,
}

impl Layout {
    fn compile(type_name: &str, props: &[(Arc<str>, Prop)]) -> Result<Self> {
        let mut layout = Self::default();
        for (name, prop) in props {
            if name.is_empty() || name.contains('.') {
                return Err(Error::invalid_value(
                    "property name without dots",
                    format!("{type_name}.{name}"),
                ));
            }
            if layout.by_name.contains_key(name) {
                return Err(Error::new(ErrorKind::AlreadyRegistered(format!(
                    "{type_name}.{name}"
                ))));
            }
            let kind = match prop {
                Prop::Value(default) => FieldKind::Value(default.clone()),
                Prop::Record(fields) => FieldKind::Record(Self::compile(type_name, fields)?),
                Prop::Link(kind, target) => FieldKind::Link(*kind, *target),
                Prop::Pointer(path) => {
                    FieldKind::Pointer(path.split('.').map(Arc::from).collect())
                }
            };
            layout.by_name.insert(name.clone(), layout.fields.len());
            layout.fields.push(Field {
                name: name.clone(),
                kind,
            });
        }
        Ok(layout)
    }

    /// Returns the slot index and field for `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        let index = *self.by_name.get(name)?;
        Some((index, &self.fields[index]))
    }

    /// Returns the field at `index`.
    #[must_use]
    pub fn field_at(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Iterates fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Returns the number of slots at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the layout declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Walks `segments` through nested records, returning the slot path
    /// taken and the field where the walk stopped, plus unconsumed segments.
    ///
    /// The walk stops at the first field that is not a nested record.
    pub(crate) fn walk<'a, 's, S: AsRef<str>>(
        &'a self,
        segments: &'s [S],
    ) -> Option<(Vec<usize>, &'a Field, &'s [S])> {
        let mut layout = self;
        let mut slot = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let (index, field) = layout.field(segment.as_ref())?;
            slot.push(index);
            match &field.kind {
                FieldKind::Record(inner) if i + 1 < segments.len() => layout = inner,
                _ => return Some((slot, field, &segments[i + 1..])),
            }
        }
        None
    }

    /// Visits every link slot, depth first, with its slot path.
    pub(crate) fn link_slots(&self) -> Vec<(Vec<usize>, LinkKind, LinkTarget)> {
        fn visit(
            layout: &Layout,
            prefix: &mut Vec<usize>,
            out: &mut Vec<(Vec<usize>, LinkKind, LinkTarget)>,
        ) {
            for (index, field) in layout.fields.iter().enumerate() {
                prefix.push(index);
                match &field.kind {
                    FieldKind::Link(kind, target) => out.push((prefix.clone(), *kind, *target)),
                    FieldKind::Record(inner) => visit(inner, prefix, out),
                    FieldKind::Value(_) | FieldKind::Pointer(_) => {}
                }
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        visit(self, &mut Vec::new(), &mut out);
        out
    }

    /// Renders a slot path back to its dotted property path.
    pub(crate) fn path_of(&self, slot: &[usize]) -> String {
        let mut names = Vec::with_capacity(slot.len());
        let mut layout = self;
        for index in slot {
            let Some(field) = layout.fields.get(*index) else {
                break;
            };
            names.push(field.name.as_ref());
            if let FieldKind::Record(inner) = &field.kind {
                layout = inner;
            }
        }
        names.join(".")
    }

    /// Returns the field reached by a slot path.
    pub(crate) fn field_by_slot(&self, slot: &[usize]) -> Option<&Field> {
        let (last, init) = slot.split_last()?;
        let mut layout = self;
        for index in init {
            match &layout.fields.get(*index)?.kind {
                FieldKind::Record(inner) => layout = inner,
                _ => return None,
            }
        }
        layout.fields.get(*last)
    }
}

/// A registered, compiled component type.
pub struct ComponentType {
    name: Arc<str>,
    layout: Layout,
    many: bool,
    map_by: Option<Arc<str>>,
    init: Option<Hook>,
    destroy: Option<Hook>,
    serialize: SerializePolicy,
    links: Vec<(Vec<usize>, LinkKind, LinkTarget)>,
}

impl ComponentType {
    /// Compiles a definition.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a property name is reserved or duplicated,
    /// `map_by` does not name a plain top-level property, or a pointer does
    /// not start at a plain or record property.
    pub fn compile(name: impl Into<Arc<str>>, def: ComponentDef) -> Result<Self> {
        let name = name.into();
        for (property, _) in &def.properties {
            if RESERVED_PROPERTIES.contains(&property.as_ref()) {
                return Err(Error::new(ErrorKind::ReservedProperty(format!(
                    "{name}.{property}"
                ))));
            }
        }
        let layout = Layout::compile(&name, &def.properties)?;

        if let Some(map_by) = &def.map_by {
            match layout.field(map_by) {
                Some((_, Field { kind: FieldKind::Value(_), .. })) => {}
                Some(_) => {
                    return Err(Error::invalid_value(
                        "plain property for map_by",
                        format!("{name}.{map_by}"),
                    ));
                }
                None => return Err(Error::unknown_property(name.as_ref(), map_by.as_ref())),
            }
        }

        check_pointers(&name, &layout, &layout)?;

        let links = layout.link_slots();
        Ok(Self {
            name,
            layout,
            many: def.many,
            map_by: def.map_by,
            init: def.init,
            destroy: def.destroy,
            serialize: def.serialize,
            links,
        })
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Returns the compiled root layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns true if several instances may live on one entity.
    #[must_use]
    pub fn is_many(&self) -> bool {
        self.many
    }

    /// Returns the property instances are keyed by, if any.
    #[must_use]
    pub fn map_by(&self) -> Option<&Arc<str>> {
        self.map_by.as_ref()
    }

    /// Returns the serialize policy.
    #[must_use]
    pub fn serialize_policy(&self) -> &SerializePolicy {
        &self.serialize
    }

    /// Returns true if `property` is dropped on export.
    #[must_use]
    pub fn ignores(&self, property: &str) -> bool {
        self.serialize.ignore.iter().any(|p| p.as_ref() == property)
    }

    pub(crate) fn init_hook(&self) -> Option<&Hook> {
        self.init.as_ref()
    }

    pub(crate) fn destroy_hook(&self) -> Option<&Hook> {
        self.destroy.as_ref()
    }

    pub(crate) fn link_slots(&self) -> &[(Vec<usize>, LinkKind, LinkTarget)] {
        &self.links
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("many", &self.many)
            .field("map_by", &self.map_by)
            .field("serialize", &self.serialize)
            .finish_non_exhaustive()
    }
}

fn check_pointers(type_name: &str, root: &Layout, level: &Layout) -> Result<()> {
    for field in &level.fields {
        match &field.kind {
            FieldKind::Pointer(path) => match root.walk(path) {
                Some((_, Field { kind: FieldKind::Value(_), .. }, _)) => {}
                _ => {
                    return Err(Error::invalid_value(
                        "pointer path starting at a plain property",
                        format!("{type_name}.{}: {}", field.name, path.join(".")),
                    ));
                }
            },
            FieldKind::Record(inner) => check_pointers(type_name, root, inner)?,
            FieldKind::Value(_) | FieldKind::Link(..) => {}
        }
    }
    Ok(())
}
