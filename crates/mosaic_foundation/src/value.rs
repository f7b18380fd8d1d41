//! Dynamic value type for component properties and transfer form.

use std::fmt;
use std::sync::Arc;

use crate::collections::{LtMap, LtVec};
use crate::error::{Error, Result};
use crate::ids::{ComponentId, EntityId};

/// Dynamic value held by plain component properties.
///
/// Values are immutable and cheaply cloneable (O(1) for every variant).
/// Lists and records use structural sharing via persistent data structures,
/// so change records can carry before/after values without deep copies.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// String value.
    String(Arc<str>),
    /// Persistent list.
    List(LtVec<Value>),
    /// Persistent record with string keys.
    Record(LtMap<Arc<str>, Value>),
}

impl Value {
    /// Builds a record from key-value pairs.
    pub fn record<K, V, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a list from values.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns an empty record.
    #[must_use]
    pub fn empty_record() -> Self {
        Self::Record(LtMap::new())
    }

    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    /// Returns true if this is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a float.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a number as f64 (works for both int and float).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a list.
    #[must_use]
    pub const fn as_list(&self) -> Option<&LtVec<Value>> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to extract a record.
    #[must_use]
    pub const fn as_record(&self) -> Option<&LtMap<Arc<str>, Value>> {
        match self {
            Self::Record(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a record field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record()?.get(key)
    }

    /// Follows `segments` through nested records (and list indices).
    #[must_use]
    pub fn get_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                Self::Record(map) => map.get(segment)?,
                Self::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns a copy with the value at `segments` replaced.
    ///
    /// The final segment may name a record key that does not exist yet;
    /// every earlier segment must already lead to a record or list.
    ///
    /// # Errors
    ///
    /// Returns a path error if an intermediate segment is missing or does
    /// not lead to a record or list.
    pub fn with_path<S: AsRef<str>>(&self, segments: &[S], value: Value) -> Result<Self> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(value);
        };
        let head = head.as_ref();
        match self {
            Self::Record(map) => match map.get(head) {
                Some(child) => Ok(Self::Record(
                    map.insert(Arc::from(head), child.with_path(rest, value)?),
                )),
                None if rest.is_empty() => Ok(Self::Record(map.insert(Arc::from(head), value))),
                None => Err(Error::path(head, "no such key")),
            },
            Self::List(items) => {
                let index = head
                    .parse::<usize>()
                    .map_err(|_| Error::path(head, "list index expected"))?;
                let child = items
                    .get(index)
                    .ok_or_else(|| Error::path(head, "list index out of bounds"))?;
                let updated = child.with_path(rest, value)?;
                items
                    .update(index, updated)
                    .map(Self::List)
                    .ok_or_else(|| Error::path(head, "list index out of bounds"))
            }
            other => Err(Error::path(
                head,
                format!("cannot descend into {}", other.kind_name()),
            )),
        }
    }

    /// Deep-merges `overlay` on top of this value.
    ///
    /// Records merge key by key; anything else is replaced by the overlay.
    #[must_use]
    pub fn merge(&self, overlay: &Value) -> Value {
        match (self, overlay) {
            (Self::Record(base), Self::Record(top)) => {
                let mut merged = base.clone();
                for (key, value) in top.iter() {
                    let next = match base.get(key) {
                        Some(existing) => existing.merge(value),
                        None => value.clone(),
                    };
                    merged = merged.insert(key.clone(), next);
                }
                Self::Record(merged)
            }
            (_, top) => top.clone(),
        }
    }
}

// Implement PartialEq manually to handle float comparison
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(v) => write!(f, "{v:?}"),
            Self::Record(m) => write!(f, "{m:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::List(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Convenience From implementations

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::String(s)
    }
}

impl From<&EntityId> for Value {
    fn from(id: &EntityId) -> Self {
        Self::String(id.as_arc().clone())
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::from(&id)
    }
}

impl From<&ComponentId> for Value {
    fn from(id: &ComponentId) -> Self {
        Self::String(id.as_arc().clone())
    }
}

impl From<ComponentId> for Value {
    fn from(id: ComponentId) -> Self {
        Self::from(&id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// Serde
// =============================================================================

#[cfg(feature = "serde")]
mod serde_impl {
    use std::fmt;
    use std::sync::Arc;

    use serde::de::{MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Value;
    use crate::collections::{LtMap, LtVec};

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Null => serializer.serialize_unit(),
                Value::Bool(b) => serializer.serialize_bool(*b),
                Value::Int(n) => serializer.serialize_i64(*n),
                Value::Float(n) => serializer.serialize_f64(*n),
                Value::String(s) => serializer.serialize_str(s),
                Value::List(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Value::Record(map) => {
                    let mut out = serializer.serialize_map(Some(map.len()))?;
                    for (key, value) in map.iter() {
                        out.serialize_entry(&**key, value)?;
                    }
                    out.end()
                }
            }
        }
    }

    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Value;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a null, bool, number, string, list, or record")
        }

        fn visit_unit<E>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_none<E>(self) -> Result<Value, E> {
            Ok(Value::Null)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
            Value::deserialize(deserializer)
        }

        fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
            Ok(Value::Bool(b))
        }

        fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
            Ok(Value::Int(n))
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
            Ok(i64::try_from(n).map_or(Value::Float(n as f64), Value::Int))
        }

        fn visit_f64<E>(self, n: f64) -> Result<Value, E> {
            Ok(Value::Float(n))
        }

        fn visit_str<E>(self, s: &str) -> Result<Value, E> {
            Ok(Value::String(Arc::from(s)))
        }

        fn visit_string<E>(self, s: String) -> Result<Value, E> {
            Ok(Value::String(Arc::from(s)))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<Value>()? {
                items.push(item);
            }
            Ok(Value::List(LtVec::from(items)))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
            let mut map = LtMap::new();
            while let Some((key, value)) = access.next_entry::<String, Value>()? {
                map = map.insert(Arc::from(key), value);
            }
            Ok(Value::Record(map))
        }
    }

    impl<'de> Deserialize<'de> for Value {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ValueVisitor)
        }
    }
}
