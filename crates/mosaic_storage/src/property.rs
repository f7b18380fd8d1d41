//! Tracked property reads and writes.
//!
//! [`World::get`] and [`World::set`] address a component property by dotted
//! path. Plain values (directly or through a pointer) are written in place;
//! links are routed to the reference layer so the reverse index and the
//! change feed stay in step.

use std::sync::Arc;

use mosaic_foundation::{Error, Result, Value};

use crate::changes::ChangeOp;
use crate::component::{Resolved, resolve};
use crate::schema::LinkKind;
use crate::world::{Origin, World};

impl World {
    /// Reads a property. Links resolve to live target ids (absent targets
    /// read as null); pointers read through to their target.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the component is not live, or a schema
    /// error if the path names no property.
    pub fn get(&self, component: impl AsRef<str>, path: &str) -> Result<Value> {
        let component = self.component_or_err(component.as_ref())?;
        component.read(path, &|target, id| self.is_live(target, id))
    }

    /// Writes a property and returns the previous value.
    ///
    /// Single links take an id string (or null to clear), link sets a list
    /// of ids, object links a record of ids. Writing a nested record writes
    /// each of its fields. Changing the `map_by` property refiles the
    /// component under its new key, replacing any instance already there.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the component is not live, a schema error
    /// if the path or value shape is wrong, or a path error if a pointer or
    /// nested path cannot be followed.
    pub fn set(
        &mut self,
        component: impl AsRef<str>,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let id = component.as_ref();
        let value = value.into();
        let c = self.component_or_err(id)?;
        match resolve(&c.ty, path)? {
            Resolved::Plain { slot, rest } => {
                let origin = Origin::of(c);
                let map_by = c.ty.map_by().is_some();
                let old_key = c.key();
                let c = self
                    .components
                    .get_mut(id)
                    .ok_or_else(|| Error::component_not_found(id))?;
                let old = c.write_plain(&slot, &rest, value.clone())?;
                let new_key = c.key();
                self.touch_values(&origin);
                if map_by && new_key != old_key {
                    self.refile(&origin, &old_key, new_key);
                }
                self.emit(
                    &origin,
                    ChangeOp::Changed,
                    Some(Arc::from(path)),
                    value,
                    old.clone(),
                );
                Ok(old)
            }
            Resolved::Record { .. } => {
                let old = self.get(id, path)?;
                let Value::Record(fields) = &value else {
                    return Err(Error::invalid_value(
                        format!("record for {path}"),
                        value.kind_name(),
                    ));
                };
                for (name, field) in fields.iter() {
                    self.set(id, &format!("{path}.{name}"), field.clone())?;
                }
                Ok(old)
            }
            Resolved::Link { kind, key, .. } => {
                let old = self.get(id, path)?;
                match (kind, key, &value) {
                    (LinkKind::Ref, _, Value::Null) | (LinkKind::Object, Some(_), Value::Null) => {
                        self.clear_link(id, path)?;
                    }
                    (LinkKind::Ref, _, Value::String(target))
                    | (LinkKind::Object, Some(_), Value::String(target)) => {
                        self.set_link(id, path, target)?;
                    }
                    (LinkKind::Set, _, Value::List(_) | Value::Null) => {
                        self.set_clear(id, path)?;
                        for target in ids_in(&value)? {
                            self.set_insert(id, path, target)?;
                        }
                    }
                    (LinkKind::Object, None, Value::Record(_) | Value::Null) => {
                        for key in self.link_keys(id, path)? {
                            self.remove_link_key(id, &format!("{path}.{key}"))?;
                        }
                        if let Value::Record(entries) = &value {
                            for (key, target) in entries.iter() {
                                let entry = format!("{path}.{key}");
                                match target {
                                    Value::String(target) => self.set_link(id, &entry, target)?,
                                    Value::Null => self.clear_link(id, &entry)?,
                                    other => {
                                        return Err(Error::invalid_value(
                                            "id string or null",
                                            other.kind_name(),
                                        ));
                                    }
                                }
                            }
                        }
                    }
                    (_, _, other) => {
                        return Err(Error::invalid_value(
                            format!("link value for {path}"),
                            other.kind_name(),
                        ));
                    }
                }
                Ok(old)
            }
        }
    }

    /// Moves a many-type instance to the key its `map_by` property now
    /// holds. An instance already filed there is removed.
    fn refile(&mut self, origin: &Origin, old_key: &str, new_key: Arc<str>) {
        let displaced = self
            .entities
            .get_mut(origin.entity.as_str())
            .and_then(|entity| {
                entity.rekey(&origin.component_type, old_key, new_key, &origin.component)
            });
        if let Some(displaced) = displaced {
            self.remove_component(&displaced);
        }
    }
}

fn ids_in(value: &Value) -> Result<Vec<Arc<str>>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::String(id) => Ok(id.clone()),
                other => Err(Error::invalid_value("id string", other.kind_name())),
            })
            .collect(),
        other => Err(Error::invalid_value("list of ids", other.kind_name())),
    }
}
