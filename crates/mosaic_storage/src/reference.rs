//! Link properties and the reverse-link index.
//!
//! Link slots store canonical id strings. [`ReferenceIndex`] maps every
//! target id back to the (component, slot) pairs holding it, so destroying a
//! target clears exactly the referrers that point at it without scanning.
//!
//! Ids written for targets that do not exist yet are stored as-is and read
//! as absent until the target appears.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_foundation::{ComponentId, Error, OrderedMap, Result, Value};

use crate::changes::ChangeOp;
use crate::component::{Resolved, Slot, resolve};
use crate::schema::{LinkKind, LinkTarget};
use crate::world::{Origin, World};

/// A link slot on a component.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Holder {
    pub(crate) component: ComponentId,
    pub(crate) slot: Vec<usize>,
}

/// Target id to the slots linking to it, with a link count per slot.
///
/// Object links can hold one target under several keys, hence the count.
#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    referrers: HashMap<(LinkTarget, Arc<str>), OrderedMap<Holder, u32>>,
}

impl ReferenceIndex {
    pub(crate) fn link(&mut self, target: LinkTarget, id: Arc<str>, holder: Holder) {
        let holders = self.referrers.entry((target, id)).or_default();
        match holders.get_mut(&holder) {
            Some(count) => *count += 1,
            None => {
                holders.insert(holder, 1);
            }
        }
    }

    pub(crate) fn unlink(&mut self, target: LinkTarget, id: &Arc<str>, holder: &Holder) {
        let key = (target, id.clone());
        let Some(holders) = self.referrers.get_mut(&key) else {
            return;
        };
        if let Some(count) = holders.get_mut(holder) {
            *count -= 1;
            if *count == 0 {
                holders.remove(holder);
            }
        }
        if holders.is_empty() {
            self.referrers.remove(&key);
        }
    }

    /// Removes and returns every holder of `id`.
    pub(crate) fn take(&mut self, target: LinkTarget, id: &Arc<str>) -> Vec<Holder> {
        self.referrers
            .remove(&(target, id.clone()))
            .map(|holders| holders.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the holders of `id` in link order.
    pub(crate) fn holders(&self, target: LinkTarget, id: &Arc<str>) -> Vec<&Holder> {
        self.referrers
            .get(&(target, id.clone()))
            .map(|holders| holders.keys().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, target: LinkTarget, id: &str) -> u32 {
        self.referrers
            .get(&(target, Arc::from(id)))
            .map_or(0, |holders| holders.values().sum())
    }
}

/// Which single link a write addresses.
struct LinkSite {
    origin: Origin,
    holder: Holder,
    target: LinkTarget,
    path: Arc<str>,
}

impl World {
    /// Returns true if `id` names a live target of the given kind.
    #[must_use]
    pub fn is_live(&self, target: LinkTarget, id: &str) -> bool {
        match target {
            LinkTarget::Entity => self.entities.contains_key(id),
            LinkTarget::Component => self.components.contains_key(id),
        }
    }

    /// Reads a single link (a ref, or one key of an object link as
    /// `"property.key"`). Returns `None` when empty or the target is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a single link.
    pub fn link(&self, component: impl AsRef<str>, path: &str) -> Result<Option<Arc<str>>> {
        let component = self.component_or_err(component.as_ref())?;
        let Resolved::Link {
            slot, target, key, ..
        } = resolve(&component.ty, path)?
        else {
            return Err(not_a_link(path));
        };
        let stored = match (component.slot(&slot), key) {
            (Some(Slot::Ref(stored)), None) => stored.clone(),
            (Some(Slot::Object(map)), Some(key)) => map.get(&key).cloned().flatten(),
            _ => return Err(not_a_link(path)),
        };
        Ok(stored.filter(|id| self.is_live(target, id)))
    }

    /// Reads a single entity link and returns the live entity.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    pub fn linked_entity(
        &self,
        component: impl AsRef<str>,
        path: &str,
    ) -> Result<Option<&crate::Entity>> {
        Ok(self
            .link(component, path)?
            .and_then(|id| self.entities.get(id.as_ref())))
    }

    /// Reads a single component link and returns the live component.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    pub fn linked_component(
        &self,
        component: impl AsRef<str>,
        path: &str,
    ) -> Result<Option<&crate::Component>> {
        Ok(self
            .link(component, path)?
            .and_then(|id| self.components.get(id.as_ref())))
    }

    /// Points a single link (a ref, or one key of an object link) at
    /// `target`, given as a handle or a bare id.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a single link.
    pub fn set_link(
        &mut self,
        component: impl AsRef<str>,
        path: &str,
        target: impl AsRef<str>,
    ) -> Result<()> {
        self.write_single(component.as_ref(), path, Some(Arc::from(target.as_ref())))
    }

    /// Empties a single link. An object key stays present, mapped to nothing.
    ///
    /// # Errors
    ///
    /// Same as [`set_link`](Self::set_link).
    pub fn clear_link(&mut self, component: impl AsRef<str>, path: &str) -> Result<()> {
        self.write_single(component.as_ref(), path, None)
    }

    /// Deletes `"property.key"` from an object link. Returns true if the key
    /// was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name an object key.
    pub fn remove_link_key(&mut self, component: impl AsRef<str>, path: &str) -> Result<bool> {
        let (site, key) = self.site(component.as_ref(), path)?;
        let Some(key) = key else {
            return Err(not_a_link(path));
        };
        let old = match self.slot_mut(&site.holder) {
            Some(Slot::Object(map)) => match map.remove(&key) {
                Some(old) => old,
                None => return Ok(false),
            },
            _ => return Err(not_a_link(path)),
        };
        if let Some(old) = old {
            self.refs.unlink(site.target, &old, &site.holder);
            self.link_changed(&site, ChangeOp::LinkSet, Value::Null, Value::String(old.clone()));
            self.reindex_link(&site.origin, &old);
        }
        Ok(true)
    }

    /// Returns the keys of an object link in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name an object link.
    pub fn link_keys(&self, component: impl AsRef<str>, path: &str) -> Result<Vec<Arc<str>>> {
        let component = self.component_or_err(component.as_ref())?;
        match resolve(&component.ty, path)? {
            Resolved::Link {
                slot, key: None, ..
            } => match component.slot(&slot) {
                Some(Slot::Object(map)) => Ok(map.keys().cloned().collect()),
                _ => Err(not_a_link(path)),
            },
            _ => Err(not_a_link(path)),
        }
    }

    /// Adds `target` to a link set. Returns true if it was not yet a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a link set.
    pub fn set_insert(
        &mut self,
        component: impl AsRef<str>,
        path: &str,
        target: impl AsRef<str>,
    ) -> Result<bool> {
        let site = self.set_site(component.as_ref(), path)?;
        let id: Arc<str> = Arc::from(target.as_ref());
        let inserted = match self.slot_mut(&site.holder) {
            Some(Slot::Set(members)) => members.insert(id.clone()),
            _ => return Err(not_a_link(path)),
        };
        if inserted {
            self.refs.link(site.target, id.clone(), site.holder.clone());
            self.link_changed(&site, ChangeOp::LinkAdded, Value::String(id.clone()), Value::Null);
            self.reindex_link(&site.origin, &id);
        }
        Ok(inserted)
    }

    /// Returns true if `target` is a live member of a link set.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a link set.
    pub fn set_contains(
        &self,
        component: impl AsRef<str>,
        path: &str,
        target: impl AsRef<str>,
    ) -> Result<bool> {
        let component = self.component_or_err(component.as_ref())?;
        match resolve(&component.ty, path)? {
            Resolved::Link {
                slot,
                kind: LinkKind::Set,
                target: kind,
                ..
            } => match component.slot(&slot) {
                Some(Slot::Set(members)) => {
                    let id = target.as_ref();
                    Ok(members.contains(id) && self.is_live(kind, id))
                }
                _ => Err(not_a_link(path)),
            },
            _ => Err(not_a_link(path)),
        }
    }

    /// Removes `target` from a link set. Returns true if it was a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a link set.
    pub fn set_remove(
        &mut self,
        component: impl AsRef<str>,
        path: &str,
        target: impl AsRef<str>,
    ) -> Result<bool> {
        let site = self.set_site(component.as_ref(), path)?;
        let id: Arc<str> = Arc::from(target.as_ref());
        let removed = match self.slot_mut(&site.holder) {
            Some(Slot::Set(members)) => members.remove(id.as_ref()),
            _ => return Err(not_a_link(path)),
        };
        if removed {
            self.refs.unlink(site.target, &id, &site.holder);
            self.link_changed(&site, ChangeOp::LinkRemoved, Value::Null, Value::String(id.clone()));
            self.reindex_link(&site.origin, &id);
        }
        Ok(removed)
    }

    /// Removes every member of a link set.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a link set.
    pub fn set_clear(&mut self, component: impl AsRef<str>, path: &str) -> Result<()> {
        let site = self.set_site(component.as_ref(), path)?;
        let members: Vec<Arc<str>> = match self.slot_mut(&site.holder) {
            Some(Slot::Set(members)) => {
                let taken = members.iter().cloned().collect();
                members.clear();
                taken
            }
            _ => return Err(not_a_link(path)),
        };
        for id in members {
            self.refs.unlink(site.target, &id, &site.holder);
            self.link_changed(&site, ChangeOp::LinkRemoved, Value::Null, Value::String(id.clone()));
            self.reindex_link(&site.origin, &id);
        }
        Ok(())
    }

    /// Returns the live members of a link set in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is not live or the path does not
    /// name a link set.
    pub fn set_members(&self, component: impl AsRef<str>, path: &str) -> Result<Vec<Arc<str>>> {
        let component = self.component_or_err(component.as_ref())?;
        match resolve(&component.ty, path)? {
            Resolved::Link {
                slot,
                kind: LinkKind::Set,
                target,
                ..
            } => match component.slot(&slot) {
                Some(Slot::Set(members)) => Ok(members
                    .iter()
                    .filter(|id| self.is_live(target, id))
                    .cloned()
                    .collect()),
                _ => Err(not_a_link(path)),
            },
            _ => Err(not_a_link(path)),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn site(&self, component: &str, path: &str) -> Result<(LinkSite, Option<Arc<str>>)> {
        let c = self.component_or_err(component)?;
        match resolve(&c.ty, path)? {
            Resolved::Link {
                slot, target, key, kind,
            } => {
                if matches!((kind, &key), (LinkKind::Set, _) | (LinkKind::Object, None)) {
                    return Err(not_a_link(path));
                }
                Ok((
                    LinkSite {
                        origin: Origin::of(c),
                        holder: Holder {
                            component: c.id.clone(),
                            slot,
                        },
                        target,
                        path: Arc::from(path),
                    },
                    key,
                ))
            }
            _ => Err(not_a_link(path)),
        }
    }

    fn set_site(&self, component: &str, path: &str) -> Result<LinkSite> {
        let c = self.component_or_err(component)?;
        match resolve(&c.ty, path)? {
            Resolved::Link {
                slot,
                target,
                kind: LinkKind::Set,
                ..
            } => Ok(LinkSite {
                origin: Origin::of(c),
                holder: Holder {
                    component: c.id.clone(),
                    slot,
                },
                target,
                path: Arc::from(path),
            }),
            _ => Err(not_a_link(path)),
        }
    }

    fn slot_mut(&mut self, holder: &Holder) -> Option<&mut Slot> {
        self.components
            .get_mut(&holder.component)?
            .slot_mut(&holder.slot)
    }

    fn write_single(&mut self, component: &str, path: &str, new: Option<Arc<str>>) -> Result<()> {
        let (site, key) = self.site(component, path)?;
        let old = match (self.slot_mut(&site.holder), key) {
            (Some(Slot::Ref(stored)), None) => std::mem::replace(stored, new.clone()),
            (Some(Slot::Object(map)), Some(key)) => map.insert(key, new.clone()).flatten(),
            _ => return Err(not_a_link(path)),
        };
        if old == new {
            return Ok(());
        }
        if let Some(old) = &old {
            self.refs.unlink(site.target, old, &site.holder);
        }
        if let Some(new) = &new {
            self.refs.link(site.target, new.clone(), site.holder.clone());
        }
        self.link_changed(&site, ChangeOp::LinkSet, new.clone().into(), old.clone().into());
        for id in old.iter().chain(new.iter()) {
            self.reindex_link(&site.origin, id);
        }
        Ok(())
    }

    fn link_changed(&mut self, site: &LinkSite, op: ChangeOp, new_value: Value, old_value: Value) {
        self.touch_values(&site.origin);
        self.emit(&site.origin, op, Some(site.path.clone()), new_value, old_value);
    }

    /// Registers every link a freshly attached component holds.
    pub(crate) fn register_links(&mut self, component: &ComponentId) {
        let Some(c) = self.components.get(component) else {
            return;
        };
        let origin = Origin::of(c);
        let links = c.stored_links();
        for (slot, target, id) in links {
            self.refs.link(
                target,
                id.clone(),
                Holder {
                    component: component.clone(),
                    slot,
                },
            );
            self.reindex_link(&origin, &id);
        }
    }

    /// Unregisters every link a departing component holds.
    pub(crate) fn release_links(&mut self, component: &crate::Component) {
        let origin = Origin::of(component);
        for (slot, target, id) in component.stored_links() {
            self.refs.unlink(
                target,
                &id,
                &Holder {
                    component: component.id.clone(),
                    slot,
                },
            );
            self.reindex_link(&origin, &id);
        }
    }

    /// Clears every link pointing at `id`, recording a change per cleared
    /// link.
    pub(crate) fn scrub(&mut self, target: LinkTarget, id: &Arc<str>) {
        for holder in self.refs.take(target, id) {
            let Some(c) = self.components.get_mut(&holder.component) else {
                continue;
            };
            let origin = Origin::of(c);
            let base = c.ty.layout().path_of(&holder.slot);
            let mut cleared: Vec<(String, ChangeOp)> = Vec::new();
            match c.slot_mut(&holder.slot) {
                Some(Slot::Ref(stored)) if stored.as_ref() == Some(id) => {
                    *stored = None;
                    cleared.push((base, ChangeOp::LinkSet));
                }
                Some(Slot::Set(members)) => {
                    if members.remove(id.as_ref()) {
                        cleared.push((base, ChangeOp::LinkRemoved));
                    }
                }
                Some(Slot::Object(map)) => {
                    for (key, entry) in map.iter_mut() {
                        if entry.as_ref() == Some(id) {
                            *entry = None;
                            cleared.push((format!("{base}.{key}"), ChangeOp::LinkSet));
                        }
                    }
                }
                _ => {}
            }
            if cleared.is_empty() {
                continue;
            }
            self.touch_values(&origin);
            for (path, op) in cleared {
                self.emit(
                    &origin,
                    op,
                    Some(Arc::from(path)),
                    Value::Null,
                    Value::String(id.clone()),
                );
            }
            self.reindex_link(&origin, id);
        }
    }
}

fn not_a_link(path: &str) -> Error {
    Error::invalid_value("link property of the matching kind", path)
}
