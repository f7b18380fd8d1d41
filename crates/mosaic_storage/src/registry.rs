//! Component types and the tag vocabulary.
//!
//! Types and tags share one namespace because queries name both the same way.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mosaic_foundation::{Error, ErrorKind, Result};
use tracing::debug;

use crate::schema::{ComponentDef, ComponentType};

/// What a query name refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// A registered component type.
    Component(Arc<str>),
    /// A registered tag.
    Tag(Arc<str>),
}

impl Term {
    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        match self {
            Self::Component(name) | Self::Tag(name) => name,
        }
    }
}

/// Registered component types and tags.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<Arc<str>, Arc<ComponentType>>,
    tags: HashSet<Arc<str>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers a component type.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the name is taken or the definition does
    /// not compile.
    pub fn register_component(
        &mut self,
        name: impl Into<Arc<str>>,
        def: ComponentDef,
    ) -> Result<Arc<ComponentType>> {
        let name = name.into();
        if self.types.contains_key(&name) || self.tags.contains(&name) {
            return Err(Error::new(ErrorKind::AlreadyRegistered(name.to_string())));
        }
        let ty = Arc::new(ComponentType::compile(name.clone(), def)?);
        debug!(
            component = %name,
            fields = ty.layout().len(),
            many = ty.is_many(),
            "registered component type"
        );
        self.types.insert(name, ty.clone());
        Ok(ty)
    }

    /// Registers tag names. Re-registering a tag is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a name is already a component type. No tag
    /// is registered in that case.
    pub fn register_tags<I, S>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let tags: Vec<Arc<str>> = tags.into_iter().map(Into::into).collect();
        if let Some(clash) = tags.iter().find(|t| self.types.contains_key(*t)) {
            return Err(Error::new(ErrorKind::AlreadyRegistered(clash.to_string())));
        }
        for tag in tags {
            if self.tags.insert(tag.clone()) {
                debug!(tag = %tag, "registered tag");
            }
        }
        Ok(())
    }

    /// Looks up a component type.
    #[must_use]
    pub fn component_type(&self, name: &str) -> Option<&Arc<ComponentType>> {
        self.types.get(name)
    }

    /// Looks up a component type, failing with a schema error.
    ///
    /// # Errors
    ///
    /// Returns an unknown component type error.
    pub fn require_type(&self, name: &str) -> Result<&Arc<ComponentType>> {
        self.types
            .get(name)
            .ok_or_else(|| Error::unknown_component(name))
    }

    /// Returns the canonical tag name.
    ///
    /// # Errors
    ///
    /// Returns an unknown tag error.
    pub fn require_tag(&self, name: &str) -> Result<Arc<str>> {
        self.tags
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_tag(name))
    }

    /// Returns true if `name` is a registered tag.
    #[must_use]
    pub fn is_tag(&self, name: &str) -> bool {
        self.tags.contains(name)
    }

    /// Resolves a query name to a component type or tag.
    ///
    /// # Errors
    ///
    /// Returns an unknown name error if it is neither.
    pub fn term(&self, name: &str) -> Result<Term> {
        if let Some(ty) = self.types.get(name) {
            return Ok(Term::Component(ty.name().clone()));
        }
        if let Some(tag) = self.tags.get(name) {
            return Ok(Term::Tag(tag.clone()));
        }
        Err(Error::new(ErrorKind::UnknownName(name.to_string())))
    }
}
