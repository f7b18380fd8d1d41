//! Error types for the Mosaic store.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! Every failure is synchronous and surfaces from the call that caused it.

use std::fmt;

use thiserror::Error;

use crate::ids::{ComponentId, EntityId};

/// The main error type for Mosaic operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns the broad category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Creates an unknown component type error.
    #[must_use]
    pub fn unknown_component(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownComponentType(name.into()))
    }

    /// Creates an unknown property error.
    #[must_use]
    pub fn unknown_property(component_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownProperty {
            component_type: component_type.into(),
            property: property.into(),
        })
    }

    /// Creates an unknown tag error.
    #[must_use]
    pub fn unknown_tag(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownTag(name.into()))
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue {
            expected: expected.into(),
            found: found.into(),
        })
    }

    /// Creates a cardinality error.
    #[must_use]
    pub fn cardinality(entity: EntityId, component_type: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cardinality {
            entity,
            component_type: component_type.into(),
        })
    }

    /// Creates a path error.
    #[must_use]
    pub fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Path {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(id: impl Into<EntityId>) -> Self {
        Self::new(ErrorKind::EntityNotFound(id.into()))
    }

    /// Creates a component not found error.
    #[must_use]
    pub fn component_not_found(id: impl Into<ComponentId>) -> Self {
        Self::new(ErrorKind::ComponentNotFound(id.into()))
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Serialization(message.to_string()))
    }
}

/// The broad families callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The request does not fit the registered schema or vocabulary.
    Schema,
    /// A non-many component type would gain a second instance.
    Cardinality,
    /// A dotted property path could not be followed.
    Path,
    /// An id did not name a live entity or component, or was already taken.
    Lookup,
    /// Transfer form could not be encoded or decoded.
    Serialization,
    /// Internal invariant breakage.
    Internal,
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Component type was never registered.
    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    /// Property is not part of the component type's schema.
    #[error("unknown property: {property} on component type {component_type}")]
    UnknownProperty {
        /// The component type that was addressed.
        component_type: String,
        /// The property name that was not found.
        property: String,
    },

    /// Tag was never registered.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// Name is neither a registered component type nor a tag.
    #[error("unknown component type or tag: {0}")]
    UnknownName(String),

    /// Name is already registered as a component type or tag.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Property name collides with a word the transfer form reserves.
    #[error("reserved property name: {0}")]
    ReservedProperty(String),

    /// A value has the wrong shape for where it is written.
    #[error("invalid value: expected {expected}, found {found}")]
    InvalidValue {
        /// Description of the accepted shape.
        expected: String,
        /// Description of what was supplied.
        found: String,
    },

    /// Second instance of a non-many component type on one entity.
    #[error("entity {entity} already has a {component_type} component")]
    Cardinality {
        /// The entity that was targeted.
        entity: EntityId,
        /// The non-many component type.
        component_type: String,
    },

    /// Dotted path could not be followed.
    #[error("cannot follow path {path}: {reason}")]
    Path {
        /// The path as written.
        path: String,
        /// Why resolution stopped.
        reason: String,
    },

    /// Entity id is not live.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Component id is not live.
    #[error("component not found: {0}")]
    ComponentNotFound(ComponentId),

    /// Entity id is already live.
    #[error("entity already exists: {0}")]
    DuplicateEntity(EntityId),

    /// Transfer form could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Returns the broad category of this kind.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownComponentType(_)
            | Self::UnknownProperty { .. }
            | Self::UnknownTag(_)
            | Self::UnknownName(_)
            | Self::AlreadyRegistered(_)
            | Self::ReservedProperty(_)
            | Self::InvalidValue { .. } => ErrorCategory::Schema,
            Self::Cardinality { .. } => ErrorCategory::Cardinality,
            Self::Path { .. } => ErrorCategory::Path,
            Self::EntityNotFound(_) | Self::ComponentNotFound(_) | Self::DuplicateEntity(_) => {
                ErrorCategory::Lookup
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The entity being operated on.
    pub entity: Option<EntityId>,
    /// The component type being operated on.
    pub component_type: Option<String>,
    /// The property path being operated on.
    pub property: Option<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entity.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Sets the component type.
    #[must_use]
    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = Some(component_type.into());
        self
    }

    /// Sets the property path.
    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("entity", self.entity.as_ref().map(EntityId::as_str)),
            ("component", self.component_type.as_deref()),
            ("property", self.property.as_deref()),
        ];
        let mut first = true;
        for (label, value) in parts {
            if let Some(value) = value {
                if !first {
                    f.write_str(", ")?;
                }
                first = false;
                write!(f, "{label} {value}")?;
            }
        }
        Ok(())
    }
}

/// A specialized Result type for Mosaic operations.
pub type Result<T> = std::result::Result<T, Error>;
