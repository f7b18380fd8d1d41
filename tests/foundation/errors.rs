//! Integration tests for Error types
//!
//! Tests error construction, categories, display, and context.

use mosaic_foundation::{
    ComponentId, EntityId, Error, ErrorCategory, ErrorContext, ErrorKind, IdGenerator,
};

// =============================================================================
// Error Construction
// =============================================================================

#[test]
fn schema_errors() {
    let err = Error::unknown_component("Health");
    assert!(matches!(err.kind, ErrorKind::UnknownComponentType(_)));
    assert_eq!(err.category(), ErrorCategory::Schema);
    assert!(format!("{err}").contains("Health"));

    let err = Error::unknown_property("Health", "mana");
    assert_eq!(err.category(), ErrorCategory::Schema);
    assert!(format!("{err}").contains("mana"));

    let err = Error::invalid_value("list of ids", "int");
    assert_eq!(err.category(), ErrorCategory::Schema);
}

#[test]
fn cardinality_error_names_entity() {
    let err = Error::cardinality(EntityId::from("hero"), "Health");
    assert_eq!(err.category(), ErrorCategory::Cardinality);
    let msg = format!("{err}");
    assert!(msg.contains("hero"));
    assert!(msg.contains("Health"));
}

#[test]
fn path_and_lookup_errors() {
    assert_eq!(
        Error::path("container.x", "no such key").category(),
        ErrorCategory::Path
    );
    assert_eq!(
        Error::entity_not_found("ghost").category(),
        ErrorCategory::Lookup
    );
    assert_eq!(
        Error::component_not_found(ComponentId::from("c9")).category(),
        ErrorCategory::Lookup
    );
    assert_eq!(
        Error::new(ErrorKind::DuplicateEntity(EntityId::from("e"))).category(),
        ErrorCategory::Lookup
    );
}

#[test]
fn serialization_error_keeps_message() {
    let err = Error::serialization("unexpected end of input");
    assert_eq!(err.category(), ErrorCategory::Serialization);
    assert!(format!("{err}").contains("unexpected end"));
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn context_attaches_and_displays() {
    let ctx = ErrorContext::new()
        .with_entity(EntityId::from("hero"))
        .with_component_type("Health")
        .with_property("hp.current");
    let err = Error::unknown_property("Health", "hp.current").with_context(ctx);
    let ctx = err.context.as_ref().unwrap();
    assert_eq!(ctx.component_type.as_deref(), Some("Health"));
    assert_eq!(
        format!("{ctx}"),
        "entity hero, component Health, property hp.current"
    );
}

// =============================================================================
// Identifiers
// =============================================================================

#[test]
fn ids_compare_with_strings() {
    let id = EntityId::new("player");
    assert_eq!(id, "player");
    assert_eq!(id.as_str(), "player");
    assert_eq!(format!("{id:?}"), "EntityId(player)");
}

#[test]
fn generator_uses_prefix_and_hex_counter() {
    let mut ids = IdGenerator::new("w-");
    let generated: Vec<String> = (0..16).map(|_| ids.next_id().to_string()).collect();
    assert_eq!(generated[0], "w-1");
    assert_eq!(generated[15], "w-10");
}
