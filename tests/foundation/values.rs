//! Integration tests for the Value type
//!
//! Tests construction, path access, path updates, and deep merge.

use mosaic_foundation::{ErrorCategory, Value, record};

// =============================================================================
// Construction
// =============================================================================

#[test]
fn record_macro_builds_nested_records() {
    let hp = record! { "max" => 25, "current" => record! { "base" => 10 } };
    assert_eq!(hp.get("max"), Some(&Value::Int(25)));
    assert_eq!(hp.get_path(&["current", "base"]), Some(&Value::Int(10)));
    assert_eq!(record! {}, Value::empty_record());
}

#[test]
fn conversions_pick_variants() {
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(3_i32), Value::Int(3));
    assert_eq!(Value::from(1.5), Value::Float(1.5));
    assert_eq!(Value::from("a").as_str(), Some("a"));
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::list([1, 2]).as_list().map(|l| l.len()), Some(2));
}

#[test]
fn display_renders_transfer_like_text() {
    let v = record! { "a" => Value::list([1, 2]) };
    assert_eq!(format!("{v}"), "{a: [1, 2]}");
    assert_eq!(format!("{}", Value::Null), "null");
}

// =============================================================================
// Paths
// =============================================================================

#[test]
fn get_path_descends_lists_by_index() {
    let v = record! { "items" => Value::list([record! { "n" => 7 }]) };
    assert_eq!(v.get_path(&["items", "0", "n"]), Some(&Value::Int(7)));
    assert_eq!(v.get_path(&["items", "1", "n"]), None);
    assert_eq!(v.get_path(&["items", "x"]), None);
}

#[test]
fn with_path_returns_updated_copy() {
    let v = record! { "position" => record! { "x" => 0 } };
    let updated = v.with_path(&["position", "x"], Value::Int(4)).unwrap();
    assert_eq!(updated.get_path(&["position", "x"]), Some(&Value::Int(4)));
    assert_eq!(v.get_path(&["position", "x"]), Some(&Value::Int(0)));
}

#[test]
fn with_path_adds_final_key_only() {
    let v = record! { "position" => record! {} };
    let added = v.with_path(&["position", "y"], Value::Int(1)).unwrap();
    assert_eq!(added.get_path(&["position", "y"]), Some(&Value::Int(1)));

    let err = v
        .with_path(&["missing", "y"], Value::Int(1))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Path);
}

#[test]
fn with_path_cannot_descend_into_scalars() {
    let v = record! { "x" => 1 };
    assert!(v.with_path(&["x", "y"], Value::Int(2)).is_err());
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn merge_is_deep_for_records() {
    let defaults = record! {
        "hp" => record! { "max" => 25, "current" => 25 },
        "name" => "unnamed",
    };
    let overlay = record! { "hp" => record! { "current" => 10 } };
    let merged = defaults.merge(&overlay);
    assert_eq!(merged.get_path(&["hp", "max"]), Some(&Value::Int(25)));
    assert_eq!(merged.get_path(&["hp", "current"]), Some(&Value::Int(10)));
    assert_eq!(merged.get("name").and_then(Value::as_str), Some("unnamed"));
}

#[test]
fn merge_replaces_non_records() {
    let base = Value::list([1, 2, 3]);
    let top = Value::list([4]);
    assert_eq!(base.merge(&top), top);
    assert_eq!(record! { "a" => 1 }.merge(&Value::Int(2)), Value::Int(2));
}
