//! Integration tests for collections
//!
//! Tests persistent LtVec/LtMap and insertion-ordered OrderedSet/OrderedMap.

use mosaic_foundation::{LtMap, LtVec, OrderedMap, OrderedSet, Value};

// =============================================================================
// Persistent Collections
// =============================================================================

#[test]
fn vector_push_back_leaves_original() {
    let v1: LtVec<Value> = LtVec::new().push_back(Value::Int(1));
    let v2 = v1.push_back(Value::Int(2));
    assert_eq!(v1.len(), 1);
    assert_eq!(v2.len(), 2);
    assert_eq!(v2.get(1), Some(&Value::Int(2)));
}

#[test]
fn vector_update_out_of_bounds() {
    let v: LtVec<i64> = vec![1, 2].into();
    assert_eq!(v.update(1, 5).and_then(|v| v.get(1).copied()), Some(5));
    assert!(v.update(2, 5).is_none());
}

#[test]
fn map_insert_and_remove_are_persistent() {
    let m1: LtMap<String, i64> = LtMap::new().insert("a".to_string(), 1);
    let m2 = m1.insert("b".to_string(), 2);
    let m3 = m2.remove("a");
    assert_eq!(m1.len(), 1);
    assert_eq!(m2.len(), 2);
    assert!(!m3.contains_key("a"));
    assert_eq!(m3.get("b"), Some(&2));
}

// =============================================================================
// Ordered Collections
// =============================================================================

#[test]
fn ordered_set_keeps_insertion_order() {
    let mut set = OrderedSet::new();
    for name in ["c", "a", "b"] {
        assert!(set.insert(name.to_string()));
    }
    assert!(!set.insert("a".to_string()));
    let order: Vec<&str> = set.iter().map(String::as_str).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
}

#[test]
fn ordered_set_remove_and_first() {
    let mut set: OrderedSet<String> = ["x", "y", "z"].iter().map(|s| (*s).to_string()).collect();
    assert!(set.remove("x"));
    assert!(!set.remove("x"));
    assert_eq!(set.first().map(String::as_str), Some("y"));
    assert_eq!(set.len(), 2);
    assert!(set.contains("z"));
}

#[test]
fn ordered_set_equality_respects_order() {
    let a: OrderedSet<i32> = [1, 2, 3].into_iter().collect();
    let b: OrderedSet<i32> = [3, 1, 2].into_iter().collect();
    let c: OrderedSet<i32> = [1, 2, 3].into_iter().collect();
    assert_ne!(a, b);
    assert_eq!(a, c);
}

#[test]
fn ordered_map_replaces_in_place() {
    let mut map = OrderedMap::new();
    map.insert("first".to_string(), 1);
    map.insert("second".to_string(), 2);
    assert_eq!(map.insert("first".to_string(), 3), Some(1));
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["first", "second"]);
    assert_eq!(map.get("first"), Some(&3));
}

#[test]
fn ordered_map_remove() {
    let mut map: OrderedMap<String, i32> =
        [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
    assert_eq!(map.remove("a"), Some(1));
    assert_eq!(map.remove("a"), None);
    assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![2]);
}
