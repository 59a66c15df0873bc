//! Tests for ShardStore
//!
//! These tests verify:
//! - Basic get/set/has/delete operations
//! - First-fit shard assignment and shard file creation
//! - Flush writes dirty shards and the index
//! - Reload from disk, including crash-diverged index/shard pairs
//! - Array operations and NotAnArray handling

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use shardkv::error::KvError;
use shardkv::storage::{ShardStore, WriteOrigin, INDEX_FILENAME};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, ShardStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = ShardStore::open(temp_dir.path(), 100).unwrap();
    (temp_dir, store)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn set(store: &mut ShardStore, key: &str, value: Value) -> bool {
    store.set(key, value, WriteOrigin::External)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_empty_index() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("nested").join("store");

    let store = ShardStore::open(&dir, 100).unwrap();

    assert_eq!(store.shard_count(), 0);
    assert_eq!(read_json(&dir.join(INDEX_FILENAME)), json!({}));
}

#[test]
fn test_set_get_round_trip() {
    let (_temp, mut store) = setup_temp_store();

    assert!(set(&mut store, "user:1", json!({"name": "ada", "tags": [1, 2]})));

    assert_eq!(store.get("user:1"), Some(&json!({"name": "ada", "tags": [1, 2]})));
    assert!(store.has("user:1"));
}

#[test]
fn test_get_missing_key() {
    let (_temp, store) = setup_temp_store();

    assert_eq!(store.get("nope"), None);
    assert!(!store.has("nope"));
}

#[test]
fn test_has_is_true_for_null_value() {
    let (_temp, mut store) = setup_temp_store();

    set(&mut store, "k", Value::Null);

    assert!(store.has("k"));
    assert_eq!(store.get("k"), Some(&Value::Null));
}

#[test]
fn test_external_set_of_equal_value_is_skipped() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "k", json!({"a": 1}));
    store.flush().unwrap();

    assert!(!set(&mut store, "k", json!({"a": 1})));
    assert_eq!(store.dirty_count(), 0);

    assert!(store.set("k", json!({"a": 1}), WriteOrigin::Internal));
    assert_eq!(store.dirty_count(), 1);
}

#[test]
fn test_delete_removes_key() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "a", json!(1));

    assert!(store.delete("a"));
    assert!(!store.delete("a"));
    assert_eq!(store.get("a"), None);
    assert_eq!(store.key_count(), 0);
}

#[test]
fn test_get_many_preserves_order() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "a", json!(1));
    set(&mut store, "c", json!(3));

    let values = store.get_many(&["c", "b", "a"]);

    assert_eq!(values, vec![Some(json!(3)), None, Some(json!(1))]);
}

#[test]
fn test_all_merges_shards() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = ShardStore::open(temp_dir.path(), 2).unwrap();
    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        set(&mut store, key, json!(i));
    }

    let all = store.all();

    assert_eq!(store.shard_count(), 3);
    let keys: Vec<&str> = all.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
}

// =============================================================================
// Sharding Tests
// =============================================================================

#[test]
fn test_101_keys_create_second_shard() {
    let (temp, mut store) = setup_temp_store();
    for i in 0..101 {
        set(&mut store, &format!("key{}", i), json!(i));
    }
    store.flush().unwrap();

    let index = read_json(&temp.path().join(INDEX_FILENAME));
    let first = index["data_1.json"].as_array().unwrap();
    let second = index["data_2.json"].as_array().unwrap();

    assert_eq!(first.len(), 100);
    assert_eq!(second, &vec![json!("key100")]);
    assert!(!first.contains(&json!("key100")));

    let shard_2 = read_json(&temp.path().join("data_2.json"));
    assert_eq!(shard_2, json!({"key100": 100}));
}

#[test]
fn test_deleted_slot_is_reused_first_fit() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = ShardStore::open(temp_dir.path(), 2).unwrap();
    for key in ["a", "b", "c"] {
        set(&mut store, key, json!(key));
    }

    store.delete("a");
    set(&mut store, "d", json!("d"));

    assert_eq!(store.index().lookup("d"), Some("data_1.json"));
    assert_eq!(store.shard_count(), 2);
}

#[test]
fn test_empty_shard_file_is_kept() {
    let (temp, mut store) = setup_temp_store();
    set(&mut store, "only", json!(true));
    store.flush().unwrap();

    store.delete("only");
    store.flush().unwrap();

    assert_eq!(read_json(&temp.path().join("data_1.json")), json!({}));
    assert_eq!(read_json(&temp.path().join(INDEX_FILENAME)), json!({"data_1.json": []}));
}

// =============================================================================
// Flush / Reload Tests
// =============================================================================

#[test]
fn test_flush_writes_only_dirty_shards() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = ShardStore::open(temp_dir.path(), 1).unwrap();
    set(&mut store, "a", json!(1));
    set(&mut store, "b", json!(2));
    assert_eq!(store.flush().unwrap(), 2);

    set(&mut store, "b", json!(3));

    assert_eq!(store.dirty_shards().collect::<Vec<_>>(), vec!["data_2.json"]);
    assert_eq!(store.flush().unwrap(), 1);
    assert_eq!(store.flush().unwrap(), 0);
}

#[test]
fn test_reopen_restores_flushed_state() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = ShardStore::open(temp_dir.path(), 100).unwrap();
        set(&mut store, "a", json!([1, 2, 3]));
        set(&mut store, "b", json!("text"));
        store.flush().unwrap();
    }

    let store = ShardStore::open(temp_dir.path(), 100).unwrap();

    assert_eq!(store.get("a"), Some(&json!([1, 2, 3])));
    assert_eq!(store.get("b"), Some(&json!("text")));
}

#[test]
fn test_unflushed_writes_are_not_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = ShardStore::open(temp_dir.path(), 100).unwrap();
        set(&mut store, "a", json!(1));
    }

    let store = ShardStore::open(temp_dir.path(), 100).unwrap();

    assert_eq!(store.get("a"), None);
}

#[test]
fn test_corrupt_index_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(INDEX_FILENAME), "{not json").unwrap();

    let result = ShardStore::open(temp_dir.path(), 100);

    assert!(matches!(result, Err(KvError::CorruptIndex { .. })));
}

#[test]
fn test_duplicate_key_in_index_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(INDEX_FILENAME),
        r#"{"data_1.json": ["a"], "data_2.json": ["a"]}"#,
    )
    .unwrap();

    let result = ShardStore::open(temp_dir.path(), 100);

    assert!(matches!(result, Err(KvError::CorruptIndex { .. })));
}

#[test]
fn test_missing_shard_file_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(INDEX_FILENAME), r#"{"data_1.json": ["a"]}"#).unwrap();

    let result = ShardStore::open(temp_dir.path(), 100);

    assert!(matches!(result, Err(KvError::CorruptShard { .. })));
}

#[test]
fn test_open_reconciles_diverged_index() {
    let temp_dir = TempDir::new().unwrap();
    // Index lists "gone" which the shard lacks; shard holds "stray" which
    // the index lacks.
    fs::write(
        temp_dir.path().join(INDEX_FILENAME),
        r#"{"data_1.json": ["a", "gone"]}"#,
    )
    .unwrap();
    fs::write(temp_dir.path().join("data_1.json"), r#"{"a": 1, "stray": 2}"#).unwrap();

    let store = ShardStore::open(temp_dir.path(), 100).unwrap();

    assert_eq!(store.get("a"), Some(&json!(1)));
    assert!(!store.has("gone"));
    assert!(!store.has("stray"));
    assert_eq!(store.all(), {
        let mut expected = Map::new();
        expected.insert("a".to_string(), json!(1));
        expected
    });
}

// =============================================================================
// Array Operation Tests
// =============================================================================

#[test]
fn test_push_then_pop_on_absent_key() {
    let (_temp, mut store) = setup_temp_store();

    let pushed = store.push("a", json!(1)).unwrap();
    assert_eq!(pushed.length, 1);
    assert_eq!(pushed.element, Some(json!(1)));

    let popped = store.pop("a").unwrap();
    assert_eq!(popped.length, 0);
    assert_eq!(popped.element, Some(json!(1)));
    assert_eq!(store.get("a"), Some(&json!([])));
}

#[test]
fn test_shift_unshift_work_at_front() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "q", json!([2, 3]));

    let unshifted = store.unshift("q", json!(1)).unwrap();
    assert_eq!(unshifted.length, 3);
    assert_eq!(store.get("q"), Some(&json!([1, 2, 3])));

    let shifted = store.shift("q").unwrap();
    assert_eq!(shifted.element, Some(json!(1)));
    assert_eq!(store.get("q"), Some(&json!([2, 3])));
}

#[test]
fn test_pop_absent_key_persists_empty_array() {
    let (_temp, mut store) = setup_temp_store();

    let popped = store.pop("empty").unwrap();

    assert_eq!(popped.length, 0);
    assert_eq!(popped.element, None);
    assert_eq!(store.get("empty"), Some(&json!([])));
    assert_eq!(store.dirty_count(), 1);
}

#[test]
fn test_slice_semantics() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "a", json!([1, 2, 3]));

    assert_eq!(store.slice("a", 0, Some(1)).unwrap(), Some(vec![json!(1)]));
    assert_eq!(store.slice("a", -2, None).unwrap(), Some(vec![json!(2), json!(3)]));
    assert_eq!(store.slice("a", 2, Some(1)).unwrap(), Some(vec![]));
    assert_eq!(store.slice("missing", 0, None).unwrap(), None);
}

#[test]
fn test_array_op_on_non_array_leaves_state_unchanged() {
    let (_temp, mut store) = setup_temp_store();
    set(&mut store, "s", json!("scalar"));
    store.flush().unwrap();

    for result in [
        store.push("s", json!(1)),
        store.pop("s"),
        store.shift("s"),
        store.unshift("s", json!(1)),
    ] {
        assert!(matches!(result, Err(KvError::NotAnArray { .. })));
    }
    assert!(matches!(store.slice("s", 0, None), Err(KvError::NotAnArray { .. })));

    assert_eq!(store.get("s"), Some(&json!("scalar")));
    assert_eq!(store.dirty_count(), 0);
}
