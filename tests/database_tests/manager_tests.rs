//! Tests for StoreManager
//!
//! These tests verify:
//! - One Database per normalized store path
//! - Path validation
//! - Flush/close across every open store

use std::fs;
use std::sync::Arc;

use serde_json::json;
use shardkv::error::KvError;
use shardkv::manager::validate_store_path;
use shardkv::{Config, StoreManager};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_manager() -> (TempDir, StoreManager) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().storage_root(temp_dir.path()).build();
    let manager = StoreManager::new(config).unwrap();
    (temp_dir, manager)
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_same_path_returns_same_database() {
    let (_temp, manager) = setup_temp_manager();

    let first = manager.open("users").unwrap();
    let second = manager.open("users/").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.stores(), vec!["users".to_string()]);
}

#[test]
fn test_stores_are_isolated() {
    let (temp, manager) = setup_temp_manager();

    manager.open("a").unwrap().set("k", json!("in a"));
    manager.open("nested/b").unwrap().set("k", json!("in b"));

    assert_eq!(manager.open("a").unwrap().get("k"), Some(json!("in a")));
    assert_eq!(manager.open("nested/b").unwrap().get("k"), Some(json!("in b")));
    assert!(temp.path().join("nested").join("b").join("index.json").exists());
}

#[test]
fn test_invalid_paths_are_rejected() {
    let (_temp, manager) = setup_temp_manager();

    for path in ["", ".", "..", "../escape", "/abs", "a/./b"] {
        assert!(
            matches!(manager.open(path), Err(KvError::InvalidPath(_))),
            "opened {:?}",
            path
        );
    }
    assert!(manager.stores().is_empty());
}

#[test]
fn test_validate_store_path_normalizes() {
    assert_eq!(validate_store_path("x//y").unwrap(), "x/y");
    assert!(validate_store_path("x/../y").is_err());
}

#[test]
fn test_dots_inside_a_name_are_allowed() {
    let (_temp, manager) = setup_temp_manager();

    assert_eq!(validate_store_path("release..v2").unwrap(), "release..v2");
    assert_eq!(validate_store_path("a/..b/c..").unwrap(), "a/..b/c..");
    assert!(validate_store_path("a\\..\\b").is_err());

    let db = manager.open("release..v2").unwrap();
    db.set("k", json!(1));
    assert_eq!(manager.stores(), vec!["release..v2".to_string()]);
}

#[test]
fn test_failed_open_is_not_cached() {
    let (temp, manager) = setup_temp_manager();
    let dir = temp.path().join("broken");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.json"), "not json").unwrap();

    assert!(matches!(manager.open("broken"), Err(KvError::CorruptIndex { .. })));
    assert!(manager.stores().is_empty());

    fs::write(dir.join("index.json"), "{}").unwrap();
    assert!(manager.open("broken").is_ok());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_flush_all_writes_every_store() {
    let (temp, manager) = setup_temp_manager();
    manager.open("one").unwrap().set("k", json!(1));
    manager.open("two").unwrap().set("k", json!(2));

    manager.flush_all().unwrap();

    for (path, value) in [("one", 1), ("two", 2)] {
        let shard = fs::read_to_string(temp.path().join(path).join("data_1.json")).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&shard).unwrap(), json!({"k": value}));
    }
}

#[test]
fn test_stats_cover_open_stores() {
    let (_temp, manager) = setup_temp_manager();
    manager.open("b").unwrap().set("k", json!(1));
    manager.open("a").unwrap();

    let stats = manager.stats();

    assert_eq!(stats.len(), 2);
    assert!(stats[0].path.ends_with("a"));
    assert_eq!(stats[1].keys, 1);
}

#[test]
fn test_close_releases_stores() {
    let (temp, manager) = setup_temp_manager();
    manager.open("s").unwrap().set("k", json!(true));

    manager.close().unwrap();

    assert!(manager.stores().is_empty());
    let reopened = manager.open("s").unwrap();
    assert_eq!(reopened.get("k"), Some(json!(true)));
    assert!(temp.path().join("s").join("logs.csv").exists());
}
