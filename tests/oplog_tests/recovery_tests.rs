//! Tests for RecoveryEngine
//!
//! These tests verify:
//! - A missing log is created with only a header
//! - Trailing SET/DELETE entries are replayed in order
//! - Only the last N replayable entries are applied
//! - Entries older than the retention window are pruned, others kept verbatim
//! - Malformed lines are skipped

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use shardkv::oplog::{RecoveryEngine, RecoveryState, ReplayTarget, LOG_HEADER};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const NOW: u64 = 1_720_000_000_000;

/// Records replayed calls into a map
#[derive(Default)]
struct MapTarget {
    data: BTreeMap<String, Value>,
    calls: Vec<String>,
}

impl ReplayTarget for MapTarget {
    fn replay_set(&mut self, key: &str, value: Value) {
        self.calls.push(format!("SET {}", key));
        self.data.insert(key.to_string(), value);
    }

    fn replay_delete(&mut self, key: &str) {
        self.calls.push(format!("DELETE {}", key));
        self.data.remove(key);
    }
}

fn setup_temp_log(lines: &[String]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("logs.csv");
    let mut contents = format!("{}\n", LOG_HEADER);
    for line in lines {
        contents.push_str(line);
        contents.push('\n');
    }
    fs::write(&path, contents).unwrap();
    (temp_dir, path)
}

fn set_line(ts: u64, key: &str, value: &str) -> String {
    format!("{},\treq,\tSET,\t{},\t{}", ts, key, value)
}

fn delete_line(ts: u64, key: &str) -> String {
    format!("{},\treq,\tDELETE,\t{}", ts, key)
}

fn get_line(ts: u64, key: &str) -> String {
    format!("{},\treq,\tGET,\t{}", ts, key)
}

// =============================================================================
// Fresh Log Tests
// =============================================================================

#[test]
fn test_missing_log_is_created_with_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("logs.csv");
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run(&mut target).unwrap();

    assert_eq!(result.state, RecoveryState::Fresh);
    assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", LOG_HEADER));
    assert!(target.calls.is_empty());
}

#[test]
fn test_header_only_log_replays_nothing() {
    let (_temp, path) = setup_temp_log(&[]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(result.state, RecoveryState::Replayed);
    assert_eq!(result.entries_read, 0);
    assert!(target.calls.is_empty());
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_applies_sets_and_deletes_in_order() {
    let (_temp, path) = setup_temp_log(&[
        set_line(NOW - 30, "a", "1"),
        get_line(NOW - 25, "a"),
        set_line(NOW - 20, "b", r#"{"x":[1,2]}"#),
        delete_line(NOW - 10, "a"),
        set_line(NOW - 5, "c", "\"text\""),
    ]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(result.entries_read, 5);
    assert_eq!(result.entries_replayed, 4);
    assert_eq!(target.calls, vec!["SET a", "SET b", "DELETE a", "SET c"]);
    assert_eq!(target.data.get("a"), None);
    assert_eq!(target.data.get("b"), Some(&json!({"x": [1, 2]})));
    assert_eq!(target.data.get("c"), Some(&json!("text")));
}

#[test]
fn test_replay_limited_to_last_n_replayable_entries() {
    let lines: Vec<String> = (0..10)
        .map(|i| set_line(NOW - 100 + i, &format!("k{}", i), &i.to_string()))
        .chain(std::iter::once(get_line(NOW, "k0")))
        .collect();
    let (_temp, path) = setup_temp_log(&lines);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path)
        .with_request_count(3)
        .run_at(NOW, &mut target)
        .unwrap();

    assert_eq!(result.entries_replayed, 3);
    assert_eq!(target.calls, vec!["SET k7", "SET k8", "SET k9"]);
}

#[test]
fn test_replay_ignores_non_mutating_methods() {
    let (_temp, path) = setup_temp_log(&[
        format!("{},\treq,\tALL", NOW),
        format!("{},\treq,\tHAS,\tk", NOW),
        format!("{},\treq,\tGET_MANY,\tk", NOW),
    ]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(result.entries_read, 3);
    assert_eq!(result.entries_replayed, 0);
}

// =============================================================================
// Malformed Line Tests
// =============================================================================

#[test]
fn test_malformed_lines_are_skipped() {
    let (_temp, path) = setup_temp_log(&[
        "this is not a log line".to_string(),
        set_line(NOW, "good", "1"),
        format!("{},\treq,\tSET,\tbad", NOW),
        set_line(NOW, "badjson", "{unterminated"),
        "".to_string(),
        delete_line(NOW, "other"),
    ]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(target.calls, vec!["SET good", "DELETE other"]);
    assert_eq!(result.entries_malformed, 3);
}

// =============================================================================
// Retention Tests
// =============================================================================

#[test]
fn test_old_entries_are_pruned_and_recent_kept_verbatim() {
    let old = set_line(NOW - 8 * DAY_MS, "old", "1");
    let recent_set = set_line(NOW - DAY_MS, "recent", "{ \"spaced\" : true }");
    let recent_get = get_line(NOW - 1, "recent");
    let (_temp, path) = setup_temp_log(&[old, recent_set.clone(), recent_get.clone()]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(result.entries_pruned, 1);
    assert_eq!(result.entries_retained, 2);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("{}\n{}\n{}\n", LOG_HEADER, recent_set, recent_get)
    );
}

#[test]
fn test_pruned_entries_are_still_replayed() {
    let (_temp, path) = setup_temp_log(&[set_line(NOW - 30 * DAY_MS, "ancient", "true")]);
    let mut target = MapTarget::default();

    RecoveryEngine::new(&path).run_at(NOW, &mut target).unwrap();

    assert_eq!(target.data.get("ancient"), Some(&json!(true)));
    assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", LOG_HEADER));
}

#[test]
fn test_custom_retention_window() {
    let (_temp, path) = setup_temp_log(&[
        set_line(NOW - 2_000, "a", "1"),
        set_line(NOW - 500, "b", "2"),
    ]);
    let mut target = MapTarget::default();

    let result = RecoveryEngine::new(&path)
        .with_retention(Duration::from_secs(1))
        .run_at(NOW, &mut target)
        .unwrap();

    assert_eq!(result.entries_retained, 1);
    assert!(!fs::read_to_string(&path).unwrap().contains("\ta,"));
}

#[test]
fn test_recovery_is_idempotent() {
    let (_temp, path) = setup_temp_log(&[set_line(NOW, "k", "1"), delete_line(NOW, "j")]);

    let mut first = MapTarget::default();
    RecoveryEngine::new(&path).run_at(NOW, &mut first).unwrap();
    let after_first = fs::read_to_string(&path).unwrap();

    let mut second = MapTarget::default();
    RecoveryEngine::new(&path).run_at(NOW, &mut second).unwrap();

    assert_eq!(first.calls, second.calls);
    assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
}
