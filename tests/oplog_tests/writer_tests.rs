//! Tests for LogWriter and OperationLog
//!
//! These tests verify:
//! - Appends reach the file in posting order
//! - sync() waits for queued appends
//! - Overflow policies
//! - Failures are counted, not returned

use std::fs;
use std::sync::atomic::Ordering;

use shardkv::config::{Config, LogOverflowPolicy};
use shardkv::oplog::{LogEntry, LogWriter, Method, OperationLog, LOG_FILENAME};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, OperationLog) {
    let temp_dir = TempDir::new().unwrap();
    let log = OperationLog::open(temp_dir.path(), &Config::default()).unwrap();
    (temp_dir, log)
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_appends_preserve_order() {
    let (temp, log) = setup_temp_log();

    for i in 0..100 {
        log.record(&[LogEntry::keyed(i, &format!("r{}", i), Method::Get, "k")]);
    }
    log.sync();

    let contents = fs::read_to_string(temp.path().join(LOG_FILENAME)).unwrap();
    let ids: Vec<String> = contents
        .lines()
        .map(|line| LogEntry::parse(line).unwrap().request_id)
        .collect();
    let expected: Vec<String> = (0..100).map(|i| format!("r{}", i)).collect();
    assert_eq!(ids, expected);
    assert_eq!(log.appended(), 100);
}

#[test]
fn test_batch_is_one_line_per_entry() {
    let (temp, log) = setup_temp_log();

    log.record(&[
        LogEntry::keyed(1, "batch", Method::Delete, "a"),
        LogEntry::keyed(1, "batch", Method::Delete, "b"),
    ]);
    log.record(&[]);
    log.sync();

    let contents = fs::read_to_string(temp.path().join(LOG_FILENAME)).unwrap();
    assert_eq!(contents, "1,\tbatch,\tDELETE,\ta\n1,\tbatch,\tDELETE,\tb\n");
}

#[test]
fn test_append_failure_is_counted() {
    let temp_dir = TempDir::new().unwrap();
    let writer = LogWriter::spawn(16, LogOverflowPolicy::Block).unwrap();

    // Parent directory does not exist
    writer.append(temp_dir.path().join("missing").join("logs.csv"), "x\n".to_string());
    writer.sync();

    assert_eq!(writer.stats().failures.load(Ordering::Relaxed), 1);
    assert_eq!(writer.stats().appended.load(Ordering::Relaxed), 0);
}

#[test]
fn test_writer_recovers_after_failure() {
    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("logs.csv");
    let writer = LogWriter::spawn(16, LogOverflowPolicy::Block).unwrap();

    writer.append(temp_dir.path().join("missing").join("logs.csv"), "lost\n".to_string());
    writer.append(good.clone(), "kept\n".to_string());
    writer.sync();

    assert_eq!(fs::read_to_string(good).unwrap(), "kept\n");
}

/// A FIFO blocks the writer thread inside `open` until a reader attaches,
/// so the channel fills while the first append is in flight.
#[cfg(unix)]
#[test]
fn test_drop_newest_counts_dropped_entries() {
    use std::io::Read;
    use std::process::Command;
    use std::thread;

    let temp_dir = TempDir::new().unwrap();
    let fifo = temp_dir.path().join("logs.csv");
    let status = Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());

    let mut writer = LogWriter::spawn(1, LogOverflowPolicy::DropNewest).unwrap();
    let posts = 20u64;
    for i in 0..posts {
        writer.append(fifo.clone(), format!("{}\n", i));
    }

    // One entry in flight plus one queued; the rest were dropped
    let dropped = writer.stats().dropped.load(Ordering::Relaxed);
    assert!(dropped >= posts - 2, "dropped only {}", dropped);

    let reader_path = fifo.clone();
    let reader = thread::spawn(move || {
        let mut contents = String::new();
        fs::File::open(reader_path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
    });

    writer.sync();
    let appended = writer.stats().appended.load(Ordering::Relaxed);
    let failures = writer.stats().failures.load(Ordering::Relaxed);
    assert_eq!(appended + dropped + failures, posts);
    assert_eq!(failures, 0);

    // Closing the writer's handle ends the reader at EOF
    writer.shutdown();
    let contents = reader.join().unwrap();
    assert_eq!(contents.lines().count() as u64, appended);
    assert!(contents.starts_with("0\n"));
}

#[test]
fn test_shutdown_drains_queue() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("logs.csv");
    let mut writer = LogWriter::spawn(1024, LogOverflowPolicy::DropNewest).unwrap();

    for i in 0..50 {
        writer.append(path.clone(), format!("{}\n", i));
    }
    writer.shutdown();

    let dropped = writer.stats().dropped.load(Ordering::Relaxed);
    let lines = fs::read_to_string(&path).unwrap().lines().count() as u64;
    assert_eq!(dropped, 0);
    assert_eq!(lines, 50);

    // Appends after shutdown are ignored
    writer.append(path.clone(), "late\n".to_string());
    writer.sync();
}
