//! Recovery Engine
//!
//! Runs once per store at open, before the store accepts calls:
//! 1. No log file → create it with a header (`Fresh`)
//! 2. Otherwise read every line, replay the trailing SET/DELETE entries in
//!    their original order, then rewrite the log keeping only entries inside
//!    the retention window (`Replayed`)
//!
//! Malformed lines are skipped, never fatal.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::Config;
use crate::error::Result;

use super::entry::{now_millis, LogEntry, Method, LOG_HEADER};

/// Receiver of replayed mutations
pub trait ReplayTarget {
    /// Apply a logged SET
    fn replay_set(&mut self, key: &str, value: Value);

    /// Apply a logged DELETE
    fn replay_delete(&mut self, key: &str);
}

/// What recovery found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// The log did not exist and was created
    Fresh,

    /// The log existed and was replayed and pruned
    Replayed,
}

/// Result of a recovery run
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    /// Fresh or Replayed
    pub state: RecoveryState,

    /// Entry lines parsed successfully
    pub entries_read: usize,

    /// Lines skipped as malformed (bad field count, timestamp, method or value)
    pub entries_malformed: usize,

    /// SET/DELETE entries applied
    pub entries_replayed: usize,

    /// Entries kept in the rewritten log
    pub entries_retained: usize,

    /// Entries removed for being older than the retention window
    pub entries_pruned: usize,

    /// Wall time spent
    pub elapsed: Duration,
}

impl RecoveryResult {
    fn fresh(elapsed: Duration) -> Self {
        Self {
            state: RecoveryState::Fresh,
            entries_read: 0,
            entries_malformed: 0,
            entries_replayed: 0,
            entries_retained: 0,
            entries_pruned: 0,
            elapsed,
        }
    }
}

/// Replays and compacts one store's operation log
pub struct RecoveryEngine {
    log_path: PathBuf,

    /// Trailing SET/DELETE entries replayed
    request_count: usize,

    /// Maximum age of retained entries
    retention: Duration,
}

impl RecoveryEngine {
    /// Recovery for the log at `log_path` with default limits
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            log_path: log_path.into(),
            request_count: defaults.replay_request_count,
            retention: defaults.log_retention,
        }
    }

    /// Take the replay count and retention window from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.request_count = config.replay_request_count;
        self.retention = config.log_retention;
        self
    }

    /// Set the number of trailing SET/DELETE entries to replay
    pub fn with_request_count(mut self, count: usize) -> Self {
        self.request_count = count;
        self
    }

    /// Set the retention window
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run recovery against `target` using the current time
    pub fn run<T: ReplayTarget + ?Sized>(&self, target: &mut T) -> Result<RecoveryResult> {
        self.run_at(now_millis(), target)
    }

    /// Run recovery as if the current time were `now` (unix millis)
    pub fn run_at<T: ReplayTarget + ?Sized>(&self, now: u64, target: &mut T) -> Result<RecoveryResult> {
        let start = Instant::now();

        if !self.log_path.exists() {
            write_log(&self.log_path, std::iter::empty())?;
            tracing::info!(log = %self.log_path.display(), "No operation log, created a fresh one");
            return Ok(RecoveryResult::fresh(start.elapsed()));
        }

        let contents = fs::read_to_string(&self.log_path)?;

        let mut entries: Vec<(&str, LogEntry)> = Vec::new();
        let mut malformed = 0;
        for line in contents.lines() {
            if line.trim().is_empty() || line.starts_with("Timestamp") {
                continue;
            }
            match LogEntry::parse(line) {
                Ok(entry) => entries.push((line, entry)),
                Err(reason) => {
                    malformed += 1;
                    tracing::warn!(log = %self.log_path.display(), %reason, "Skipping malformed log line");
                }
            }
        }

        // Replay: trailing SET/DELETE entries, oldest first
        let replayable: Vec<&LogEntry> = entries
            .iter()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.is_replayable())
            .collect();
        let skip = replayable.len().saturating_sub(self.request_count);

        let mut replayed = 0;
        for entry in &replayable[skip..] {
            if self.replay_entry(entry, target) {
                replayed += 1;
            } else {
                malformed += 1;
            }
        }

        // Prune: keep lines inside the retention window, verbatim
        let threshold = now.saturating_sub(self.retention.as_millis() as u64);
        let retained: Vec<&str> = entries
            .iter()
            .filter(|(_, entry)| entry.timestamp >= threshold)
            .map(|(line, _)| *line)
            .collect();
        write_log(&self.log_path, retained.iter().copied())?;

        let result = RecoveryResult {
            state: RecoveryState::Replayed,
            entries_read: entries.len(),
            entries_malformed: malformed,
            entries_replayed: replayed,
            entries_retained: retained.len(),
            entries_pruned: entries.len() - retained.len(),
            elapsed: start.elapsed(),
        };

        tracing::info!(
            log = %self.log_path.display(),
            replayed = result.entries_replayed,
            malformed = result.entries_malformed,
            retained = result.entries_retained,
            pruned = result.entries_pruned,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Operation log recovery complete"
        );

        Ok(result)
    }

    /// Apply one entry; false if its key or value is unusable
    fn replay_entry<T: ReplayTarget + ?Sized>(&self, entry: &LogEntry, target: &mut T) -> bool {
        let Some(key) = entry.key.as_deref() else {
            return false;
        };

        match entry.method {
            Method::Set => {
                let parsed = entry
                    .value
                    .as_deref()
                    .map(|raw| serde_json::from_str::<Value>(raw));
                match parsed {
                    Some(Ok(value)) => {
                        target.replay_set(key, value);
                        true
                    }
                    _ => {
                        tracing::warn!(key = %key, "Skipping SET with unparsable value");
                        false
                    }
                }
            }
            Method::Delete => {
                target.replay_delete(key);
                true
            }
            _ => false,
        }
    }
}

/// Replace the log with a header followed by `lines`
fn write_log<'a>(path: &Path, lines: impl Iterator<Item = &'a str>) -> Result<()> {
    let tmp_path = path.with_extension("csv.tmp");

    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writeln!(writer, "{}", LOG_HEADER)?;
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}
