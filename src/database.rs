//! Database Module
//!
//! The public facade over one store directory.
//!
//! ## Responsibilities
//! - Serialize calls against the shard store (one mutex per store)
//! - Notify the write coalescer after every mutation
//! - Record routed calls in the operation log
//! - Run recovery on open, before any call is served

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::Result;
use crate::flush::{FlushPolicy, WriteCoalescer};
use crate::oplog::{
    now_millis, LogEntry, Method, OperationLog, RecoveryEngine, RecoveryResult, ReplayTarget,
    LOG_FILENAME,
};
use crate::protocol::{Command, KeyValue};
use crate::storage::{ArrayOutcome, ShardStore, WriteOrigin};

/// Point-in-time statistics of one store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub path: PathBuf,
    pub shards: usize,
    pub keys: usize,
    pub dirty_shards: usize,
    pub pending_writes: usize,
    pub flushes: u64,
    pub flush_failures: u64,
    pub log_appends: u64,
    pub log_failures: u64,
    pub log_dropped: u64,
}

/// One open store
///
/// ## Concurrency
/// Every call takes the store mutex for its whole duration, so calls on one
/// store are applied (and logged) in a single total order. Reads never wait
/// for disk: a flush in progress on the timer thread holds the same mutex
/// only while writing files.
pub struct Database {
    /// Store directory
    path: PathBuf,

    /// Debounced flush scheduling (stopped before the store is released)
    coalescer: WriteCoalescer,

    /// Append-only call log
    oplog: OperationLog,

    /// Shard state, shared weakly with the flush timer thread
    store: Arc<Mutex<ShardStore>>,

    /// What recovery did when this store was opened
    recovery: RecoveryResult,
}

/// Applies replayed log entries exactly like live calls
struct Replayer<'a> {
    store: &'a mut ShardStore,
    coalescer: &'a WriteCoalescer,
}

impl ReplayTarget for Replayer<'_> {
    fn replay_set(&mut self, key: &str, value: Value) {
        if self.store.set(key, value, WriteOrigin::External) {
            self.coalescer.record_write(self.store);
        }
    }

    fn replay_delete(&mut self, key: &str) {
        if self.store.delete(key) {
            self.coalescer.record_write(self.store);
        }
    }
}

impl Database {
    /// Open or create the store in `dir`
    ///
    /// On startup:
    /// 1. Load the index and every shard into memory
    /// 2. Start the flush timer
    /// 3. Replay and prune the operation log
    /// 4. Start the background log writer
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(Mutex::new(ShardStore::open(dir, config.max_keys_per_shard)?));
        let coalescer = WriteCoalescer::start(FlushPolicy::from(config), Arc::downgrade(&store))?;

        let recovery = {
            let mut guard = store.lock();
            let mut replayer = Replayer {
                store: &mut guard,
                coalescer: &coalescer,
            };
            RecoveryEngine::new(dir.join(LOG_FILENAME))
                .with_config(config)
                .run(&mut replayer)?
        };

        let oplog = OperationLog::open(dir, config)?;

        tracing::info!(
            path = %dir.display(),
            shards = store.lock().shard_count(),
            replayed = recovery.entries_replayed,
            "Store opened"
        );

        Ok(Self {
            path: dir.to_path_buf(),
            coalescer,
            oplog,
            store,
            recovery,
        })
    }

    // =========================================================================
    // Routed Entry Point
    // =========================================================================

    /// Execute a routed call and record it in the operation log.
    ///
    /// The call is logged under the store lock, right after it is applied, so
    /// the log order matches the apply order. Array mutations are logged as a
    /// SET of the resulting array.
    pub fn execute(&self, request_id: &str, command: Command) -> Result<Value> {
        let mut store = self.store.lock();
        let now = now_millis();

        let (result, entries) = match command {
            Command::All => (
                Ok(Value::Object(store.all())),
                vec![LogEntry::new(now, request_id, Method::All)],
            ),
            Command::Has { key } => (
                Ok(Value::Bool(store.has(&key))),
                vec![LogEntry::keyed(now, request_id, Method::Has, &key)],
            ),
            Command::Get { key } => (
                Ok(store.get(&key).cloned().unwrap_or(Value::Null)),
                vec![LogEntry::keyed(now, request_id, Method::Get, &key)],
            ),
            Command::Delete { key } => {
                let removed = self.delete_locked(&mut store, &key);
                (
                    Ok(Value::Bool(removed)),
                    vec![LogEntry::keyed(now, request_id, Method::Delete, &key)],
                )
            }
            Command::Set { key, value } => {
                let entry = LogEntry::set(now, request_id, &key, &value);
                (Ok(self.set_locked(&mut store, &key, value)), vec![entry])
            }
            Command::GetMany { keys } => {
                let entries: Vec<LogEntry> = keys
                    .iter()
                    .map(|key| LogEntry::keyed(now, request_id, Method::Get, key))
                    .collect();
                let values: Vec<Value> = store
                    .get_many(keys.as_slice())
                    .into_iter()
                    .map(|value| value.unwrap_or(Value::Null))
                    .collect();
                (Ok(Value::Array(values)), entries)
            }
            Command::SetMany { data } => {
                let entries: Vec<LogEntry> = data
                    .iter()
                    .map(|kv| LogEntry::set(now, request_id, &kv.key, &kv.value))
                    .collect();
                let values: Vec<Value> = data
                    .into_iter()
                    .map(|kv| self.set_locked(&mut store, &kv.key, kv.value))
                    .collect();
                (Ok(Value::Array(values)), entries)
            }
            Command::DeleteMany { keys } => {
                let entries: Vec<LogEntry> = keys
                    .iter()
                    .map(|key| LogEntry::keyed(now, request_id, Method::Delete, key))
                    .collect();
                let removed: Vec<Value> = keys
                    .iter()
                    .map(|key| Value::Bool(self.delete_locked(&mut store, key)))
                    .collect();
                (Ok(Value::Array(removed)), entries)
            }
            Command::Push { key, value } => {
                let outcome = self.array_locked(&mut store, |s| s.push(&key, value));
                self.array_result(&store, now, request_id, &key, outcome)
            }
            Command::Pop { key } => {
                let outcome = self.array_locked(&mut store, |s| s.pop(&key));
                self.array_result(&store, now, request_id, &key, outcome)
            }
            Command::Shift { key } => {
                let outcome = self.array_locked(&mut store, |s| s.shift(&key));
                self.array_result(&store, now, request_id, &key, outcome)
            }
            Command::Unshift { key, value } => {
                let outcome = self.array_locked(&mut store, |s| s.unshift(&key, value));
                self.array_result(&store, now, request_id, &key, outcome)
            }
            Command::Slice { key, start, end } => {
                let sliced = store
                    .slice(&key, start, end)
                    .map(|items| items.map_or(Value::Null, Value::Array));
                (sliced, vec![LogEntry::keyed(now, request_id, Method::Get, &key)])
            }
        };

        self.oplog.record(&entries);
        result
    }

    // =========================================================================
    // Typed Facade (not logged; used by embedders and replay)
    // =========================================================================

    /// Get the value of `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.lock().get(key).cloned()
    }

    /// Whether `key` exists
    pub fn has(&self, key: &str) -> bool {
        self.store.lock().has(key)
    }

    /// Get several keys, preserving order
    pub fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Option<Value>> {
        self.store.lock().get_many(keys)
    }

    /// Store `value` under `key`, returning it
    pub fn set(&self, key: &str, value: Value) -> Value {
        let mut store = self.store.lock();
        self.set_locked(&mut store, key, value)
    }

    /// Store several values, returning them in order
    pub fn set_many(&self, data: Vec<KeyValue>) -> Vec<Value> {
        let mut store = self.store.lock();
        data.into_iter()
            .map(|kv| self.set_locked(&mut store, &kv.key, kv.value))
            .collect()
    }

    /// Remove `key`; true if it existed
    pub fn delete(&self, key: &str) -> bool {
        let mut store = self.store.lock();
        self.delete_locked(&mut store, key)
    }

    /// Remove several keys
    pub fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<bool> {
        let mut store = self.store.lock();
        keys.iter()
            .map(|key| self.delete_locked(&mut store, key.as_ref()))
            .collect()
    }

    /// Every key/value pair
    pub fn all(&self) -> Map<String, Value> {
        self.store.lock().all()
    }

    /// Append to the array at `key` (absent → empty array)
    pub fn push(&self, key: &str, value: Value) -> Result<ArrayOutcome> {
        let mut store = self.store.lock();
        self.array_locked(&mut store, |s| s.push(key, value))
    }

    /// Remove the last element of the array at `key`
    pub fn pop(&self, key: &str) -> Result<ArrayOutcome> {
        let mut store = self.store.lock();
        self.array_locked(&mut store, |s| s.pop(key))
    }

    /// Remove the first element of the array at `key`
    pub fn shift(&self, key: &str) -> Result<ArrayOutcome> {
        let mut store = self.store.lock();
        self.array_locked(&mut store, |s| s.shift(key))
    }

    /// Prepend to the array at `key`
    pub fn unshift(&self, key: &str, value: Value) -> Result<ArrayOutcome> {
        let mut store = self.store.lock();
        self.array_locked(&mut store, |s| s.unshift(key, value))
    }

    /// Copy `[start, end)` of the array at `key`; `None` if absent
    pub fn slice(&self, key: &str, start: i64, end: Option<i64>) -> Result<Option<Vec<Value>>> {
        self.store.lock().slice(key, start, end)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush dirty shards now
    pub fn flush(&self) -> Result<()> {
        let mut store = self.store.lock();
        self.coalescer.flush_now(&mut store)
    }

    /// Wait until every logged call has reached the log file
    pub fn sync_log(&self) {
        self.oplog.sync();
    }

    /// Flush, drain the log and stop background threads
    pub fn close(mut self) -> Result<()> {
        self.coalescer.shutdown();
        let result = self.flush();
        self.oplog.sync();
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What recovery did at open
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Current statistics
    pub fn stats(&self) -> StoreStats {
        let store = self.store.lock();
        StoreStats {
            path: self.path.clone(),
            shards: store.shard_count(),
            keys: store.key_count(),
            dirty_shards: store.dirty_count(),
            pending_writes: self.coalescer.pending(),
            flushes: self.coalescer.flush_count(),
            flush_failures: self.coalescer.failure_count(),
            log_appends: self.oplog.appended(),
            log_failures: self.oplog.failures(),
            log_dropped: self.oplog.dropped(),
        }
    }

    // =========================================================================
    // Private Helpers (store lock held)
    // =========================================================================

    fn set_locked(&self, store: &mut ShardStore, key: &str, value: Value) -> Value {
        if store.set(key, value.clone(), WriteOrigin::External) {
            self.coalescer.record_write(store);
        }
        value
    }

    fn delete_locked(&self, store: &mut ShardStore, key: &str) -> bool {
        let removed = store.delete(key);
        if removed {
            self.coalescer.record_write(store);
        }
        removed
    }

    fn array_locked<F>(&self, store: &mut ShardStore, op: F) -> Result<ArrayOutcome>
    where
        F: FnOnce(&mut ShardStore) -> Result<ArrayOutcome>,
    {
        let outcome = op(store)?;
        self.coalescer.record_write(store);
        Ok(outcome)
    }

    /// Serialize an array outcome and build its log entry
    fn array_result(
        &self,
        store: &ShardStore,
        now: u64,
        request_id: &str,
        key: &str,
        outcome: Result<ArrayOutcome>,
    ) -> (Result<Value>, Vec<LogEntry>) {
        match outcome {
            Ok(outcome) => {
                let array = store.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
                let entry = LogEntry::set(now, request_id, key, &array);
                (serde_json::to_value(outcome).map_err(Into::into), vec![entry])
            }
            Err(e) => (Err(e), vec![LogEntry::keyed(now, request_id, Method::Get, key)]),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Timer thread first: it may be waiting on the store lock.
        self.coalescer.shutdown();
        let mut store = self.store.lock();
        if store.dirty_count() > 0 {
            if let Err(e) = self.coalescer.flush_now(&mut store) {
                tracing::error!(path = %self.path.display(), error = %e, "Final flush failed");
            }
        }
    }
}
