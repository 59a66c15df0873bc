//! Shard Store
//!
//! Owns the index, the in-memory cache of every shard, and the dirty set.
//!
//! ## Concurrency
//! No internal locking: callers serialize access (the `Database` keeps the
//! store behind a single mutex). Reads are served from the cache only; the
//! only disk writes happen in `flush()`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{KvError, Result};

use super::files::write_json;
use super::{ShardIndex, INDEX_FILENAME};

/// Who is asking for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A client call: a set to an equal value is skipped
    External,

    /// An array helper rewriting the whole array: always persisted
    Internal,
}

/// Sharded key/value state for one store directory
pub struct ShardStore {
    /// Store directory
    dir: PathBuf,

    /// Capacity of each shard
    max_keys_per_shard: usize,

    /// shard → keys
    index: ShardIndex,

    /// shard → (key → value); mirrors the shard files
    cache: HashMap<String, Map<String, Value>>,

    /// Shards mutated since the last successful flush
    dirty: BTreeSet<String>,
}

impl ShardStore {
    /// Open or create a store in `dir`.
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Load `index.json` (empty when absent)
    /// 3. Load every shard named in the index into the cache
    /// 4. Reconcile index and shard contents left diverged by a crash mid-flush
    pub fn open(dir: &Path, max_keys_per_shard: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let index_path = dir.join(INDEX_FILENAME);
        let mut index = if index_path.exists() {
            ShardIndex::load(&index_path)?
        } else {
            let index = ShardIndex::new();
            write_json(&index_path, &index.to_json())?;
            index
        };

        let mut cache = HashMap::with_capacity(index.shard_count());
        for name in index.shard_names() {
            cache.insert(name.to_string(), Self::load_shard(dir, name)?);
        }

        let mut store = Self {
            dir: dir.to_path_buf(),
            max_keys_per_shard,
            index: ShardIndex::new(),
            cache,
            dirty: BTreeSet::new(),
        };
        store.reconcile(&mut index);
        store.index = index;

        tracing::debug!(
            dir = %store.dir.display(),
            shards = store.index.shard_count(),
            keys = store.index.key_count(),
            "Shard store loaded"
        );

        Ok(store)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        let shard = self.index.lookup(key)?;
        self.cache.get(shard)?.get(key)
    }

    /// Whether `key` exists (regardless of its value)
    pub fn has(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Get several keys at once, preserving order
    pub fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Option<Value>> {
        keys.iter()
            .map(|key| self.get(key.as_ref()).cloned())
            .collect()
    }

    /// Merge every shard into one mapping
    pub fn all(&self) -> Map<String, Value> {
        let mut merged = Map::with_capacity(self.index.key_count());
        for name in self.index.shard_names() {
            if let Some(data) = self.cache.get(name) {
                for (key, value) in data {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` under `key`.
    ///
    /// Returns whether the store changed. An external set of a value equal to
    /// the current one is skipped entirely (no dirty mark, no flush request).
    pub fn set(&mut self, key: &str, value: Value, origin: WriteOrigin) -> bool {
        let shard = match self.index.lookup(key) {
            Some(shard) => shard.to_string(),
            None => {
                let shard = self.select_shard_for_insert();
                self.index.insert(&shard, key);
                shard
            }
        };

        let data = self.cache.entry(shard.clone()).or_default();

        if origin == WriteOrigin::External && data.get(key) == Some(&value) {
            return false;
        }

        data.insert(key.to_string(), value);
        self.dirty.insert(shard);
        true
    }

    /// Remove `key`. Returns false if it did not exist.
    ///
    /// The shard file is kept even if it becomes empty.
    pub fn delete(&mut self, key: &str) -> bool {
        let Some(shard) = self.index.remove(key) else {
            return false;
        };

        if let Some(data) = self.cache.get_mut(&shard) {
            data.shift_remove(key);
        }
        self.dirty.insert(shard);
        true
    }

    /// First-fit shard selection, creating a new shard when all are full
    fn select_shard_for_insert(&mut self) -> String {
        if let Some(shard) = self.index.first_with_capacity(self.max_keys_per_shard) {
            return shard.to_string();
        }

        let shard = self.index.create_shard();
        self.cache.insert(shard.clone(), Map::new());
        shard
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every dirty shard, then the index, then clear the dirty set.
    ///
    /// Returns the number of shard files written. On error the dirty set is
    /// left intact so the next flush retries the same shards.
    pub fn flush(&mut self) -> Result<usize> {
        if self.dirty.is_empty() {
            return Ok(0);
        }

        for shard in &self.dirty {
            let empty = Map::new();
            let data = self.cache.get(shard).unwrap_or(&empty);
            write_json(&self.dir.join(shard), data)?;
        }

        write_json(&self.dir.join(INDEX_FILENAME), &self.index.to_json())?;

        let written = self.dirty.len();
        self.dirty.clear();
        Ok(written)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The shard index
    pub fn index(&self) -> &ShardIndex {
        &self.index
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.index.shard_count()
    }

    /// Number of keys
    pub fn key_count(&self) -> usize {
        self.index.key_count()
    }

    /// Names of shards awaiting a flush
    pub fn dirty_shards(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Number of shards awaiting a flush
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Load one shard file; missing or unparsable files are fatal
    fn load_shard(dir: &Path, name: &str) -> Result<Map<String, Value>> {
        let corrupt = |reason: String| KvError::CorruptShard {
            shard: name.to_string(),
            reason,
        };

        let contents = fs::read_to_string(dir.join(name)).map_err(|e| corrupt(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))
    }

    /// Make the cache and the index agree after a crash between shard and
    /// index writes. Operation log replay restores whatever is dropped here.
    fn reconcile(&mut self, index: &mut ShardIndex) {
        let names: Vec<String> = index.shard_names().map(str::to_string).collect();

        for name in names {
            let listed = index.keys(&name).unwrap_or_default().to_vec();
            let data = self.cache.entry(name.clone()).or_default();

            for key in listed.iter().filter(|key| !data.contains_key(key.as_str())) {
                tracing::warn!(shard = %name, key = %key, "Indexed key missing from shard file, dropping");
                index.remove(key);
            }

            let before = data.len();
            data.retain(|key, _| index.lookup(key) == Some(name.as_str()));
            if data.len() != before {
                tracing::warn!(
                    shard = %name,
                    dropped = before - data.len(),
                    "Shard file holds keys absent from the index, dropping"
                );
            }
        }
    }
}
