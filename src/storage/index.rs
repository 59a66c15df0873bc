//! Shard Index
//!
//! Maps every shard (in creation order) to the ordered list of keys it holds.
//!
//! ## Invariant
//! Every key appears in exactly one shard's list. A direct key → shard map is
//! kept alongside the lists so lookups do not scan every shard.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{KvError, Result};

use super::shard_file_name;

/// One shard and the keys physically present in it
#[derive(Debug, Clone)]
struct ShardKeys {
    name: String,
    keys: Vec<String>,
}

/// Directory-wide shard → key-list mapping
#[derive(Debug, Clone, Default)]
pub struct ShardIndex {
    /// Shards ordered by creation
    shards: Vec<ShardKeys>,

    /// key → position of the owning shard in `shards`
    owners: HashMap<String, usize>,
}

impl ShardIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the index sidecar.
    ///
    /// Fails with `CorruptIndex` when the file is not a JSON object of string
    /// lists or when a key is listed under more than one shard.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let corrupt = |reason: String| KvError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let map: Map<String, Value> =
            serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))?;

        let mut index = Self::new();
        for (name, keys) in map {
            let keys: Vec<String> = serde_json::from_value(keys)
                .map_err(|e| corrupt(format!("shard {}: {}", name, e)))?;

            let position = index.shards.len();
            for key in &keys {
                if index.owners.insert(key.clone(), position).is_some() {
                    return Err(corrupt(format!("key {:?} listed in more than one shard", key)));
                }
            }
            index.shards.push(ShardKeys { name, keys });
        }

        Ok(index)
    }

    /// Serialize to the on-disk shape (shard order preserved)
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .shards
            .iter()
            .map(|shard| {
                let keys = shard.keys.iter().cloned().map(Value::String).collect();
                (shard.name.clone(), Value::Array(keys))
            })
            .collect();
        Value::Object(map)
    }

    /// Name of the shard holding `key`
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.owners
            .get(key)
            .map(|&position| self.shards[position].name.as_str())
    }

    /// Whether `key` is present in any shard
    pub fn contains(&self, key: &str) -> bool {
        self.owners.contains_key(key)
    }

    /// Keys held by `shard`, in insertion order
    pub fn keys(&self, shard: &str) -> Option<&[String]> {
        self.position(shard).map(|p| self.shards[p].keys.as_slice())
    }

    /// Shard names in creation order
    pub fn shard_names(&self) -> impl Iterator<Item = &str> {
        self.shards.iter().map(|shard| shard.name.as_str())
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of keys across all shards
    pub fn key_count(&self) -> usize {
        self.owners.len()
    }

    /// First shard (creation order) with fewer than `capacity` keys.
    ///
    /// Ties always resolve by creation order, never by key count, which keeps
    /// consecutive inserts in the same file.
    pub fn first_with_capacity(&self, capacity: usize) -> Option<&str> {
        self.shards
            .iter()
            .find(|shard| shard.keys.len() < capacity)
            .map(|shard| shard.name.as_str())
    }

    /// Register a new, empty shard and return its name
    pub fn create_shard(&mut self) -> String {
        let mut ordinal = self.shards.len() + 1;
        while self.position(&shard_file_name(ordinal)).is_some() {
            ordinal += 1;
        }

        let name = shard_file_name(ordinal);
        self.shards.push(ShardKeys {
            name: name.clone(),
            keys: Vec::new(),
        });
        name
    }

    /// Append `key` to `shard`. Returns false if the key was already indexed
    /// or the shard is unknown.
    pub fn insert(&mut self, shard: &str, key: &str) -> bool {
        if self.owners.contains_key(key) {
            return false;
        }
        let Some(position) = self.position(shard) else {
            return false;
        };

        self.shards[position].keys.push(key.to_string());
        self.owners.insert(key.to_string(), position);
        true
    }

    /// Remove `key` from whichever shard holds it, returning that shard's name
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.owners.remove(key)?;
        let shard = &mut self.shards[position];
        shard.keys.retain(|k| k != key);
        Some(shard.name.clone())
    }

    fn position(&self, shard: &str) -> Option<usize> {
        self.shards.iter().position(|s| s.name == shard)
    }
}
