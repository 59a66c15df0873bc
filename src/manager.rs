//! Store Manager
//!
//! Owns every open store under the storage root, keyed by relative path.
//! Each path maps to exactly one `Database` for the life of the manager.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::database::{Database, StoreStats};
use crate::error::{KvError, Result};

/// Registry of open stores
pub struct StoreManager {
    config: Config,
    stores: Mutex<HashMap<String, Arc<Database>>>,
}

impl StoreManager {
    /// Create a manager rooted at `config.storage_root`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_root)?;

        Ok(Self {
            config,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Get the store at `path`, opening (and recovering) it on first use.
    ///
    /// The registry lock is held across the open so concurrent callers never
    /// open the same directory twice. A failed open is not cached.
    pub fn open(&self, path: &str) -> Result<Arc<Database>> {
        let path = validate_store_path(path)?;

        let mut stores = self.stores.lock();
        if let Some(db) = stores.get(&path) {
            return Ok(Arc::clone(db));
        }

        let dir = self.config.storage_root.join(&path);
        let db = Arc::new(Database::open(&dir, &self.config)?);
        stores.insert(path, Arc::clone(&db));
        Ok(db)
    }

    /// Paths of the stores opened so far
    pub fn stores(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.stores.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Statistics for every open store, sorted by path
    pub fn stats(&self) -> Vec<StoreStats> {
        let stores: Vec<Arc<Database>> = self.stores.lock().values().cloned().collect();
        let mut stats: Vec<StoreStats> = stores.iter().map(|db| db.stats()).collect();
        stats.sort_by(|a, b| a.path.cmp(&b.path));
        stats
    }

    /// Flush every open store; returns the first error after trying all
    pub fn flush_all(&self) -> Result<()> {
        let stores: Vec<Arc<Database>> = self.stores.lock().values().cloned().collect();

        let mut first_error = None;
        for db in stores {
            if let Err(e) = db.flush() {
                tracing::error!(path = %db.path().display(), error = %e, "Flush failed");
                first_error.get_or_insert(e);
            }
            db.sync_log();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush and release every store
    pub fn close(&self) -> Result<()> {
        let result = self.flush_all();
        self.stores.lock().clear();
        result
    }

    /// The configuration stores are opened with
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Validate a store path and return its normalized `a/b` form.
///
/// Paths are relative to the storage root. Empty and absolute paths, and
/// paths with `.` or `..` components, are rejected.
pub fn validate_store_path(path: &str) -> Result<String> {
    let invalid = |reason: &str| KvError::InvalidPath(format!("{:?}: {}", path, reason));

    if path.contains('\0') {
        return Err(invalid("contains NUL"));
    }
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(invalid("must be relative"));
    }

    let mut components = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" => continue,
            "." => return Err(invalid("'.' components are not allowed")),
            ".." => return Err(invalid("must not leave the storage root")),
            _ => components.push(component),
        }
    }

    if components.is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(components.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
