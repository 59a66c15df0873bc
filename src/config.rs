//! Configuration for ShardKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a ShardKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory under which every store path is resolved.
    /// Internal structure of one store:
    ///   {storage_root}/{path}/
    ///     ├── index.json       (shard → key list)
    ///     ├── data_<N>.json    (one file per shard)
    ///     └── logs.csv         (operation log)
    pub storage_root: PathBuf,

    /// Maximum number of keys held by a single shard file
    pub max_keys_per_shard: usize,

    // -------------------------------------------------------------------------
    // Write Coalescer Configuration
    // -------------------------------------------------------------------------
    /// Quiescence period before dirty shards are flushed
    pub flush_debounce: Duration,

    /// Number of writes since the last flush that forces an immediate flush
    pub flush_max_pending: usize,

    // -------------------------------------------------------------------------
    // Operation Log Configuration
    // -------------------------------------------------------------------------
    /// How many trailing SET/DELETE entries are replayed at startup
    pub replay_request_count: usize,

    /// Log entries older than this are pruned at startup
    pub log_retention: Duration,

    /// Capacity of the channel feeding the background log writer
    pub log_channel_capacity: usize,

    /// What a caller does when the log channel is full
    pub log_overflow: LogOverflowPolicy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Shared secret clients must present before issuing requests
    pub auth_token: Option<String>,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,
}

/// Behaviour of the log channel when the background writer falls behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOverflowPolicy {
    /// Caller waits for room in the channel (no entry is ever lost)
    Block,

    /// Entry is discarded and counted; the caller never waits
    DropNewest,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./storage"),
            max_keys_per_shard: 100,
            flush_debounce: Duration::from_millis(250),
            flush_max_pending: 250,
            replay_request_count: 500,
            log_retention: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            log_channel_capacity: 65_536,
            log_overflow: LogOverflowPolicy::Block,
            listen_addr: "127.0.0.1:7878".to_string(),
            auth_token: None,
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the store cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_keys_per_shard == 0 {
            return Err(KvError::Config(
                "max_keys_per_shard must be at least 1".to_string(),
            ));
        }
        if self.flush_max_pending == 0 {
            return Err(KvError::Config(
                "flush_max_pending must be at least 1".to_string(),
            ));
        }
        if self.log_channel_capacity == 0 {
            return Err(KvError::Config(
                "log_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage root (parent of every store directory)
    pub fn storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_root = path.into();
        self
    }

    /// Set the shard capacity
    pub fn max_keys_per_shard(mut self, count: usize) -> Self {
        self.config.max_keys_per_shard = count;
        self
    }

    /// Set the debounce period
    pub fn flush_debounce(mut self, period: Duration) -> Self {
        self.config.flush_debounce = period;
        self
    }

    /// Set the hard cap on writes between flushes
    pub fn flush_max_pending(mut self, count: usize) -> Self {
        self.config.flush_max_pending = count;
        self
    }

    /// Set how many SET/DELETE entries are replayed on open
    pub fn replay_request_count(mut self, count: usize) -> Self {
        self.config.replay_request_count = count;
        self
    }

    /// Set the log retention window
    pub fn log_retention(mut self, window: Duration) -> Self {
        self.config.log_retention = window;
        self
    }

    /// Set the log channel capacity
    pub fn log_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.log_channel_capacity = capacity;
        self
    }

    /// Set the log overflow policy
    pub fn log_overflow(mut self, policy: LogOverflowPolicy) -> Self {
        self.config.log_overflow = policy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Require clients to authenticate with this token
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth_token = Some(token.into());
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
