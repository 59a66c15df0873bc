//! # ShardKV
//!
//! An embedded, file-backed JSON key-value store with:
//! - Values sharded across JSON files of bounded key count
//! - Debounced, coalesced flushing of dirty shards
//! - An operation log replayed at startup for crash recovery
//! - Array operations on stored values
//! - An optional TCP front end
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                TCP Server / embedding code                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Store Manager                            │
//! │              (one Database per store path)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!     ┌─────────────────┼──────────────────┐
//!     │                 │                  │
//!     ▼                 ▼                  ▼
//! ┌──────────┐   ┌─────────────┐   ┌───────────────┐
//! │  Op Log  │   │ Shard Store │◄──│Write Coalescer│
//! │(logs.csv)│   │  (Mutex)    │   │ (timer thread)│
//! └────┬─────┘   └──────┬──────┘   └───────────────┘
//!      │                │
//!      │ replay         ▼
//!      └────────► index.json + data_N.json
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod database;
pub mod flush;
pub mod manager;
pub mod network;
pub mod oplog;
pub mod protocol;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, LogOverflowPolicy};
pub use database::{Database, StoreStats};
pub use error::{KvError, Result};
pub use manager::StoreManager;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ShardKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
