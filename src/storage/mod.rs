//! Storage Module
//!
//! Sharded JSON persistence with an in-memory mirror.
//!
//! ## Responsibilities
//! - Partition keys across bounded-size shard files
//! - Keep every shard's contents cached in memory (reads never hit disk)
//! - Track which shards are dirty since the last flush
//! - Persist dirty shards and the index sidecar on flush
//!
//! ## On-disk Layout
//! ```text
//! {store_dir}/
//!   ├── index.json      {"data_1.json": ["a", "b", ...], "data_2.json": [...]}
//!   ├── data_1.json     {"a": <json>, "b": <json>, ...}   (≤ max_keys_per_shard)
//!   └── data_2.json     {...}
//! ```

mod array;
mod files;
mod index;
mod store;

pub use array::ArrayOutcome;
pub use index::ShardIndex;
pub use store::{ShardStore, WriteOrigin};

/// File name of the index sidecar
pub const INDEX_FILENAME: &str = "index.json";

/// Generate the file name of the shard with the given ordinal
/// 3 → "data_3.json"
pub fn shard_file_name(ordinal: usize) -> String {
    format!("data_{}.json", ordinal)
}
