//! Write Coalescer Module
//!
//! Batches dirty-shard flushes with a debounce-with-hard-cap policy.
//!
//! ## Policy
//! - Every write (re)arms a quiescence timer (`flush_debounce`)
//! - When the timer fires, the dirty set is flushed by a background thread
//! - After `flush_max_pending` writes without a flush, the writing caller
//!   flushes immediately, regardless of the timer
//!
//! Flush failures are logged and counted, never returned to the writer; the
//! dirty set survives a failed flush and is retried on the next one.

mod coalescer;
mod state;

pub use coalescer::{FlushPolicy, WriteCoalescer};
pub use state::FlushState;
