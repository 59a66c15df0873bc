//! Write Coalescer
//!
//! One coalescer per store. Writers call `record_write` while holding the
//! store lock; a background thread sleeps until the debounce deadline and
//! then flushes the store.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::storage::ShardStore;

use super::FlushState;

/// Debounce-with-hard-cap parameters
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Quiescence period before a timer flush
    pub debounce: Duration,

    /// Writes since the last flush that force an inline flush
    pub max_pending: usize,
}

impl From<&Config> for FlushPolicy {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.flush_debounce,
            max_pending: config.flush_max_pending,
        }
    }
}

/// State shared between writers and the timer thread
struct Shared {
    state: Mutex<FlushState>,
    wake: Condvar,

    /// Writes since the last flush (only touched with the store lock held)
    pending: AtomicUsize,

    /// Flushes that wrote at least one shard
    flushes: AtomicU64,

    /// Flushes that failed
    failures: AtomicU64,
}

impl Shared {
    /// Flush the store, recording the outcome. Caller holds the store lock.
    fn flush(&self, store: &mut ShardStore) -> Result<()> {
        self.pending.store(0, Ordering::Relaxed);

        match store.flush() {
            Ok(0) => Ok(()),
            Ok(written) => {
                self.flushes.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(dir = %store.dir().display(), shards = written, "Flushed dirty shards");
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(dir = %store.dir().display(), error = %e, "Flush failed, dirty shards kept");
                Err(e)
            }
        }
    }
}

/// Debounced flush scheduler for one store
pub struct WriteCoalescer {
    policy: FlushPolicy,
    shared: Arc<Shared>,
    timer: Option<thread::JoinHandle<()>>,
}

impl WriteCoalescer {
    /// Start the timer thread for `store`.
    ///
    /// The thread holds only a weak reference; it exits when the coalescer is
    /// shut down.
    pub fn start(policy: FlushPolicy, store: Weak<Mutex<ShardStore>>) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(FlushState::Idle),
            wake: Condvar::new(),
            pending: AtomicUsize::new(0),
            flushes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("shardkv-flush".to_string())
            .spawn(move || timer_loop(thread_shared, store, policy.debounce))
            .map_err(|e| KvError::Storage(format!("Failed to spawn flush thread: {}", e)))?;

        Ok(Self {
            policy,
            shared,
            timer: Some(timer),
        })
    }

    /// Note that a shard of `store` became dirty.
    ///
    /// Flushes inline once the hard cap is reached, otherwise (re)arms the
    /// debounce timer. Flush errors are logged, not returned.
    pub fn record_write(&self, store: &mut ShardStore) {
        let pending = self.shared.pending.fetch_add(1, Ordering::Relaxed) + 1;

        if pending >= self.policy.max_pending {
            let _ = self.flush_now(store);
            return;
        }

        let deadline = Instant::now() + self.policy.debounce;
        let mut state = self.shared.state.lock();
        *state = state.on_write(deadline);
        self.shared.wake.notify_one();
    }

    /// Flush immediately on the calling thread. Caller holds the store lock.
    pub fn flush_now(&self, store: &mut ShardStore) -> Result<()> {
        let result = self.shared.flush(store);

        let mut state = self.shared.state.lock();
        *state = state.on_forced_flush();
        result
    }

    /// Stop the timer thread and wait for it to exit
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock();
            *state = state.on_stop();
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.timer.take() {
            let _ = handle.join();
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current timer state
    pub fn state(&self) -> FlushState {
        *self.shared.state.lock()
    }

    /// Writes recorded since the last flush
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    /// Number of flushes that wrote at least one shard
    pub fn flush_count(&self) -> u64 {
        self.shared.flushes.load(Ordering::Relaxed)
    }

    /// Number of failed flushes
    pub fn failure_count(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// The configured policy
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }
}

impl Drop for WriteCoalescer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer thread: waits for a scheduled deadline, then flushes.
///
/// A failed flush re-arms the timer, so kept dirty shards are retried one
/// debounce later. The state lock is never held while the store lock is taken.
fn timer_loop(shared: Arc<Shared>, store: Weak<Mutex<ShardStore>>, debounce: Duration) {
    let mut state = shared.state.lock();

    loop {
        match *state {
            FlushState::Stopped => return,
            FlushState::Idle | FlushState::Flushing { .. } => shared.wake.wait(&mut state),
            FlushState::Scheduled { deadline } => {
                if Instant::now() < deadline {
                    shared.wake.wait_until(&mut state, deadline);
                    continue;
                }

                *state = state.on_timer_fired();
                let flushed = MutexGuard::unlocked(&mut state, || match store.upgrade() {
                    Some(store) => {
                        let mut store = store.lock();
                        shared.flush(&mut store)
                    }
                    None => Ok(()),
                });
                *state = state.on_flush_complete();
                if flushed.is_err() {
                    *state = state.on_write(Instant::now() + debounce);
                }
            }
        }
    }
}
