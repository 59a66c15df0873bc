//! Background log writer
//!
//! Appends are posted to a dedicated thread over a bounded channel. The
//! caller never waits for the write itself; failures are logged and counted
//! on the writer's stats, never reported back to the caller.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::config::LogOverflowPolicy;
use crate::error::{KvError, Result};

/// Message posted to the writer thread
enum LogMessage {
    /// Append `data` to the file at `path`
    Append { path: PathBuf, data: String },

    /// Reply once every earlier message has been handled
    Barrier(Sender<()>),
}

/// Counters exposed by the writer thread
#[derive(Debug, Default)]
pub struct LogWriterStats {
    /// Appends written successfully
    pub appended: AtomicU64,

    /// Appends that failed with an I/O error
    pub failures: AtomicU64,

    /// Appends discarded because the channel was full
    pub dropped: AtomicU64,
}

/// Handle to the background append thread
pub struct LogWriter {
    sender: Option<Sender<LogMessage>>,
    overflow: LogOverflowPolicy,
    stats: Arc<LogWriterStats>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LogWriter {
    /// Spawn the writer thread with a channel of `capacity` messages
    pub fn spawn(capacity: usize, overflow: LogOverflowPolicy) -> Result<Self> {
        let (sender, receiver) = channel::bounded(capacity);
        let stats = Arc::new(LogWriterStats::default());

        let thread_stats = Arc::clone(&stats);
        let thread = thread::Builder::new()
            .name("shardkv-oplog".to_string())
            .spawn(move || writer_loop(receiver, thread_stats))
            .map_err(|e| KvError::Storage(format!("Failed to spawn log writer thread: {}", e)))?;

        Ok(Self {
            sender: Some(sender),
            overflow,
            stats,
            thread: Some(thread),
        })
    }

    /// Post `data` for appending to `path` (fire-and-forget)
    pub fn append(&self, path: PathBuf, data: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        let message = LogMessage::Append { path, data };

        match self.overflow {
            LogOverflowPolicy::Block => {
                if sender.send(message).is_err() {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Log writer thread is gone, entry lost");
                }
            }
            LogOverflowPolicy::DropNewest => match sender.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Log channel full, entry dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Log writer thread is gone, entry lost");
                }
            },
        }
    }

    /// Block until every append posted so far has been handled
    pub fn sync(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = channel::bounded(1);
        if sender.send(LogMessage::Barrier(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Writer counters
    pub fn stats(&self) -> &LogWriterStats {
        &self.stats
    }

    /// Close the channel and wait for queued appends to drain
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Writer thread: owns the open log file until the channel closes
fn writer_loop(receiver: Receiver<LogMessage>, stats: Arc<LogWriterStats>) {
    let mut open: Option<(PathBuf, File)> = None;

    for message in receiver {
        match message {
            LogMessage::Append { path, data } => match append(&mut open, path, data.as_bytes()) {
                Ok(()) => {
                    stats.appended.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %e, "Operation log append failed");
                    // reopen on the next append
                    open = None;
                }
            },
            LogMessage::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn append(open: &mut Option<(PathBuf, File)>, path: PathBuf, data: &[u8]) -> std::io::Result<()> {
    let reuse = matches!(open, Some((current, _)) if *current == path);
    if !reuse {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *open = Some((path, file));
    }

    match open {
        Some((_, file)) => file.write_all(data),
        None => Ok(()),
    }
}
