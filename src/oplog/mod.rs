//! Operation Log Module
//!
//! Append-only record of every facade call, used to rebuild state lost
//! between the last flush and a crash.
//!
//! ## Responsibilities
//! - Record one line per call (batch calls expand to one line per element)
//! - Append asynchronously through a background writer thread
//! - Replay trailing SET/DELETE entries at startup
//! - Prune entries older than the retention window at startup
//!
//! ## File Format (`logs.csv`)
//! ```text
//! Timestamp,\tRequestId,\tMethod,\tKey,\tValue\t
//! 1718000000000,\treq-1,\tSET,\tuser:1,\t{"name":"ada"}
//! 1718000000005,\treq-2,\tGET,\tuser:1
//! 1718000000009,\treq-3,\tDELETE,\tuser:1
//! 1718000000012,\treq-4,\tALL
//! ```

mod entry;
mod recovery;
mod writer;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

pub use entry::{now_millis, LogEntry, Method, FIELD_SEPARATOR, LOG_HEADER};
pub use recovery::{RecoveryEngine, RecoveryResult, RecoveryState, ReplayTarget};
pub use writer::{LogWriter, LogWriterStats};

use crate::config::Config;
use crate::error::Result;

/// File name of the operation log inside a store directory
pub const LOG_FILENAME: &str = "logs.csv";

/// A store's operation log: the log file plus its background writer
pub struct OperationLog {
    path: PathBuf,
    writer: LogWriter,
}

impl OperationLog {
    /// Start logging to `{dir}/logs.csv`.
    ///
    /// Recovery must already have run: it rewrites the file and assumes no
    /// concurrent appender.
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        let writer = LogWriter::spawn(config.log_channel_capacity, config.log_overflow)?;
        Ok(Self {
            path: dir.join(LOG_FILENAME),
            writer,
        })
    }

    /// Post `entries` to the background writer (fire-and-forget)
    pub fn record(&self, entries: &[LogEntry]) {
        if entries.is_empty() {
            return;
        }

        let mut data = String::new();
        for entry in entries {
            data.push_str(&entry.to_line());
            data.push('\n');
        }
        self.writer.append(self.path.clone(), data);
    }

    /// Wait until every recorded entry has reached the file
    pub fn sync(&self) {
        self.writer.sync();
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends written successfully
    pub fn appended(&self) -> u64 {
        self.writer.stats().appended.load(Ordering::Relaxed)
    }

    /// Appends that failed
    pub fn failures(&self) -> u64 {
        self.writer.stats().failures.load(Ordering::Relaxed)
    }

    /// Appends dropped on overflow
    pub fn dropped(&self) -> u64 {
        self.writer.stats().dropped.load(Ordering::Relaxed)
    }
}
