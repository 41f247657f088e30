//! Logger configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default database file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "./sqlogs.sqlite";

/// Default name of the writer thread.
pub const DEFAULT_THREAD_NAME: &str = "sqlogs-writer";

/// What a producer does when a bounded queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the writer makes room
    #[default]
    Block,
    /// Drop the new entry
    Reject,
    /// Evict the oldest queued entry to make room
    DropOldest,
}

/// Queue bound and overflow behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued entries; `None` means unbounded
    pub capacity: Option<usize>,
    /// Only consulted when `capacity` is set
    pub overflow: OverflowPolicy,
}

impl QueueConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bounded queue. A capacity of zero is treated as one.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            overflow,
        }
    }

    pub(crate) fn effective_capacity(&self) -> Option<usize> {
        self.capacity.map(|c| c.max(1))
    }
}

/// Configuration for one logger instance.
///
/// Each instance owns its own queue, writer thread and database handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// SQLite file the `logs` table lives in
    pub db_path: PathBuf,
    /// Mirror non-silent messages to the console sink
    pub console: bool,
    pub queue: QueueConfig,
    pub thread_name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            console: true,
            queue: QueueConfig::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Disable console mirroring.
    pub fn no_console(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
