//! sqlogs Core Library
//!
//! Structured logging into a SQLite table that grows a column for every new
//! metadata key.
//!
//! ## Overview
//!
//! Log calls may come from any number of threads. Each call is parsed on the
//! caller's thread, optionally mirrored to the console, and queued. A single
//! writer thread then persists entries one at a time, in call order:
//!
//! ```text
//! Logger::log(args) ──► IngestQueue ──► RecordWriter::persist ──► SchemaManager::reconcile_columns
//!                       (FIFO, one consumer)                      └─► INSERT INTO logs
//! ```
//!
//! ## Core Principles
//!
//! - **Single writer**: exactly one thread touches the database
//! - **Ordered**: rows appear in the order calls were made
//! - **Self-migrating**: unknown metadata keys become new `text` columns
//! - **Fire-and-forget**: callers never wait on storage
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlogs_core::{sqlog, Logger};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = Logger::open("./sqlogs.sqlite")?;
//!
//!     sqlog!(logger, "Hello");
//!     sqlog!(logger, "Uno", ["Dos"], {"three": "Tres"});
//!     sqlog!(logger, "Payment failed", {"sqlogs": {
//!         "group": "BILLING",
//!         "level": "ERROR",
//!         "meta": {"invoiceId": "inv-7"}
//!     }});
//!
//!     logger.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod layer;
pub mod logger;
pub mod queue;
pub mod schema;
pub mod storage;
pub mod writer;

// Re-exports
pub use config::{LoggerConfig, OverflowPolicy, QueueConfig};
pub use entry::{format_message, LogEntry, LogOptions, Meta, OPTIONS_KEY};
pub use error::{LoggerError, LoggerResult, SchemaError, StorageError};
pub use layer::SqlogsLayer;
pub use logger::{ConsoleSink, Logger, LoggerBuilder, StdoutSink};
pub use queue::{IngestQueue, QueueState, WriteFailure, WriterStats};
pub use schema::SchemaManager;
pub use storage::{Row, SqlValue, SqliteStorage, Storage};
pub use writer::{Persist, PersistOutcome, RecordWriter};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

/// Log JSON-literal arguments through a [`Logger`].
///
/// Each argument is one token tree handed to `serde_json::json!`, so string,
/// array and object literals work as-is; wrap other expressions in
/// parentheses. A trailing `{"sqlogs": {...}}` object sets the call options.
///
/// ```ignore
/// sqlog!(logger, "Uno", ["Dos"], {"three": "Tres"});
/// sqlog!(logger, "retry", (attempt + 1), {"sqlogs": {"level": "WARN"}});
/// ```
#[macro_export]
macro_rules! sqlog {
    ($logger:expr $(, $arg:tt)* $(,)?) => {
        $logger.log(::std::vec![$($crate::__private::serde_json::json!($arg)),*])
    };
}
