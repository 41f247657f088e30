//! Public logger handle.
//!
//! [`Logger`] is cheap to clone; every clone feeds the same queue and writer
//! thread. Log calls parse their arguments on the calling thread, mirror the
//! message to the console unless the call is silent, queue the entry and
//! return. Persistence happens later, in call order, on the writer thread.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::{LoggerConfig, QueueConfig};
use crate::entry::{LogEntry, LogOptions};
use crate::error::LoggerResult;
use crate::queue::{IngestQueue, QueueState, WriteFailure, WriterStats};
use crate::storage::SqliteStorage;
use crate::writer::{Persist, RecordWriter};

/// Destination for the console mirror.
pub trait ConsoleSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes each message as one line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        // Console mirroring is best-effort
        let _ = writeln!(out, "{}", line);
    }
}

struct LoggerInner {
    queue: IngestQueue,
    console: Option<Arc<dyn ConsoleSink>>,
    db_path: Option<PathBuf>,
}

/// Structured logger persisting into a self-migrating SQLite table.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
/// use sqlogs_core::{sqlog, Logger, LogOptions};
///
/// let logger = Logger::open("./app-logs.sqlite")?;
///
/// sqlog!(logger, "Uno", ["Dos"], {"three": "Tres"});
/// logger.log_with(&[json!("user signed in")], LogOptions::new()
///     .group("AUTH")
///     .meta("userId", "u-42"));
///
/// logger.close()?;
/// ```
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Create a logger from a full configuration.
    pub fn new(config: LoggerConfig) -> LoggerResult<Self> {
        LoggerBuilder::from_config(config).build()
    }

    /// Create a logger writing to `path` with default settings.
    pub fn open(path: impl Into<PathBuf>) -> LoggerResult<Self> {
        Self::new(LoggerConfig::new(path))
    }

    pub fn builder(db_path: impl Into<PathBuf>) -> LoggerBuilder {
        LoggerBuilder::new(db_path)
    }

    /// Log a raw argument list. A trailing `{"sqlogs": {...}}` object is read
    /// as the options envelope.
    ///
    /// Fire-and-forget: refused entries (full or closed queue) are logged
    /// with `warn!` and counted in [`WriterStats::dropped`].
    pub fn log(&self, args: Vec<Value>) {
        let _ = self.submit(LogEntry::parse(args));
    }

    /// Log positional arguments with typed options.
    pub fn log_with(&self, args: &[Value], options: LogOptions) {
        let _ = self.submit(LogEntry::from_parts(args, options));
    }

    /// Mirror and queue an already parsed entry.
    ///
    /// Returns an error only when the queue refuses the entry. Refused
    /// entries are not mirrored.
    pub fn submit(&self, entry: LogEntry) -> LoggerResult<()> {
        let line = match (&self.inner.console, entry.silent) {
            (Some(console), false) => Some((console.clone(), entry.message.clone())),
            _ => None,
        };
        self.inner.queue.push(entry)?;

        if let Some((console, message)) = line {
            console.write_line(&message);
        }
        Ok(())
    }

    /// Wait until everything logged so far has been attempted.
    pub async fn flush(&self) -> LoggerResult<()> {
        self.inner.queue.flush().await
    }

    /// Blocking variant of [`flush`](Self::flush); not for use inside an async runtime.
    pub fn flush_blocking(&self) -> LoggerResult<()> {
        self.inner.queue.flush_blocking()
    }

    /// Drain the queue, close the database and stop the writer thread.
    ///
    /// Affects every clone of this logger. Dropping the last clone does the same.
    pub fn close(&self) -> LoggerResult<WriterStats> {
        self.inner.queue.close()
    }

    /// Receive persist failures from now on.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<WriteFailure> {
        self.inner.queue.subscribe_failures()
    }

    pub fn stats(&self) -> WriterStats {
        self.inner.queue.stats()
    }

    pub fn state(&self) -> QueueState {
        self.inner.queue.state()
    }

    /// Database file, when the logger writes to SQLite.
    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("db_path", &self.inner.db_path)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`Logger`].
pub struct LoggerBuilder {
    config: LoggerConfig,
    console: Option<Arc<dyn ConsoleSink>>,
}

impl LoggerBuilder {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::from_config(LoggerConfig::new(db_path))
    }

    pub fn from_config(config: LoggerConfig) -> Self {
        Self {
            config,
            console: None,
        }
    }

    /// Disable console output (only write to the database).
    pub fn no_console(mut self) -> Self {
        self.config.console = false;
        self
    }

    /// Mirror messages to a custom sink instead of stdout.
    pub fn console_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.config.console = true;
        self.console = Some(sink);
        self
    }

    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Start a logger writing to the configured SQLite file.
    ///
    /// The file is opened lazily by the writer thread on the first entry.
    pub fn build(self) -> LoggerResult<Logger> {
        let db_path = self.config.db_path.clone();
        let writer = RecordWriter::new(SqliteStorage::new(&db_path));
        self.start(writer, Some(db_path))
    }

    /// Start a logger that hands entries to a custom [`Persist`] implementation.
    pub fn build_with<P: Persist + 'static>(self, sink: P) -> LoggerResult<Logger> {
        self.start(sink, None)
    }

    fn start<P: Persist + 'static>(self, sink: P, db_path: Option<PathBuf>) -> LoggerResult<Logger> {
        let queue = IngestQueue::spawn(sink, self.config.queue.clone(), &self.config.thread_name)?;
        let console = if self.config.console {
            Some(
                self.console
                    .unwrap_or_else(|| Arc::new(StdoutSink) as Arc<dyn ConsoleSink>),
            )
        } else {
            None
        };

        Ok(Logger {
            inner: Arc::new(LoggerInner {
                queue,
                console,
                db_path,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl ConsoleSink for Capture {
        fn write_line(&self, line: &str) {
            self.lines.lock().push(line.to_string());
        }
    }

    #[test]
    fn test_console_mirror_respects_silent() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::builder(":memory:")
            .console_sink(capture.clone())
            .build()
            .unwrap();

        logger.log(vec![json!("visible"), json!(1)]);
        logger.log(vec![json!("hidden"), json!({"sqlogs": {"silent": true}})]);
        logger.log_with(&[json!("typed")], LogOptions::new().silent(false));
        logger.close().unwrap();

        assert_eq!(*capture.lines.lock(), vec!["visible 1", "typed"]);
        assert_eq!(logger.stats().persisted, 3);
    }

    #[test]
    fn test_no_console_still_persists() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::builder(":memory:")
            .console_sink(capture.clone())
            .no_console()
            .build()
            .unwrap();

        logger.log(vec![json!("quiet")]);
        let stats = logger.close().unwrap();

        assert!(capture.lines.lock().is_empty());
        assert_eq!(stats.persisted, 1);
    }

    #[test]
    fn test_submit_after_close_fails() {
        let logger = Logger::builder(":memory:").no_console().build().unwrap();
        logger.close().unwrap();

        let err = logger
            .submit(LogEntry::new("late", LogOptions::default()))
            .unwrap_err();
        assert!(matches!(err, crate::error::LoggerError::QueueClosed));
        assert_eq!(logger.state(), QueueState::Closed);
    }

    #[test]
    fn test_log_after_close_is_counted_not_mirrored() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::builder(":memory:")
            .console_sink(capture.clone())
            .build()
            .unwrap();
        let other = logger.clone();

        logger.log(vec![json!("kept")]);
        logger.close().unwrap();
        other.log(vec![json!("too late")]);

        let stats = logger.stats();
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(*capture.lines.lock(), vec!["kept"]);
    }
}
