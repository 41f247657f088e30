//! Record writer: turns one [`LogEntry`] into one row.
//!
//! The writer never alters the table itself; it asks the
//! [`SchemaManager`] for the columns it needs, then issues a single
//! parameterized insert. Only validated metadata keys are interpolated, and
//! only as quoted identifiers.

use chrono::SecondsFormat;

use crate::entry::LogEntry;
use crate::error::{LoggerError, LoggerResult};
use crate::schema::{quote_identifier, SchemaManager, TABLE_NAME};
use crate::storage::{SqlValue, Storage};

/// Anything the ingestion queue can hand entries to.
///
/// Called from the single writer thread, one entry at a time.
pub trait Persist: Send {
    fn persist(&mut self, entry: &LogEntry) -> LoggerResult<PersistOutcome>;

    /// Release resources once the queue has drained.
    fn close(&mut self) {}
}

/// What a successful persist did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Timestamp written to the row
    pub timestamp: String,
    /// Metadata keys that needed a new column for this entry
    pub added_columns: Vec<String>,
}

/// Current time as ISO 8601 UTC with milliseconds (e.g. "2026-01-21T14:30:45.123Z").
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Writes entries into the `logs` table of a [`Storage`].
#[derive(Debug)]
pub struct RecordWriter<S> {
    storage: S,
    schema: SchemaManager,
}

impl<S: Storage> RecordWriter<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            schema: SchemaManager::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    /// Live column list of the log table.
    pub fn columns(&mut self) -> LoggerResult<Vec<String>> {
        Ok(self.schema.columns(&mut self.storage)?)
    }

    fn insert(&mut self, entry: &LogEntry, timestamp: &str) -> LoggerResult<()> {
        let mut columns = String::from("`timestamp`, `group`, `level`, `message`");
        let mut placeholders = String::from("?, ?, ?, ?");
        let mut params: Vec<SqlValue> = Vec::with_capacity(4 + entry.meta.len());
        params.push(SqlValue::from(timestamp));
        params.push(SqlValue::from(entry.group.as_str()));
        params.push(SqlValue::from(entry.level.as_str()));
        params.push(SqlValue::from(entry.message.as_str()));

        for (key, value) in &entry.meta {
            columns.push_str(", ");
            columns.push_str(&quote_identifier(key));
            placeholders.push_str(", ?");
            params.push(SqlValue::from(value.as_str()));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(TABLE_NAME),
            columns,
            placeholders
        );
        self.storage
            .execute(&sql, &params)
            .map(|_| ())
            .map_err(LoggerError::Persist)
    }
}

impl<S: Storage> Persist for RecordWriter<S> {
    fn persist(&mut self, entry: &LogEntry) -> LoggerResult<PersistOutcome> {
        self.schema.ensure_table(&mut self.storage)?;
        let added_columns = self
            .schema
            .reconcile_columns(&mut self.storage, entry.meta_keys())?;

        let timestamp = timestamp_now();
        self.insert(entry, &timestamp)?;

        Ok(PersistOutcome {
            timestamp,
            added_columns,
        })
    }

    fn close(&mut self) {
        self.storage.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogOptions;
    use crate::error::{SchemaError, StorageError};
    use crate::storage::{Row, SqliteStorage};

    fn writer() -> RecordWriter<SqliteStorage> {
        RecordWriter::new(SqliteStorage::new(":memory:"))
    }

    #[test]
    fn test_persist_writes_fixed_columns() {
        let mut writer = writer();
        let outcome = writer
            .persist(&LogEntry::new("Hello", LogOptions::default()))
            .unwrap();
        assert!(outcome.added_columns.is_empty());

        let rows = writer.storage_mut().query("SELECT * FROM logs").unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("id"), Some(&SqlValue::Integer(1)));
        assert_eq!(row.get_text("message"), Some("Hello"));
        assert_eq!(row.get_text("group"), Some("DEFAULT"));
        assert_eq!(row.get_text("level"), Some("INFO"));
        assert_eq!(row.get_text("timestamp"), Some(outcome.timestamp.as_str()));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        // 2026-01-21T14:30:45.123Z
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_meta_columns_are_added_and_filled() {
        let mut writer = writer();

        let first = LogEntry::new("a", LogOptions::new().meta("requestId", "r-1"));
        let outcome = writer.persist(&first).unwrap();
        assert_eq!(outcome.added_columns, vec!["requestId"]);

        let second = LogEntry::new("b", LogOptions::new().meta("userId", "u-9"));
        writer.persist(&second).unwrap();

        let rows = writer
            .storage_mut()
            .query("SELECT message, requestId, userId FROM logs ORDER BY id")
            .unwrap();
        assert_eq!(rows[0].get_text("requestId"), Some("r-1"));
        assert!(rows[0].get("userId").unwrap().is_null());
        assert!(rows[1].get("requestId").unwrap().is_null());
        assert_eq!(rows[1].get_text("userId"), Some("u-9"));

        assert_eq!(
            writer.columns().unwrap(),
            vec!["id", "message", "timestamp", "group", "level", "requestId", "userId"]
        );
    }

    #[test]
    fn test_invalid_meta_key_fails_without_insert() {
        let mut writer = writer();
        // Bypass the constructor, which would rewrite the key
        let mut entry = LogEntry::new("x", LogOptions::new());
        entry.meta.insert("bad key".into(), "1".into());

        let err = writer.persist(&entry).unwrap_err();
        assert!(matches!(
            err,
            LoggerError::Schema(SchemaError::InvalidColumnName(_))
        ));

        let rows = writer.storage_mut().query("SELECT * FROM logs").unwrap();
        assert!(rows.is_empty());
    }

    /// Storage whose inserts always fail.
    struct FailingInsert {
        inner: SqliteStorage,
    }

    impl Storage for FailingInsert {
        fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, StorageError> {
            if sql.starts_with("INSERT") {
                return Err(StorageError::Io(std::io::Error::other("database is locked")));
            }
            self.inner.execute(sql, params)
        }

        fn query(&mut self, sql: &str) -> Result<Vec<Row>, StorageError> {
            self.inner.query(sql)
        }
    }

    #[test]
    fn test_insert_failure_is_reported() {
        let mut writer = RecordWriter::new(FailingInsert {
            inner: SqliteStorage::new(":memory:"),
        });
        let err = writer
            .persist(&LogEntry::new("lost", LogOptions::default()))
            .unwrap_err();
        assert!(matches!(err, LoggerError::Persist(_)));
    }
}
