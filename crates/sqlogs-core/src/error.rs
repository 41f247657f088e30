//! Error types for sqlogs

use thiserror::Error;

/// Failures reported by a [`Storage`](crate::storage::Storage) backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The column being added already exists on the table
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    /// The database file could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other engine failure (locked file, disk full, bad SQL)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Parent directory creation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while creating or extending the `logs` table
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A metadata key is not usable as a column identifier
    #[error("Invalid column name: {0:?}")]
    InvalidColumnName(String),

    /// `CREATE TABLE` failed
    #[error("Failed to create logs table: {0}")]
    CreateTable(#[source] StorageError),

    /// `ALTER TABLE ... ADD COLUMN` failed for a reason other than a duplicate
    #[error("Failed to add column {column:?}: {source}")]
    AddColumn {
        column: String,
        #[source]
        source: StorageError,
    },

    /// Reading the live column list failed
    #[error("Failed to read table columns: {0}")]
    Introspect(#[source] StorageError),
}

/// Main error type for sqlogs operations
#[derive(Error, Debug)]
pub enum LoggerError {
    /// Schema reconciliation aborted the write
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The insert itself failed
    #[error("Persist error: {0}")]
    Persist(#[source] StorageError),

    /// The queue no longer accepts entries
    #[error("Logger queue is closed")]
    QueueClosed,

    /// The queue is at capacity and configured to reject
    #[error("Logger queue is full (capacity {0})")]
    QueueFull(usize),

    /// The writer thread could not be started or joined
    #[error("Writer thread error: {0}")]
    Thread(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using LoggerError
pub type LoggerResult<T> = Result<T, LoggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::InvalidColumnName("bad name".to_string());
        assert_eq!(format!("{}", err), "Invalid column name: \"bad name\"");

        let err = LoggerError::QueueFull(8);
        assert_eq!(format!("{}", err), "Logger queue is full (capacity 8)");
    }

    #[test]
    fn test_error_from_schema() {
        let schema_err = SchemaError::InvalidColumnName("id".to_string());
        let err: LoggerError = schema_err.into();
        assert!(matches!(err, LoggerError::Schema(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoggerError = io_err.into();
        assert!(matches!(err, LoggerError::Io(_)));
    }
}
