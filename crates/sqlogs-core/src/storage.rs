//! Storage handle used by the writer thread.
//!
//! The pipeline only needs two things from the SQL engine: run a statement
//! with bound parameters, and read rows back. [`Storage`] captures exactly
//! that, and [`SqliteStorage`] implements it on top of `rusqlite`.
//!
//! The connection is opened lazily on first use. If opening fails, the
//! current call fails and the next call tries again.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;
use tracing::debug;

use crate::error::StorageError;

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Text content, if this cell holds text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

/// One result row, with cells in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, SqlValue)>) -> Self {
        Self { cells }
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Look up a text cell by column name.
    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_text)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }
}

/// Generic storage handle consumed by the schema manager and record writer.
///
/// Implementations are owned by exactly one writer thread, hence `&mut self`.
pub trait Storage: Send {
    /// Run a statement with bound parameters. Returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, StorageError>;

    /// Run a query and collect every row.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, StorageError>;

    /// Release the underlying handle. Later calls may reopen it.
    fn close(&mut self) {}
}

/// SQLite file storage, opened on first use.
pub struct SqliteStorage {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteStorage {
    /// Create a handle for the database at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the connection has been opened.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&mut self) -> Result<&mut Connection, StorageError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(self.conn.insert(conn))
    }

    fn open(&self) -> Result<Connection, StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path).map_err(|source| StorageError::Open {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(path = %self.path.display(), "Opened log database");
        Ok(conn)
    }
}

impl fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl Storage for SqliteStorage {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, StorageError> {
        let conn = self.connection()?;
        conn.execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(classify)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                cells.push((name.clone(), SqlValue::from(row.get_ref(i)?)));
            }
            out.push(Row::new(cells));
        }
        Ok(out)
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to close log database cleanly");
            } else {
                debug!(path = %self.path.display(), "Closed log database");
            }
        }
    }
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map SQLite's "duplicate column name" failure to its own variant.
fn classify(err: rusqlite::Error) -> StorageError {
    let text = err.to_string();
    if text.to_ascii_lowercase().contains("duplicate column") {
        StorageError::DuplicateColumn(text)
    } else {
        StorageError::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_opens_lazily() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("lazy.sqlite");

        let mut storage = SqliteStorage::new(&path);
        assert!(!storage.is_open());
        assert!(!path.exists());

        storage.execute("CREATE TABLE t (a text)", &[]).unwrap();
        assert!(storage.is_open());
        assert!(path.exists());
    }

    #[test]
    fn test_execute_and_query() {
        let mut storage = SqliteStorage::new(":memory:");
        storage
            .execute("CREATE TABLE t (a text, b integer)", &[])
            .unwrap();
        let changed = storage
            .execute(
                "INSERT INTO t (a, b) VALUES (?, ?)",
                &[SqlValue::from("hello"), SqlValue::from(7)],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let rows = storage.query("SELECT a, b FROM t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_text("a"), Some("hello"));
        assert_eq!(rows[0].get("b"), Some(&SqlValue::Integer(7)));
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_column_is_classified() {
        let mut storage = SqliteStorage::new(":memory:");
        storage.execute("CREATE TABLE t (a text)", &[]).unwrap();

        let err = storage
            .execute("ALTER TABLE t ADD COLUMN a text", &[])
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateColumn(_)));

        let err = storage.execute("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)));
    }

    #[test]
    fn test_close_then_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reopen.sqlite");

        let mut storage = SqliteStorage::new(&path);
        storage.execute("CREATE TABLE t (a text)", &[]).unwrap();
        storage.close();
        assert!(!storage.is_open());

        storage
            .execute("INSERT INTO t (a) VALUES (?)", &[SqlValue::from("x")])
            .unwrap();
        assert_eq!(storage.query("SELECT a FROM t").unwrap().len(), 1);
    }
}
