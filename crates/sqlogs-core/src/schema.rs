//! Schema manager for the `logs` table.
//!
//! The table starts with five fixed columns and gains one `text` column per
//! metadata key ever logged. Columns are never dropped or renamed.
//!
//! ## Statements
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS `logs` (`id` integer NOT NULL PRIMARY KEY, `message` text, `timestamp` text, `group` text, `level` text);
//! ALTER TABLE `logs` ADD COLUMN `<metaKey>` text;
//! ```
//!
//! Metadata keys become SQL identifiers, so they are checked against a strict
//! grammar before any statement is built.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{SchemaError, StorageError};
use crate::storage::Storage;

/// Name of the single log table.
pub const TABLE_NAME: &str = "logs";

/// Columns every row carries, in table order.
pub const FIXED_COLUMNS: [&str; 5] = ["id", "message", "timestamp", "group", "level"];

/// Base table definition. Must stay byte-for-byte stable for existing files.
pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS `logs` \
     (`id` integer NOT NULL PRIMARY KEY, `message` text, \
     `timestamp` text, `group` text, `level` text);";

/// Longest metadata key accepted as a column name.
pub const MAX_COLUMN_NAME_LEN: usize = 64;

/// Check that `name` can be used as a dynamic column.
///
/// Accepted: `[A-Za-z_][A-Za-z0-9_]*`, at most [`MAX_COLUMN_NAME_LEN`] bytes,
/// and not one of the fixed column names (compared case-insensitively, as
/// SQLite does).
pub fn validate_column_name(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !head_ok || !tail_ok || name.len() > MAX_COLUMN_NAME_LEN {
        return Err(SchemaError::InvalidColumnName(name.to_string()));
    }
    if FIXED_COLUMNS.iter().any(|f| f.eq_ignore_ascii_case(name)) {
        return Err(SchemaError::InvalidColumnName(name.to_string()));
    }
    Ok(())
}

/// Rewrite an arbitrary key into a name [`validate_column_name`] accepts.
///
/// Invalid characters become `_`, a leading digit gets a `_` prefix, and
/// names clashing with a fixed column get a `field_` prefix.
pub fn column_name_for(key: &str) -> String {
    let mut column: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if column.is_empty() || column.starts_with(|c: char| c.is_ascii_digit()) {
        column.insert(0, '_');
    }
    if FIXED_COLUMNS.iter().any(|f| f.eq_ignore_ascii_case(&column)) {
        column.insert_str(0, "field_");
    }
    column.truncate(MAX_COLUMN_NAME_LEN);
    column
}

/// Backtick-quote an identifier that already passed validation.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name)
}

fn add_column_sql(name: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} text;",
        quote_identifier(TABLE_NAME),
        quote_identifier(name)
    )
}

/// Owns every schema-altering statement issued against the log table.
///
/// The known-column cache only ever holds names the engine has confirmed,
/// either by a successful `ADD COLUMN` or by a duplicate-column refusal.
#[derive(Debug, Default)]
pub struct SchemaManager {
    /// Lowercased dynamic column names known to exist
    known: HashSet<String>,
    /// Whether the cache has been loaded from the live table
    seeded: bool,
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the base table if it does not exist. Safe to call before every write.
    pub fn ensure_table<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<(), SchemaError> {
        storage
            .execute(CREATE_TABLE_SQL, &[])
            .map(|_| ())
            .map_err(SchemaError::CreateTable)
    }

    /// Read the live column list, in table order.
    pub fn columns<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<Vec<String>, SchemaError> {
        let rows = storage
            .query(&format!("PRAGMA table_info({})", quote_identifier(TABLE_NAME)))
            .map_err(SchemaError::Introspect)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_text("name").map(str::to_string))
            .collect())
    }

    /// Make sure a column exists for every key.
    ///
    /// Returns the keys that received a new column during this call, in the
    /// order given. Invalid keys fail the whole call before any SQL runs.
    pub fn reconcile_columns<'a, S, I>(
        &mut self,
        storage: &mut S,
        keys: I,
    ) -> Result<Vec<String>, SchemaError>
    where
        S: Storage + ?Sized,
        I: IntoIterator<Item = &'a str>,
    {
        let keys: Vec<&str> = keys.into_iter().collect();
        for key in &keys {
            validate_column_name(key)?;
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        if !self.seeded {
            self.seed(storage);
        }

        let mut added = Vec::new();
        for key in keys {
            let folded = key.to_ascii_lowercase();
            if self.known.contains(&folded) {
                continue;
            }

            match storage.execute(&add_column_sql(key), &[]) {
                Ok(_) => {
                    debug!(column = key, "Added log column");
                    added.push(key.to_string());
                }
                Err(StorageError::DuplicateColumn(_)) => {
                    debug!(column = key, "Column already present");
                }
                Err(source) => {
                    return Err(SchemaError::AddColumn {
                        column: key.to_string(),
                        source,
                    });
                }
            }
            self.known.insert(folded);
        }

        Ok(added)
    }

    /// Whether `name` is in the local cache.
    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(&name.to_ascii_lowercase())
    }

    /// Forget the cache, e.g. after the storage handle was swapped.
    pub fn reset(&mut self) {
        self.known.clear();
        self.seeded = false;
    }

    fn seed<S: Storage + ?Sized>(&mut self, storage: &mut S) {
        match self.columns(storage) {
            Ok(columns) => {
                self.known.extend(
                    columns
                        .into_iter()
                        .filter(|c| !FIXED_COLUMNS.iter().any(|f| f.eq_ignore_ascii_case(c)))
                        .map(|c| c.to_ascii_lowercase()),
                );
                self.seeded = true;
            }
            Err(e) => {
                // Fall back to per-key ALTER; duplicates are still tolerated
                warn!(error = %e, "Could not read existing log columns");
            }
        }
    }
}
