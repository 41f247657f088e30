//! Log entry types and argument parsing.
//!
//! A log call is a list of JSON values. If the last value is an object with
//! the reserved `"sqlogs"` key, it is the options envelope for that call:
//!
//! ```text
//! ["Uno", ["Dos"], {"three": "Tres"}, {"sqlogs": {"group": "API", "level": "WARN",
//!                                                 "meta": {"requestId": "r-1"},
//!                                                 "silent": true}}]
//! ```
//!
//! The remaining values are folded into one message string.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::column_name_for;

/// Reserved key marking the trailing options envelope.
pub const OPTIONS_KEY: &str = "sqlogs";

pub const DEFAULT_GROUP: &str = "DEFAULT";
pub const DEFAULT_LEVEL: &str = "INFO";

/// Metadata fields, kept in insertion order so new columns follow first-seen order.
pub type Meta = IndexMap<String, String>;

/// Per-call options: group, level, metadata and console suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub group: String,
    pub level: String,
    pub meta: Meta,
    pub silent: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            level: DEFAULT_LEVEL.to_string(),
            meta: Meta::new(),
            silent: false,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Add one metadata field.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Read options out of an envelope object (`{"sqlogs": {...}}`).
    ///
    /// Never fails: missing, empty or wrongly-typed fields keep their defaults.
    pub fn from_envelope(envelope: &Value) -> Self {
        let mut options = Self::default();
        let Some(inner) = envelope.get(OPTIONS_KEY).and_then(Value::as_object) else {
            return options;
        };

        if let Some(group) = inner.get("group").and_then(Value::as_str) {
            if !group.is_empty() {
                options.group = group.to_string();
            }
        }
        if let Some(level) = inner.get("level").and_then(Value::as_str) {
            if !level.is_empty() {
                options.level = level.to_string();
            }
        }
        if let Some(meta) = inner.get("meta").and_then(Value::as_object) {
            for (key, value) in meta {
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        options.meta.insert(key.clone(), s.clone());
                    }
                    other => {
                        options.meta.insert(key.clone(), other.to_string());
                    }
                }
            }
        }
        if let Some(silent) = inner.get("silent").and_then(Value::as_bool) {
            options.silent = silent;
        }

        options
    }

    /// Wrap these options in an envelope suitable as a trailing log argument.
    pub fn into_envelope(self) -> Value {
        let mut inner = serde_json::Map::new();
        inner.insert("group".into(), Value::String(self.group));
        inner.insert("level".into(), Value::String(self.level));
        inner.insert(
            "meta".into(),
            Value::Object(
                self.meta
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        );
        inner.insert("silent".into(), Value::Bool(self.silent));

        let mut outer = serde_json::Map::new();
        outer.insert(OPTIONS_KEY.into(), Value::Object(inner));
        Value::Object(outer)
    }
}

/// One parsed log record waiting to be persisted.
///
/// The timestamp is not part of the entry; the writer stamps it when the
/// row is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub group: String,
    pub level: String,
    pub meta: Meta,
    /// Suppresses the console mirror only
    pub silent: bool,
}

impl LogEntry {
    /// Create an entry from an already formatted message.
    ///
    /// Metadata keys are rewritten into valid column names (see
    /// [`column_name_for`]). Keys that end up equal, ignoring ASCII case,
    /// share one column and the last value wins.
    pub fn new(message: impl Into<String>, options: LogOptions) -> Self {
        Self {
            message: message.into(),
            group: options.group,
            level: options.level,
            meta: column_safe_meta(options.meta),
            silent: options.silent,
        }
    }

    /// Parse a raw argument list, extracting a trailing options envelope.
    pub fn parse(mut args: Vec<Value>) -> Self {
        let options = if is_envelope(args.last()) {
            args.pop()
                .map(|envelope| LogOptions::from_envelope(&envelope))
                .unwrap_or_default()
        } else {
            LogOptions::default()
        };
        Self::new(format_message(&args), options)
    }

    /// Build an entry from positional arguments and typed options.
    pub fn from_parts(args: &[Value], options: LogOptions) -> Self {
        Self::new(format_message(args), options)
    }

    /// Metadata keys, in insertion order.
    pub fn meta_keys(&self) -> impl Iterator<Item = &str> {
        self.meta.keys().map(String::as_str)
    }
}

fn column_safe_meta(meta: Meta) -> Meta {
    let mut safe = Meta::with_capacity(meta.len());
    for (key, value) in meta {
        let column = column_name_for(&key);
        match safe.keys().position(|k| k.eq_ignore_ascii_case(&column)) {
            Some(index) => {
                if let Some((_, slot)) = safe.get_index_mut(index) {
                    *slot = value;
                }
            }
            None => {
                safe.insert(column, value);
            }
        }
    }
    safe
}

fn is_envelope(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Object(map)) if map.contains_key(OPTIONS_KEY))
}

/// Fold arguments into one message.
///
/// Strings are taken verbatim, everything else as compact JSON. Parts are
/// separated by a single space and the result is trimmed.
pub fn format_message(args: &[Value]) -> String {
    let mut message = String::new();
    for arg in args {
        message.push(' ');
        match arg {
            Value::String(s) => message.push_str(s),
            other => message.push_str(&other.to_string()),
        }
    }
    message.trim().to_string()
}
