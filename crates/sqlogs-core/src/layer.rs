//! Custom tracing Layer that forwards events into a [`Logger`].
//!
//! Each event becomes one row: the level goes to `level`, the target to
//! `group`, the `message` field to `message` and every other field to a
//! metadata column.
//!
//! Events emitted by this crate are skipped so the writer thread's own
//! diagnostics never loop back into the queue.

use std::fmt::Write as FmtWrite;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::entry::{LogEntry, LogOptions, Meta};
use crate::logger::Logger;

/// Target prefix of this crate's own events.
const OWN_TARGET: &str = "sqlogs_core";

/// A tracing Layer that persists events through a [`Logger`].
pub struct SqlogsLayer {
    logger: Logger,
    console: bool,
    span_column: bool,
}

impl SqlogsLayer {
    /// Entries are silent by default; pair with a fmt layer for console output.
    ///
    /// A layer installed as the global default is never dropped, so its
    /// logger never drains on drop. Keep a clone of `logger` (or use
    /// [`logger`](Self::logger)) and call [`Logger::close`] before exit.
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            console: false,
            span_column: true,
        }
    }

    /// Also mirror forwarded events through the logger's console sink.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Record the active span path in a `span` column (on by default).
    pub fn with_span_column(mut self, enabled: bool) -> Self {
        self.span_column = enabled;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl<S> Layer<S> for SqlogsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target.starts_with(OWN_TARGET) {
            return;
        }

        let mut visitor = MetaVisitor::default();
        event.record(&mut visitor);

        let mut options = LogOptions::new()
            .group(target)
            .level(metadata.level().as_str())
            .silent(!self.console);
        options.meta = visitor.fields;

        if self.span_column {
            if let Some(scope) = ctx.event_scope(event) {
                let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
                if !spans.is_empty() {
                    options.meta.insert("span".to_string(), spans.join(" > "));
                }
            }
        }

        // Queue refusals are already counted; never panic inside logging
        let _ = self
            .logger
            .submit(LogEntry::new(visitor.message.unwrap_or_default(), options));
    }
}

/// Visitor that extracts the message and stringified fields from an event.
#[derive(Default)]
struct MetaVisitor {
    message: Option<String>,
    fields: Meta,
}

impl MetaVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for MetaVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{:?}", value);

        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, buf);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }
}
