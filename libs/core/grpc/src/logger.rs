//! Structured logging capability used by the interceptors.
//!
//! The interceptors never call `tracing` for call records directly; they write
//! [`LogRecord`]s to an injected [`Logger`]. [`TracingLogger`] forwards to the
//! process subscriber, [`NoopLogger`] is the default when nothing is injected.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub type SharedLogger = Arc<dyn Logger>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// One key/value annotation on a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    pub fields: Vec<Field>,
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Value of the first field named `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }
}

/// Leveled, field-tagged log sink. Must tolerate concurrent writes.
pub trait Logger: Send + Sync {
    fn log(&self, record: LogRecord);

    /// `false` when records are thrown away, so callers can skip building them.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: LogRecord) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards records to `tracing` under the `grpc_bootstrap` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: LogRecord) {
        let fields = record
            .fields
            .iter()
            .map(Field::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let message = record.message;

        match record.severity {
            Severity::Debug => tracing::debug!(target: "grpc_bootstrap", fields = %fields, "{message}"),
            Severity::Info => tracing::info!(target: "grpc_bootstrap", fields = %fields, "{message}"),
            Severity::Warn => tracing::warn!(target: "grpc_bootstrap", fields = %fields, "{message}"),
            Severity::Error => tracing::error!(target: "grpc_bootstrap", fields = %fields, "{message}"),
        }
    }
}

/// Keeps every record in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
