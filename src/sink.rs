//! Structured log sinks.
//!
//! A [`LogSink`] receives finished records: a level, a short message and the
//! entry's fields at the time of the call. Sinks are shared by every request
//! in flight, so implementations must be `Send + Sync`.

use std::sync::{Mutex, PoisonError};

use tracing::Level;

use crate::fields::{FieldValue, Fields};

/// Destination for request log records.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, level: Level, message: &str, fields: &Fields);
}

// ── TracingSink ───────────────────────────────────────────────────────────────

/// Forwards records to `tracing` on the `tsu::request` target.
///
/// The keys this crate writes (`req_id`, `http_method`, `resp_status`, ...)
/// become named event fields, absent ones are left unrecorded. Anything a
/// handler added travels as one logfmt value under `extra`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

const NAMED: [&str; 16] = [
    "ts", "req_id", "http_scheme", "http_proto", "http_method",
    "remote_addr", "remote_city", "remote_country", "remote_tz",
    "user_agent", "uri",
    "resp_status", "resp_bytes_length", "resp_elapsed_ms",
    "panic", "stack",
];

fn text<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(FieldValue::as_str)
}

fn uint(fields: &Fields, key: &str) -> Option<u64> {
    match fields.get(key)? {
        FieldValue::Uint(n) => Some(*n),
        FieldValue::Int(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

fn float(fields: &Fields, key: &str) -> Option<f64> {
    match fields.get(key)? {
        FieldValue::Float(n) => Some(*n),
        FieldValue::Uint(n) => Some(*n as f64),
        FieldValue::Int(n) => Some(*n as f64),
        _ => None,
    }
}

macro_rules! request_event {
    ($level:ident, $fields:expr, $extra:expr, $message:expr) => {
        tracing::$level!(
            target: "tsu::request",
            ts = text($fields, "ts"),
            req_id = text($fields, "req_id"),
            http_scheme = text($fields, "http_scheme"),
            http_proto = text($fields, "http_proto"),
            http_method = text($fields, "http_method"),
            remote_addr = text($fields, "remote_addr"),
            remote_city = text($fields, "remote_city"),
            remote_country = text($fields, "remote_country"),
            remote_tz = text($fields, "remote_tz"),
            user_agent = text($fields, "user_agent"),
            uri = text($fields, "uri"),
            resp_status = uint($fields, "resp_status"),
            resp_bytes_length = uint($fields, "resp_bytes_length"),
            resp_elapsed_ms = float($fields, "resp_elapsed_ms"),
            panic = text($fields, "panic"),
            stack = text($fields, "stack"),
            extra = $extra,
            "{}",
            $message
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, level: Level, message: &str, fields: &Fields) {
        let rest: Fields = fields
            .iter()
            .filter(|(key, _)| !NAMED.contains(key))
            .map(|(key, value)| (key, value.clone()))
            .collect();
        let extra = (!rest.is_empty()).then(|| tracing::field::display(&rest));

        match level {
            Level::ERROR => request_event!(error, fields, extra, message),
            Level::WARN  => request_event!(warn, fields, extra, message),
            Level::INFO  => request_event!(info, fields, extra, message),
            Level::DEBUG => request_event!(debug, fields, extra, message),
            _            => request_event!(trace, fields, extra, message),
        }
    }
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// One emitted record, as captured by [`MemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Fields,
}

/// Keeps every record in memory. Meant for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The records whose message equals `message`.
    pub fn find(&self, message: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.message == message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: Level, message: &str, fields: &Fields) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Record { level, message: message.to_owned(), fields: fields.clone() });
    }
}
