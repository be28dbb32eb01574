//! The request-scoped log entry.
//!
//! # Lifecycle
//!
//! ```text
//! LogEntry::start(sink, fields)   → emits "request started"
//!        ↓
//! set_field / set_fields / info   → zero or more times, from any handler
//!        ↓
//! complete(status, bytes, elapsed) → emits "request complete"
//!   or
//! record_panic(value, stack)       → emits "request panicked"
//! ```
//!
//! Exactly one of the two terminal calls takes effect. Later terminal calls
//! are refused and return `false`. Field writes stay legal after that, they
//! simply never reach a record that was already emitted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::Level;

use crate::fields::{millis, FieldValue, Fields};
use crate::sink::LogSink;

pub(crate) const STARTED: &str = "request started";
pub(crate) const COMPLETE: &str = "request complete";
pub(crate) const PANICKED: &str = "request panicked";

/// How a request ended, as seen by the middleware that wrapped it.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success {
        status: u16,
        bytes: u64,
        elapsed: Duration,
    },
    Failure {
        panic: String,
        stack: String,
    },
}

/// Accumulates one request's fields and writes its records.
pub struct LogEntry {
    fields: Fields,
    sink: Arc<dyn LogSink>,
    emit_panic_record: bool,
    finalized: bool,
}

impl LogEntry {
    /// Creates the entry and emits the "request started" record.
    pub fn start(sink: Arc<dyn LogSink>, fields: Fields) -> Self {
        sink.emit(Level::INFO, STARTED, &fields);
        Self { fields, sink, emit_panic_record: true, finalized: false }
    }

    /// Whether [`record_panic`](Self::record_panic) writes a record of its own.
    pub fn emit_panic_record(mut self, emit: bool) -> Self {
        self.emit_panic_record = emit;
        self
    }

    pub fn fields(&self) -> &Fields { &self.fields }
    pub fn is_finalized(&self) -> bool { self.finalized }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key, value);
    }

    pub fn set_fields<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.extend(pairs);
    }

    /// Emits an ad hoc record with the fields gathered so far.
    pub fn log(&self, level: Level, message: &str) {
        self.sink.emit(level, message, &self.fields);
    }

    /// Normal termination. Returns `false` if the entry was already finalized.
    pub fn complete(&mut self, status: u16, bytes: u64, elapsed: Duration) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        self.fields.insert("resp_status", status);
        self.fields.insert("resp_bytes_length", bytes);
        self.fields.insert("resp_elapsed_ms", millis(elapsed));
        self.sink.emit(Level::INFO, COMPLETE, &self.fields);
        true
    }

    /// Abnormal termination. Returns `false` if the entry was already finalized.
    pub fn record_panic(&mut self, value: &str, stack: &str) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        self.fields.insert("stack", stack);
        self.fields.insert("panic", value);
        if self.emit_panic_record {
            self.sink.emit(Level::ERROR, PANICKED, &self.fields);
        }
        true
    }

    pub fn finish(&mut self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Success { status, bytes, elapsed } => self.complete(*status, *bytes, *elapsed),
            Outcome::Failure { panic, stack } => self.record_panic(panic, stack),
        }
    }
}

// ── LogHandle ─────────────────────────────────────────────────────────────────

/// Shared handle to a request's [`LogEntry`].
///
/// The middleware keeps one clone and parks another in the request context so
/// handlers can add fields. Both live inside one request; the lock is never
/// contended across requests.
#[derive(Clone)]
pub struct LogHandle(Arc<Mutex<LogEntry>>);

impl LogHandle {
    pub fn new(entry: LogEntry) -> Self {
        Self(Arc::new(Mutex::new(entry)))
    }

    // A handler that panicked mid-update leaves the entry usable.
    fn lock(&self) -> MutexGuard<'_, LogEntry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.lock().set_field(key, value);
    }

    pub fn set_fields<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.lock().set_fields(pairs);
    }

    /// Snapshot of the current fields.
    pub fn fields(&self) -> Fields {
        self.lock().fields().clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().is_finalized()
    }

    pub fn info(&self, message: &str) {
        self.lock().log(Level::INFO, message);
    }

    pub fn error(&self, message: &str) {
        self.lock().log(Level::ERROR, message);
    }

    pub fn complete(&self, status: u16, bytes: u64, elapsed: Duration) -> bool {
        self.lock().complete(status, bytes, elapsed)
    }

    pub fn record_panic(&self, value: &str, stack: &str) -> bool {
        self.lock().record_panic(value, stack)
    }

    pub fn finish(&self, outcome: &Outcome) -> bool {
        self.lock().finish(outcome)
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").field("fields", &self.fields()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn started(sink: &Arc<MemorySink>) -> LogEntry {
        let fields: Fields = [("req_id", "abc"), ("http_method", "GET")].into_iter().collect();
        LogEntry::start(Arc::clone(sink) as Arc<dyn LogSink>, fields)
    }

    #[test]
    fn start_emits_seed_fields() {
        let sink = Arc::new(MemorySink::new());
        let _entry = started(&sink);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::INFO);
        assert_eq!(records[0].message, "request started");
        assert_eq!(records[0].fields.get("req_id"), Some(&"abc".into()));
    }

    #[test]
    fn fields_are_not_emitted_until_complete() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = started(&sink);
        entry.set_field("user", "alice");
        entry.set_fields([("cache", "miss"), ("user", "bob")]);
        assert_eq!(sink.records().len(), 1);

        assert!(entry.complete(200, 1024, Duration::from_nanos(2_500_000)));

        let complete = &sink.find("request complete")[0];
        assert_eq!(complete.fields.get("user"), Some(&"bob".into()));
        assert_eq!(complete.fields.get("cache"), Some(&"miss".into()));
        assert_eq!(complete.fields.get("resp_status"), Some(&FieldValue::Uint(200)));
        assert_eq!(complete.fields.get("resp_bytes_length"), Some(&FieldValue::Uint(1024)));
        assert_eq!(complete.fields.get("resp_elapsed_ms"), Some(&FieldValue::Float(2.5)));
    }

    #[test]
    fn writes_after_complete_do_not_touch_emitted_records() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = started(&sink);
        entry.complete(204, 0, Duration::ZERO);
        let before = sink.records();

        entry.set_field("late", true);
        entry.set_field("resp_status", 500);

        assert_eq!(sink.records(), before);
        assert_eq!(entry.fields().get("late"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn finalizes_only_once() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = started(&sink);

        assert!(entry.complete(200, 1, Duration::ZERO));
        assert!(!entry.complete(500, 2, Duration::ZERO));
        assert!(!entry.record_panic("boom", "trace"));

        assert_eq!(sink.find("request complete").len(), 1);
        assert!(sink.find("request panicked").is_empty());
        assert!(!entry.fields().contains_key("panic"));
    }

    #[test]
    fn panic_emits_error_record_without_completion() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = started(&sink);

        assert!(entry.finish(&Outcome::Failure {
            panic: "boom".to_owned(),
            stack: "at handler".to_owned(),
        }));

        assert!(sink.find("request complete").is_empty());
        let panicked = &sink.find("request panicked")[0];
        assert_eq!(panicked.level, Level::ERROR);
        assert_eq!(panicked.fields.get("panic"), Some(&"boom".into()));
        assert_eq!(panicked.fields.get("stack"), Some(&"at handler".into()));
    }

    #[test]
    fn capture_only_panic_mode() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = started(&sink).emit_panic_record(false);

        assert!(entry.record_panic("boom", "trace"));

        assert_eq!(sink.records().len(), 1);
        assert_eq!(entry.fields().get("panic"), Some(&"boom".into()));
        assert!(entry.is_finalized());
    }

    #[test]
    fn handle_logs_with_current_fields() {
        let sink = Arc::new(MemorySink::new());
        let handle = LogHandle::new(started(&sink));
        handle.set_field("step", 2);
        handle.info("cache miss");

        let record = &sink.find("cache miss")[0];
        assert_eq!(record.fields.get("step"), Some(&FieldValue::Int(2)));
        assert!(!handle.is_finalized());
    }
}
