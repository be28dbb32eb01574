//! Per-request context shared along the handler chain.
//!
//! Middleware writes it, handlers read it. Everything in here is typed: the
//! request identifier is a `String`, the log entry a [`LogHandle`]. There is
//! no type-erased extension map to downcast from.

use crate::entry::LogHandle;
use crate::fields::FieldValue;

/// Request-scoped state owned by one [`Request`](crate::Request).
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    log: Option<LogHandle>,
}

impl RequestContext {
    /// The request identifier, once a middleware has assigned one.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Assigns the identifier. Empty strings are ignored.
    pub(crate) fn set_request_id(&mut self, id: String) {
        if !id.is_empty() {
            self.request_id = Some(id);
        }
    }

    pub(crate) fn set_log_entry(&mut self, handle: LogHandle) {
        self.log = Some(handle);
    }

    /// The live log entry, if a request logger is installed.
    pub fn get_log_entry(&self) -> Option<LogHandle> {
        self.log.clone()
    }

    /// Adds a field to the request's log entry. No-op without one.
    pub fn set_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        if let Some(log) = &self.log {
            log.set_field(key, value);
        }
    }

    /// Adds several fields to the request's log entry. No-op without one.
    pub fn set_fields<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        if let Some(log) = &self.log {
            log.set_fields(pairs);
        }
    }
}

/// Free-function form of [`RequestContext::get_log_entry`].
pub fn get_log_entry(ctx: &RequestContext) -> Option<LogHandle> {
    ctx.get_log_entry()
}

/// Free-function form of [`RequestContext::set_field`].
pub fn set_field(ctx: &RequestContext, key: impl Into<String>, value: impl Into<FieldValue>) {
    ctx.set_field(key, value);
}

/// Free-function form of [`RequestContext::set_fields`].
pub fn set_fields<I, K, V>(ctx: &RequestContext, pairs: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    ctx.set_fields(pairs);
}
