//! Request-scoped structured logging.
//!
//! For every request [`RequestLogger`]:
//!
//! 1. resolves the request identifier (context, `X-Request-ID`, or a fresh one),
//! 2. gathers the request metadata and geo fields,
//! 3. starts a [`LogEntry`], which emits "request started",
//! 4. parks a [`LogHandle`] in the request context for handlers to enrich,
//! 5. runs the rest of the chain and finalizes the entry from its [`Outcome`].
//!
//! A panicking handler is recorded on the entry and then resumed, so the
//! server's own recovery still sees it.
//!
//! The `stack` field is the backtrace of the panic itself. Constructing a
//! `RequestLogger` installs a process-wide panic hook, once, that stores the
//! trace of every panic in a thread-local slot and then defers to the hook
//! that was installed before it. `catch_unwind` completes on the thread that
//! panicked, within the same poll, so the slot still holds that trace when
//! the entry is finalized.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use futures::FutureExt;

use crate::config::Config;
use crate::entry::{LogEntry, LogHandle, Outcome};
use crate::fields::Fields;
use crate::geo::{GeoEnricher, GeoLookup};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::request_id::{resolve_id, IdProvider};
use crate::sink::LogSink;

/// Structured request logging middleware.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tsu_logr::Router;
/// use tsu_logr::geo::GeoTable;
/// use tsu_logr::middleware::RequestLogger;
/// use tsu_logr::request_id::TimeOrderedIds;
/// use tsu_logr::sink::TracingSink;
///
/// let logger = RequestLogger::new(Arc::new(TracingSink), Arc::new(TimeOrderedIds::new()))
///     .with_geo(Arc::new(GeoTable::new()));
/// let app = Router::new().layer(logger);
/// ```
#[derive(Clone)]
pub struct RequestLogger {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn LogSink>,
    ids: Arc<dyn IdProvider>,
    geo: GeoEnricher,
    config: Config,
}

impl RequestLogger {
    /// A logger without geo enrichment and with the default [`Config`].
    pub fn new(sink: Arc<dyn LogSink>, ids: Arc<dyn IdProvider>) -> Self {
        install_panic_hook();
        Self {
            inner: Arc::new(Inner {
                sink,
                ids,
                geo: GeoEnricher::disabled(),
                config: Config::default(),
            }),
        }
    }

    pub fn with_geo(self, db: Arc<dyn GeoLookup>) -> Self {
        self.map_inner(|inner| inner.geo = GeoEnricher::new(db))
    }

    pub fn with_config(self, config: Config) -> Self {
        self.map_inner(|inner| inner.config = config)
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => Inner {
                sink: Arc::clone(&shared.sink),
                ids: Arc::clone(&shared.ids),
                geo: shared.geo.clone(),
                config: shared.config.clone(),
            },
        };
        f(&mut inner);
        Self { inner: Arc::new(inner) }
    }
}

impl Inner {
    /// Reuses an identifier assigned upstream in the chain, else resolves one.
    fn assign_request_id(&self, req: &mut Request) -> String {
        if let Some(id) = req.request_id() {
            return id.to_owned();
        }
        let id = resolve_id(req.header(&self.config.request_id_header), self.ids.as_ref());
        req.context_mut().set_request_id(id.clone());
        id
    }

    fn request_fields(&self, req: &Request, request_id: &str) -> Fields {
        let mut fields = Fields::with_capacity(16);
        fields.insert("ts", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        if !request_id.is_empty() {
            fields.insert("req_id", request_id);
        }
        fields.insert("http_scheme", req.scheme());
        fields.insert("http_proto", req.proto());
        fields.insert("http_method", req.method().as_str());

        let (geo, _) = self.geo.enrich(&req.client_addr(&self.config.forwarded_for_header));
        fields.extend(geo.iter().map(|(k, v)| (k, v.clone())));

        fields.insert("user_agent", req.user_agent());
        fields.insert("uri", req.full_uri());
        fields
    }
}

impl Middleware for RequestLogger {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let started = Instant::now();
            let request_id = inner.assign_request_id(&mut req);
            let fields = inner.request_fields(&req, &request_id);

            let entry = LogEntry::start(Arc::clone(&inner.sink), fields)
                .emit_panic_record(inner.config.emit_panic_record);
            let log = LogHandle::new(entry);
            req.context_mut().set_log_entry(log.clone());

            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(res) => {
                    log.finish(&Outcome::Success {
                        status: res.status_code().as_u16(),
                        bytes: res.body_len(),
                        elapsed: started.elapsed(),
                    });
                    res
                }
                Err(payload) => {
                    log.finish(&Outcome::Failure {
                        panic: panic_message(payload.as_ref()),
                        stack: take_panic_trace().to_string(),
                    });
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

// ── Panic traces ──────────────────────────────────────────────────────────────

thread_local! {
    static PANIC_TRACE: Cell<Option<Backtrace>> = const { Cell::new(None) };
}

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANIC_TRACE.set(Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// The trace of the last panic on this thread, or the current stack when the
/// hook was bypassed (e.g. replaced by a later `set_hook`).
fn take_panic_trace() -> Backtrace {
    PANIC_TRACE.take().unwrap_or_else(Backtrace::force_capture)
}

/// Renders a panic payload the way the panic message reads.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(format!("bad id {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "bad id 7");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "Box<dyn Any>");
    }
}
