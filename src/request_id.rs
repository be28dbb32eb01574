//! Request identifiers.
//!
//! Every request carries one opaque identifier. An upstream proxy may already
//! have assigned it (`X-Request-ID`), in which case it is trusted verbatim so
//! records stay correlated with the originating system. Otherwise a fresh,
//! time-ordered identifier is generated.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::{NoContext, Timestamp, Uuid};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Source of fresh request identifiers.
///
/// Create one at startup and hand the same `Arc` to every middleware that
/// needs it. Implementations are called concurrently from every request.
pub trait IdProvider: Send + Sync + 'static {
    fn new_id(&self) -> String;
}

/// UUIDv7 identifiers: a millisecond timestamp prefix followed by random bits.
///
/// The hyphenated lowercase form is header-safe and sorts lexically by
/// creation time to the millisecond. A clock set before the Unix epoch
/// degrades to random v4 identifiers instead of failing.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeOrderedIds;

impl TimeOrderedIds {
    pub fn new() -> Self {
        Self
    }
}

impl IdProvider for TimeOrderedIds {
    fn new_id(&self) -> String {
        id_at(SystemTime::now()).hyphenated().to_string()
    }
}

fn id_at(now: SystemTime) -> Uuid {
    match now.duration_since(UNIX_EPOCH) {
        Ok(since) => {
            let ts = Timestamp::from_unix(NoContext, since.as_secs(), since.subsec_nanos());
            Uuid::new_v7(ts)
        }
        Err(_) => Uuid::new_v4(),
    }
}

/// Returns `inbound` unchanged when non-empty, otherwise a fresh identifier.
pub fn resolve_id(inbound: Option<&str>, ids: &dyn IdProvider) -> String {
    match inbound {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => ids.new_id(),
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Stores the request identifier in the request context.
///
/// Useful on its own when handlers need the identifier but no request log.
/// [`RequestLogger`](crate::middleware::RequestLogger) resolves it the same
/// way when this layer is absent.
pub struct RequestId {
    header: String,
    ids: Arc<dyn IdProvider>,
}

impl RequestId {
    /// Reads the identifier from `X-Request-ID`.
    pub fn new(ids: Arc<dyn IdProvider>) -> Self {
        Self::with_header(ids, crate::config::DEFAULT_REQUEST_ID_HEADER)
    }

    pub fn with_header(ids: Arc<dyn IdProvider>, header: impl Into<String>) -> Self {
        Self { header: header.into(), ids }
    }
}

impl Middleware for RequestId {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let id = resolve_id(req.header(&self.header), self.ids.as_ref());
        req.context_mut().set_request_id(id);
        Box::pin(next.run(req))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use super::*;

    struct Fixed;

    impl IdProvider for Fixed {
        fn new_id(&self) -> String { "generated".to_owned() }
    }

    #[test]
    fn inbound_value_passes_through_unchanged() {
        assert_eq!(resolve_id(Some("  abc/123 "), &Fixed), "  abc/123 ");
        assert_eq!(resolve_id(Some("not-a-uuid"), &TimeOrderedIds), "not-a-uuid");
    }

    #[test]
    fn missing_or_empty_inbound_generates() {
        assert_eq!(resolve_id(None, &Fixed), "generated");
        assert_eq!(resolve_id(Some(""), &Fixed), "generated");
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids = TimeOrderedIds::new();
        let seen: HashSet<String> = (0..10_000).map(|_| ids.new_id()).collect();
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn generated_ids_sort_by_creation_time() {
        let ids = TimeOrderedIds::new();
        let first = ids.new_id();
        thread::sleep(Duration::from_millis(3));
        let second = ids.new_id();
        assert!(first < second, "{first} should sort before {second}");
    }

    #[test]
    fn generated_ids_are_header_safe() {
        let id = TimeOrderedIds::new().new_id();
        assert_eq!(id.len(), 36);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        assert!(http::HeaderValue::from_str(&id).is_ok());
    }

    #[test]
    fn id_carries_the_given_time() {
        let id = id_at(UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));
        assert_eq!(id.get_version_num(), 7);
        let (secs, nanos) = id.get_timestamp().unwrap().to_unix();
        assert_eq!((secs, nanos), (1_700_000_000, 123_000_000));
    }

    #[test]
    fn clock_before_epoch_falls_back_to_random() {
        let id = id_at(UNIX_EPOCH - Duration::from_secs(60));
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn concurrent_generation_does_not_collide() {
        let ids = Arc::new(TimeOrderedIds::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..1_000).map(|_| ids.new_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8_000);
    }
}
