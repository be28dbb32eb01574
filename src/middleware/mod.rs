//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Register it with [`Router::layer`](crate::Router::layer);
//! the first layer registered is the outermost one and sees every request,
//! including those that match no route.
//!
//! Built-in middleware:
//! - [`RequestId`]: assigns the request identifier
//! - [`RequestLogger`]: request-scoped structured log entry with geo enrichment

pub(crate) mod logger;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use crate::request_id::RequestId;
pub use logger::RequestLogger;

/// A request interceptor.
///
/// `handle` returns a `'static` future, so implementations clone whatever
/// shared state they need into it (typically one `Arc`).
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The rest of the chain after the current middleware.
pub struct Next {
    handler: BoxedHandler,
}

impl Next {
    pub(crate) fn new(handler: BoxedHandler) -> Self {
        Self { handler }
    }

    /// Passes the request on and waits for the response.
    pub async fn run(self, req: Request) -> Response {
        self.handler.call(req).await
    }
}
