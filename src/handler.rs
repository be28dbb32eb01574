//! Handler trait, type erasure, and middleware layering.
//!
//! Route handlers of different concrete types live in one routing table, so
//! each is boxed behind [`ErasedHandler`]. Middleware works on the same
//! erased form: wrapping a handler produces another handler.
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! Arc::new(Endpoint(hello))                        ← BoxedHandler
//!        ↓ per request, outermost layer first
//! Layered { middleware, next: Layered { …, next: Endpoint } }
//!        ↓
//! handler.call(req) → BoxFuture
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the public `Handler` trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every `async fn(Request) -> impl IntoResponse`, and for
/// closures of the same shape.
///
/// Only this crate can call the conversion, since it takes a [`Token`]
/// nobody else can build.
pub trait Handler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self, token: Token) -> BoxedHandler;
}

#[doc(hidden)]
pub struct Token(());

impl Token {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self, _: Token) -> BoxedHandler {
        Arc::new(Endpoint(self))
    }
}

/// A route function behind the erased interface.
struct Endpoint<F>(F);

impl<F, Fut, R> ErasedHandler for Endpoint<F>
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        (self.0)(req).map(IntoResponse::into_response).boxed()
    }
}

// ── Layering ──────────────────────────────────────────────────────────────────

/// A handler with one middleware in front of it.
struct Layered {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Layered {
    fn call(&self, req: Request) -> BoxFuture {
        self.middleware.handle(req, Next::new(Arc::clone(&self.next)))
    }
}

/// Wraps `endpoint` so that `layers[0]` runs first and the endpoint last.
pub(crate) fn layer(layers: &[Arc<dyn Middleware>], endpoint: BoxedHandler) -> BoxedHandler {
    layers.iter().rev().fold(endpoint, |next, middleware| {
        Arc::new(Layered { middleware: Arc::clone(middleware), next }) as BoxedHandler
    })
}
