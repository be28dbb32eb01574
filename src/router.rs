//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Middleware registered
//! with [`Router::layer`] wraps every request, matched or not, so the request
//! log also covers 404s.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{self, BoxedHandler, Handler, Token};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

static NOT_FOUND: LazyLock<BoxedHandler> = LazyLock::new(|| not_found.into_boxed_handler(Token::new()));

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use tsu_logr::{Request, Response, Router};
/// # use tsu_logr::middleware::RequestLogger;
/// # use tsu_logr::request_id::TimeOrderedIds;
/// # use tsu_logr::sink::TracingSink;
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// Router::new()
///     .get("/users/{id}", get_user)
///     .post("/users",     create_user)
///     .layer(RequestLogger::new(Arc::new(TracingSink), Arc::new(TimeOrderedIds::new())));
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), layers: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler(Token::new()))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds a middleware. The first one added runs first.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Routes one request through the middleware stack.
    pub async fn handle(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler
            }
            None => Arc::clone(&NOT_FOUND),
        };
        handler::layer(&self.layers, endpoint).call(req).await
    }

    /// Answers `status` without routing, still passing through every layer.
    ///
    /// Used for requests the server cannot hand to a route, such as ones
    /// whose body failed to arrive, so they are logged like any other.
    pub(crate) async fn reject(&self, req: Request, status: StatusCode) -> Response {
        let endpoint = (move |_req: Request| async move { Response::status(status) })
            .into_boxed_handler(Token::new());
        handler::layer(&self.layers, endpoint).call(req).await
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
