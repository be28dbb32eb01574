//! # tsu-logr
//!
//! Request-scoped structured logging for the tsu HTTP framework.
//!
//! Every request gets one log entry. It is seeded with the request metadata
//! and the client's geolocation, written once when the request starts,
//! enriched by handlers while the request runs, and written again when the
//! response is done:
//!
//! ```text
//! request started   ts=… req_id=… http_scheme="http" http_proto="HTTP/1.1"
//!                   http_method="GET" remote_addr=… remote_city=… remote_country=…
//!                   remote_tz=… user_agent=… uri=…
//! request complete  …the same, any handler fields, resp_status=200
//!                   resp_bytes_length=1024 resp_elapsed_ms=2.5
//! ```
//!
//! A handler that panics gets a `request panicked` record carrying `panic`
//! and `stack` instead, and the client a `500`.
//!
//! Logging is an observer. A malformed forwarded-for header, an address the
//! geo database does not know, or a handler without a logger in front of it
//! all degrade to fewer fields, never to a failed request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tsu_logr::middleware::RequestLogger;
//! use tsu_logr::request_id::TimeOrderedIds;
//! use tsu_logr::sink::TracingSink;
//! use tsu_logr::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = RequestLogger::new(Arc::new(TracingSink), Arc::new(TimeOrderedIds::new()));
//!
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .layer(logger);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     req.set_log_field("user_id", id);
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod context;
pub mod entry;
pub mod fields;
pub mod geo;
pub mod middleware;
pub mod request_id;
pub mod sink;

pub use config::Config;
pub use context::RequestContext;
pub use entry::{LogEntry, LogHandle, Outcome};
pub use error::Error;
pub use fields::{FieldValue, Fields};
pub use handler::{BoxFuture, Handler};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
