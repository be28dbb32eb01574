//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections, lets every
//! in-flight connection finish, and returns from [`Server::serve`].
//!
//! # Panics in handlers
//!
//! A handler panic unwinds through the middleware stack (the request logger
//! records it on the way) and is caught here. The client gets a `500` and the
//! connection task survives.
//!
//! # Unreadable bodies
//!
//! A request whose body fails to arrive is answered `400 Bad Request`
//! without reaching a route. It still passes through every middleware
//! layer, so it is logged like any other request.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::middleware::logger::panic_message;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: String,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called. The address is validated there.
    ///
    /// ```rust,no_run
    /// use tsu_logr::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    fn socket_addr(&self) -> Result<SocketAddr, Error> {
        self.addr
            .parse()
            .map_err(|source| Error::InvalidAddr { addr: self.addr.clone(), source })
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `shutdown` resolves, then drains in-flight
    /// connections.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = self.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let router = Arc::new(router);

        info!(%addr, "tsu listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("tsu stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body, routes the request, and never fails towards hyper.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let (body, rejected) = match body.collect().await {
        Ok(collected) => (collected.to_bytes(), None),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            (Bytes::new(), Some(StatusCode::BAD_REQUEST))
        }
    };

    let req = Request::from_parts(parts, body, Some(remote_addr));
    Ok(respond(&router, req, rejected).await.into_inner())
}

/// Runs the router, or [`Router::reject`] when `rejected` is set, turning an
/// escaped panic into `500 Internal Server Error`.
async fn respond(router: &Router, req: Request, rejected: Option<StatusCode>) -> Response {
    let method = req.method().clone();
    let path = req.path().to_owned();

    let res = match rejected {
        Some(status) => AssertUnwindSafe(router.reject(req, status)).catch_unwind().await,
        None => AssertUnwindSafe(router.handle(req)).catch_unwind().await,
    };
    match res {
        Ok(res) => res,
        Err(payload) => {
            error!(%method, %path, panic = %panic_message(payload.as_ref()), "handler panicked");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT (Ctrl-C). Windows only has Ctrl-C.
///
/// If a handler cannot be installed that signal is ignored and a warning is
/// logged; the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
