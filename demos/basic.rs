//! Request logging demo: a couple of JSON endpoints behind `RequestLogger`.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Optional environment:
//!   TSU_ADDR       bind address (default 0.0.0.0:3000)
//!   TSU_GEO_TABLE  path to a JSON geo table, e.g.
//!                  {"203.0.113.5": {"city": "Seattle", "country": "US", "timezone": "America/Los_Angeles"}}
//!   TSU_LOG_CONFIG path to a JSON logger config, e.g. {"request_id_header": "x-correlation-id"}
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -H 'x-forwarded-for: 203.0.113.5:443, 70.41.3.18' http://localhost:3000/users/42
//!   curl -H 'x-request-id: from-upstream' -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl http://localhost:3000/panic

use std::fs::File;
use std::sync::Arc;

use http::StatusCode;
use tsu_logr::geo::GeoTable;
use tsu_logr::middleware::RequestLogger;
use tsu_logr::request_id::TimeOrderedIds;
use tsu_logr::sink::TracingSink;
use tsu_logr::{Config, Error, Request, Response, Router, Server};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = match std::env::var("TSU_LOG_CONFIG") {
        Ok(path) => Config::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => Config::default(),
    };

    let mut logger = RequestLogger::new(Arc::new(TracingSink), Arc::new(TimeOrderedIds::new()))
        .with_config(config);
    if let Ok(path) = std::env::var("TSU_GEO_TABLE") {
        let table = GeoTable::from_reader(File::open(path)?)?;
        tracing::info!(entries = table.len(), "geo table loaded");
        logger = logger.with_geo(Arc::new(table));
    }

    let app = Router::new()
        .get("/users/{id}",    get_user)
        .post("/users",        create_user)
        .delete("/users/{id}", delete_user)
        .get("/panic",         explode)
        .layer(logger);

    let addr = std::env::var("TSU_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());
    Server::bind(addr).serve(app).await
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    req.set_log_field("user_id", id);
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        req.set_log_field("reject_reason", "empty body");
        return Response::status(StatusCode::BAD_REQUEST);
    }

    req.set_log_fields([("user_id", "99"), ("action", "create")]);
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(req: Request) -> StatusCode {
    if let Some(log) = req.log_entry() {
        log.info("deleting user");
    }
    StatusCode::NO_CONTENT
}

// GET /panic → 500, with a "request panicked" record
async fn explode(_req: Request) -> Response {
    panic!("demo panic");
}
