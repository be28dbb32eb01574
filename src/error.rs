//! Unified error type.

/// The error type returned by tsu's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. Request logging
/// never produces one either: a failed geo lookup or a missing log entry
/// degrades silently. This type surfaces infrastructure failures: binding to
/// a port, accepting a connection, or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
