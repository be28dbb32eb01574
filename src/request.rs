//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderMap, Method, Uri, Version};

use crate::context::RequestContext;
use crate::entry::LogHandle;
use crate::fields::FieldValue;

/// An incoming HTTP request with its body fully read.
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    pub(crate) params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    tls: bool,
    ctx: RequestContext,
}

impl Request {
    /// Builds a request from its head and collected body.
    ///
    /// `remote_addr` is the peer of the TCP connection, `None` when unknown.
    pub fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr,
            tls: false,
            ctx: RequestContext::default(),
        }
    }

    /// Marks the request as received over a TLS-terminated connection.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn is_tls(&self) -> bool { self.tls }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    // ── Request metadata for logging ──────────────────────────────────────────

    /// `https` on a TLS connection, `http` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.tls { "https" } else { "http" }
    }

    /// Protocol version as written on the wire, e.g. `HTTP/1.1`.
    pub fn proto(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2  => "HTTP/2.0",
            Version::HTTP_3  => "HTTP/3.0",
            _                => "HTTP/1.1",
        }
    }

    /// `Host` header, or the URI authority for HTTP/2 requests.
    pub fn host(&self) -> &str {
        self.header(HOST.as_str())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// Path plus query string, as sent by the client.
    pub fn request_target(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// `scheme://host/path?query`.
    pub fn full_uri(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.host(), self.request_target())
    }

    pub fn user_agent(&self) -> &str {
        self.header(USER_AGENT.as_str()).unwrap_or("")
    }

    /// Client address: the forwarded-for header when present and non-empty,
    /// otherwise the connection peer as `ip:port`.
    pub fn client_addr(&self, forwarded_for_header: &str) -> String {
        match self.header(forwarded_for_header) {
            Some(forwarded) if !forwarded.is_empty() => forwarded.to_owned(),
            _ => self.remote_addr.map(|a| a.to_string()).unwrap_or_default(),
        }
    }

    // ── Request context ───────────────────────────────────────────────────────

    pub fn context(&self) -> &RequestContext { &self.ctx }
    pub fn context_mut(&mut self) -> &mut RequestContext { &mut self.ctx }

    /// The request identifier, once a middleware assigned one.
    pub fn request_id(&self) -> Option<&str> {
        self.ctx.request_id()
    }

    /// The request's live log entry, if a request logger is installed.
    pub fn log_entry(&self) -> Option<LogHandle> {
        self.ctx.get_log_entry()
    }

    /// Adds a field to the request's log entry. No-op without one.
    pub fn set_log_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.ctx.set_field(key, value);
    }

    /// Adds several fields to the request's log entry. No-op without one.
    pub fn set_log_fields<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.ctx.set_fields(pairs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(builder: http::request::Builder, remote: Option<&str>) -> Request {
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::from_parts(parts, Bytes::new(), remote.map(|a| a.parse().unwrap()))
    }

    #[test]
    fn reconstructs_full_uri() {
        let req = request(
            http::Request::builder()
                .uri("/search?q=rust&page=2")
                .header("host", "api.example.com"),
            None,
        );
        assert_eq!(req.full_uri(), "http://api.example.com/search?q=rust&page=2");
        assert_eq!(req.with_tls(true).full_uri(), "https://api.example.com/search?q=rust&page=2");
    }

    #[test]
    fn host_falls_back_to_authority() {
        let req = request(
            http::Request::builder()
                .uri("https://h2.example.com/a")
                .version(Version::HTTP_2),
            None,
        );
        assert_eq!(req.host(), "h2.example.com");
        assert_eq!(req.proto(), "HTTP/2.0");
    }

    #[test]
    fn client_addr_prefers_forwarded_for() {
        let builder = http::Request::builder().header("X-Forwarded-For", "203.0.113.5, 70.41.3.18");
        let req = request(builder, Some("10.0.0.9:51000"));
        assert_eq!(req.client_addr("x-forwarded-for"), "203.0.113.5, 70.41.3.18");

        let req = request(http::Request::builder(), Some("10.0.0.9:51000"));
        assert_eq!(req.client_addr("x-forwarded-for"), "10.0.0.9:51000");

        let req = request(http::Request::builder(), None);
        assert_eq!(req.client_addr("x-forwarded-for"), "");
    }

    #[test]
    fn missing_user_agent_is_empty() {
        let req = request(http::Request::builder(), None);
        assert_eq!(req.user_agent(), "");
        assert_eq!(req.proto(), "HTTP/1.1");
        assert_eq!(req.request_target(), "/");
    }
}
