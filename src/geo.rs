//! Best-effort geolocation of the client address.
//!
//! Forwarded-for headers are client-controlled and routinely malformed:
//! several addresses, missing ports, plain garbage. Every failure here
//! degrades to "fewer fields logged", never to an error.

use std::collections::HashMap;
use std::io::Read;
use std::net::IpAddr;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Error;
use crate::fields::Fields;

/// Location data for one address.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct GeoRecord {
    /// English display name of the city, when the database has one.
    #[serde(default)]
    pub city: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    #[serde(default)]
    pub country: String,
    /// IANA time zone name, e.g. `America/Los_Angeles`.
    #[serde(default)]
    pub timezone: String,
}

/// Why a lookup produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("address not found")]
    NotFound,

    #[error("geo database error: {0}")]
    Backend(String),
}

/// A geolocation database. Read concurrently by every request.
pub trait GeoLookup: Send + Sync + 'static {
    fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, LookupError>;
}

// ── GeoTable ──────────────────────────────────────────────────────────────────

/// In-memory exact-address table.
///
/// Loads from a JSON object keyed by IP literal:
///
/// ```json
/// { "203.0.113.5": { "city": "Seattle", "country": "US", "timezone": "America/Los_Angeles" } }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct GeoTable {
    entries: HashMap<IpAddr, GeoRecord>,
}

impl GeoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, ip: IpAddr, record: GeoRecord) -> Self {
        self.entries.insert(ip, record);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, Error> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl GeoLookup for GeoTable {
    fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, LookupError> {
        self.entries.get(&ip).cloned().ok_or(LookupError::NotFound)
    }
}

// ── Address parsing ───────────────────────────────────────────────────────────

/// Extracts the client IP from a remote-address string.
///
/// Takes the first comma-separated entry, trimmed. When it splits into host
/// and port, only the host is read as an IP literal and the port text is
/// ignored, whatever it holds. Otherwise the whole entry must be a bare IP.
pub fn parse_client_ip(remote_addr: &str) -> Option<IpAddr> {
    let first = remote_addr.split(',').next()?.trim();
    split_host_port(first).unwrap_or(first).parse().ok()
}

/// Returns the host part of `host:port` or `[host]:port`.
///
/// The port may be empty, non-numeric or out of range. An unbracketed host
/// must not contain a colon, so a bare IPv6 literal does not split.
fn split_host_port(hostport: &str) -> Option<&str> {
    let colon = hostport.rfind(':')?;

    if hostport.starts_with('[') {
        let end = hostport.find(']')?;
        if end + 1 != colon || hostport[1..].contains('[') || hostport[end + 1..].contains(']') {
            return None;
        }
        return Some(&hostport[1..end]);
    }

    let host = &hostport[..colon];
    if host.contains(':') || hostport.contains(['[', ']']) {
        return None;
    }
    Some(host)
}

// ── GeoEnricher ───────────────────────────────────────────────────────────────

/// Produces the `remote_*` fields of a request record.
#[derive(Clone, Default)]
pub struct GeoEnricher {
    db: Option<Arc<dyn GeoLookup>>,
}

impl GeoEnricher {
    /// An enricher that only records the raw remote address.
    pub fn disabled() -> Self {
        Self { db: None }
    }

    pub fn new(db: Arc<dyn GeoLookup>) -> Self {
        Self { db: Some(db) }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    /// Returns `remote_addr` plus, when the lookup succeeds, `remote_city`,
    /// `remote_country` and `remote_tz`. The flag tells whether geo fields
    /// were added.
    pub fn enrich(&self, remote_addr: &str) -> (Fields, bool) {
        let mut fields = Fields::with_capacity(4);
        fields.insert("remote_addr", remote_addr);

        let Some(db) = &self.db else {
            return (fields, false);
        };
        let Some(ip) = parse_client_ip(remote_addr) else {
            return (fields, false);
        };
        let record = match db.lookup(ip) {
            Ok(record) => record,
            Err(e) => {
                tracing::trace!(%ip, error = %e, "geo lookup skipped");
                return (fields, false);
            }
        };

        fields.insert("remote_city", record.city.unwrap_or_default());
        fields.insert("remote_country", record.country);
        fields.insert("remote_tz", record.timezone);
        (fields, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seattle() -> GeoRecord {
        GeoRecord {
            city: Some("Seattle".to_owned()),
            country: "US".to_owned(),
            timezone: "America/Los_Angeles".to_owned(),
        }
    }

    fn enricher() -> GeoEnricher {
        let table = GeoTable::new()
            .insert("203.0.113.5".parse().unwrap(), seattle())
            .insert("2001:db8::1".parse().unwrap(), GeoRecord {
                city: None,
                country: "DE".to_owned(),
                timezone: "Europe/Berlin".to_owned(),
            });
        GeoEnricher::new(Arc::new(table))
    }

    struct Broken;

    impl GeoLookup for Broken {
        fn lookup(&self, _ip: IpAddr) -> Result<GeoRecord, LookupError> {
            Err(LookupError::Backend("corrupt database".to_owned()))
        }
    }

    #[test]
    fn parses_forwarded_for_variants() {
        let v4: IpAddr = "203.0.113.5".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();

        assert_eq!(parse_client_ip("203.0.113.5"), Some(v4));
        assert_eq!(parse_client_ip("203.0.113.5:443"), Some(v4));
        assert_eq!(parse_client_ip(" 203.0.113.5 , 70.41.3.18"), Some(v4));
        assert_eq!(parse_client_ip("[2001:db8::1]:8080"), Some(v6));
        assert_eq!(parse_client_ip("2001:db8::1"), Some(v6));
        assert_eq!(parse_client_ip("[2001:db8::1]:"), Some(v6));

        // Port text is never validated.
        assert_eq!(parse_client_ip("203.0.113.5:abc"), Some(v4));
        assert_eq!(parse_client_ip("203.0.113.5:70000"), Some(v4));
        assert_eq!(parse_client_ip("203.0.113.5:"), Some(v4));

        assert_eq!(parse_client_ip(""), None);
        assert_eq!(parse_client_ip("garbage"), None);
        assert_eq!(parse_client_ip("example.com:80"), None);
        assert_eq!(parse_client_ip("[2001:db8::1]"), None);
        assert_eq!(parse_client_ip("[203.0.113.5:80"), None);
        assert_eq!(parse_client_ip("203.0.113.5]:80"), None);
    }

    #[test]
    fn forwarded_chain_uses_first_entry() {
        let (fields, found) = enricher().enrich("203.0.113.5:443, 70.41.3.18");

        assert!(found);
        assert_eq!(fields.get("remote_addr"), Some(&"203.0.113.5:443, 70.41.3.18".into()));
        assert_eq!(fields.get("remote_city"), Some(&"Seattle".into()));
        assert_eq!(fields.get("remote_country"), Some(&"US".into()));
        assert_eq!(fields.get("remote_tz"), Some(&"America/Los_Angeles".into()));
    }

    #[test]
    fn odd_port_still_resolves() {
        let (fields, found) = enricher().enrich("203.0.113.5:70000, 1.2.3.4");
        assert!(found);
        assert_eq!(fields.get("remote_city"), Some(&"Seattle".into()));
    }

    #[test]
    fn missing_city_name_is_empty() {
        let (fields, found) = enricher().enrich("2001:db8::1");
        assert!(found);
        assert_eq!(fields.get("remote_city"), Some(&"".into()));
        assert_eq!(fields.get("remote_country"), Some(&"DE".into()));
    }

    #[test]
    fn unusable_input_adds_no_geo_fields() {
        for input in ["", "garbage", "198.51.100.7", "198.51.100.7:80"] {
            let (fields, found) = enricher().enrich(input);
            assert!(!found, "{input:?}");
            assert_eq!(fields.keys().collect::<Vec<_>>(), ["remote_addr"], "{input:?}");
        }
    }

    #[test]
    fn backend_errors_are_swallowed() {
        let (fields, found) = GeoEnricher::new(Arc::new(Broken)).enrich("203.0.113.5");
        assert!(!found);
        assert!(!fields.contains_key("remote_country"));
    }

    #[test]
    fn disabled_records_address_only() {
        let (fields, found) = GeoEnricher::disabled().enrich("10.0.0.9:51000");
        assert!(!found);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("remote_addr"), Some(&"10.0.0.9:51000".into()));
    }

    #[test]
    fn loads_table_from_json() {
        let table = GeoTable::from_json(
            r#"{"203.0.113.5": {"city": "Seattle", "country": "US", "timezone": "America/Los_Angeles"}}"#,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("203.0.113.5".parse().unwrap()).unwrap(), seattle());
        assert!(matches!(
            table.lookup("10.0.0.1".parse().unwrap()),
            Err(LookupError::NotFound)
        ));
    }

    #[test]
    fn rejects_malformed_table() {
        assert!(GeoTable::from_json(r#"{"not-an-ip": {}}"#).is_err());
    }
}
