//! Request logging configuration.

use serde::Deserialize;

use crate::error::Error;

pub(crate) const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";
pub(crate) const DEFAULT_FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Tunables for [`RequestLogger`](crate::middleware::RequestLogger).
///
/// Every key is optional; missing keys keep their defaults:
///
/// ```json
/// { "request_id_header": "x-correlation-id", "emit_panic_record": false }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Inbound header carrying an upstream-assigned request identifier.
    pub request_id_header: String,
    /// Inbound header listing the client/proxy address chain.
    pub forwarded_for_header: String,
    /// Emit an error-level "request panicked" record when a handler panics.
    /// When `false` the panic is only captured into the entry's fields.
    pub emit_panic_record: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_owned(),
            forwarded_for_header: DEFAULT_FORWARDED_FOR_HEADER.to_owned(),
            emit_panic_record: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = Config::from_json(r#"{"request_id_header": "x-correlation-id"}"#).unwrap();
        assert_eq!(config.request_id_header, "x-correlation-id");
        assert_eq!(config.forwarded_for_header, "x-forwarded-for");
        assert!(config.emit_panic_record);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"request_id": "x"}"#),
            Err(Error::Json(_))
        ));
    }
}
