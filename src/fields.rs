//! Key/value fields carried by a request's log entry.
//!
//! [`Fields`] keeps insertion order so records read the same way every time:
//! `ts` first, the request metadata next, the response summary last. Writing
//! a name that is already present replaces its value in place. Nothing is
//! ever removed.

use std::fmt;
use std::time::Duration;

// ── FieldValue ────────────────────────────────────────────────────────────────

/// A single field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    /// The string payload, if this is a [`FieldValue::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    /// Strings are quoted, everything else is written bare.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s)   => write!(f, "{s:?}"),
            Self::Int(n)   => write!(f, "{n}"),
            Self::Uint(n)  => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b)  => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { Self::Str(v.to_owned()) }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self { Self::Str(v) }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self { Self::Str(v.clone()) }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { Self::Int(v.into()) }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self { Self::Uint(v.into()) }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self { Self::Uint(v.into()) }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self { Self::Uint(v) }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self { Self::Uint(v as u64) }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

/// Durations are logged as fractional milliseconds.
impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self { Self::Float(millis(v)) }
}

/// Nanosecond-precision duration expressed in milliseconds.
pub(crate) fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

// ── Fields ────────────────────────────────────────────────────────────────────

/// Insertion-ordered field set. Last write wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    /// Sets `key` to `value`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> Extend<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        fields.extend(iter);
        fields
    }
}

/// logfmt-style rendering: `ts="…" http_method="GET" resp_status=200`.
impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
