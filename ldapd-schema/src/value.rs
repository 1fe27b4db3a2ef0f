//! Decoded attribute values.

use crate::dn::Dn;
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;

/// An attribute or assertion value decoded by its syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Boolean(bool),
    Oid(String),
    Dn(Dn),
    Time(DateTime<FixedOffset>),
}

impl Value {
    /// Canonical LDAP string encoding of the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b.clone(),
            other => other.to_string().into_bytes(),
        }
    }
}

/// Formats a timestamp as an RFC4517 GeneralizedTime in UTC.
pub fn format_generalized_time(time: &DateTime<FixedOffset>) -> String {
    time.with_timezone(&Utc)
        .format("%Y%m%d%H%M%S%.fZ")
        .to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Oid(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Dn(dn) => write!(f, "{}", dn),
            Value::Time(t) => write!(f, "{}", format_generalized_time(t)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Dn> for Value {
    fn from(dn: Dn) -> Self {
        Value::Dn(dn)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}
