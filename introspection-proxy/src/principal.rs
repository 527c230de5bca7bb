//! Principal produced by a successful token introspection

use crate::cache::CacheWeight;
use crate::permissions::{self, EXTENSION_CLAIM};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Standard claim names (RFC 7662 section 2.2)
pub mod claims {
    pub const ACTIVE: &str = "active";
    pub const SCOPE: &str = "scope";
    pub const CLIENT_ID: &str = "client_id";
    pub const USERNAME: &str = "username";
    pub const SUBJECT: &str = "sub";
    pub const EXPIRES_AT: &str = "exp";
    pub const ISSUED_AT: &str = "iat";
    pub const NOT_BEFORE: &str = "nbf";
}

/// A granted permission or scope, e.g. `SCOPE_profile` or `fitness.heart_rate.read`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Authority {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Authority {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Authority {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity and grants of an introspected token.
///
/// A principal is never mutated once built; merging authorities produces a
/// new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    attributes: Map<String, Value>,
    authorities: Vec<Authority>,
}

impl Principal {
    pub fn new(attributes: Map<String, Value>, authorities: Vec<Authority>) -> Self {
        Self {
            attributes,
            authorities,
        }
    }

    /// All claims returned by the introspection endpoint
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn authorities(&self) -> &[Authority] {
        &self.authorities
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a.as_str() == authority)
    }

    /// Name of the principal: the subject, or the username when there is no subject
    pub fn name(&self) -> Option<&str> {
        self.subject().or_else(|| self.username())
    }

    pub fn subject(&self) -> Option<&str> {
        self.string_claim(claims::SUBJECT)
    }

    pub fn username(&self) -> Option<&str> {
        self.string_claim(claims::USERNAME)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.string_claim(claims::CLIENT_ID)
    }

    /// Scopes of the `scope` claim, either space delimited or a list
    pub fn scopes(&self) -> Vec<&str> {
        match self.attributes.get(claims::SCOPE) {
            Some(Value::String(scope)) => scope.split_whitespace().collect(),
            Some(Value::Array(scopes)) => scopes.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.attributes.get(claims::EXPIRES_AT).and_then(numeric_date)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.attributes.get(claims::ISSUED_AT).and_then(numeric_date)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.attributes.get(claims::NOT_BEFORE).and_then(numeric_date)
    }

    /// Whether the token's own `exp` claim lies strictly before `now`.
    /// A principal without `exp` never expires by claim.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp < now)
    }

    /// A field of the `ext` claims block, stringified
    pub fn extension_field(&self, field: &str) -> Option<String> {
        let value = self.attributes.get(EXTENSION_CLAIM)?.as_object()?.get(field)?;
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// A new principal with the same attributes and the merged authority set
    pub fn with_merged_authorities(&self) -> Principal {
        Principal {
            attributes: self.attributes.clone(),
            authorities: permissions::merge_authorities(&self.attributes, &self.authorities),
        }
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// Parse a NumericDate claim: seconds since the epoch, integral or
/// fractional, also accepted as a numeric string.
pub(crate) fn numeric_date(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                return DateTime::from_timestamp(secs, 0);
            }
            n.as_f64()?
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

impl CacheWeight for Principal {
    fn weight(&self) -> u32 {
        let attributes: usize = self
            .attributes
            .iter()
            .map(|(key, value)| key.len() + approximate_size(value))
            .sum();
        let authorities: usize = self.authorities.iter().map(|a| a.as_str().len()).sum();
        (attributes + authorities).try_into().unwrap_or(u32::MAX)
    }
}

fn approximate_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 8,
        Value::Number(_) => 16,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(approximate_size).sum::<usize>() + 8,
        Value::Object(map) => {
            map.iter()
                .map(|(k, v)| k.len() + approximate_size(v))
                .sum::<usize>()
                + 8
        }
    }
}
