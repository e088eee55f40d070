//! Request-scoped claim types and API response envelopes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// Claims
// ============================================================================

/// A single claim value from a verified bearer token.
///
/// Claims are heterogeneous; object and array values are carried as their
/// JSON text so they can be bound as SQL strings without a second encode
/// decision at the call site.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    Str(String),
    Num(serde_json::Number),
    Bool(bool),
    Null,
    Json(String),
}

impl ClaimValue {
    /// Convert a decoded JSON value into a claim value
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Number(n) => Self::Num(n.clone()),
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Null => Self::Null,
            other => Self::Json(other.to_string()),
        }
    }
}

/// The per-request claim map derived from a verified bearer token.
///
/// Immutable within a request; absent entirely when the request is anonymous.
/// Iteration order is the claim-name order, which keeps emitted SQL stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    values: BTreeMap<String, ClaimValue>,
}

impl Claims {
    /// Build a claim map from a decoded token payload
    pub fn from_payload(payload: &serde_json::Map<String, JsonValue>) -> Self {
        let values = payload
            .iter()
            .map(|(k, v)| (k.clone(), ClaimValue::from_json(v)))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Response envelopes
// ============================================================================

/// Standard API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}
