//! Token verification and claim extraction

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value as JsonValue;

use mygate_common::error::{Error, Result};
use mygate_common::types::Claims;

/// Verifies bearer tokens and extracts request claims.
///
/// Without a configured secret every request is treated as anonymous; with
/// `required` set, requests lacking a verifiable token are rejected.
pub struct JwtVerifier {
    key: Option<DecodingKey>,
    required: bool,
}

impl JwtVerifier {
    pub fn new(secret: Option<&str>, required: bool) -> Self {
        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            required,
        }
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// Returns `None` for an acceptable anonymous request, the claim map for
    /// a verified token, or an authentication error.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Option<Claims>> {
        let token = authorization.and_then(|h| h.strip_prefix("Bearer "));

        let Some(token) = token else {
            if self.required {
                return Err(Error::AuthenticationMissing);
            }
            return Ok(None);
        };

        let Some(key) = &self.key else {
            // No secret configured: tokens cannot be verified, so the
            // request proceeds anonymously (startup rejects the
            // required-without-secret combination).
            return Ok(None);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = decode::<serde_json::Map<String, JsonValue>>(token, key, &validation)
            .map_err(|_| Error::AuthenticationInvalid)?;

        if let Some(exp) = data.claims.get("exp").and_then(JsonValue::as_i64) {
            if exp < unix_now() {
                return Err(Error::AuthenticationInvalid);
            }
        }

        Ok(Some(Claims::from_payload(&data.claims)))
    }
}

#[allow(clippy::cast_possible_wrap)]
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
