//! Claim extraction from bearer identity tokens.
//!
//! Only the token structure is checked here. Any `alg` is accepted;
//! signature verification belongs to the identity layer in front of the
//! connector.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PolicyError, PolicyResult};

/// Claim carrying the participant identity, used in diagnostics.
pub const PARTICIPANT_ID_CLAIM: &str = "participant_id";

/// Claims asserted about the caller, in token document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Map<String, Value>,
}

impl ClaimSet {
    pub fn from_map(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Decode a compact JWS (`header.payload.signature`), with or without a
    /// `Bearer ` prefix.
    pub fn from_token(token: &str) -> PolicyResult<Self> {
        let token = strip_bearer(token.trim());
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(decode_failure(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }

        // Header must be an object with a string `alg`.
        let header = decode_segment(parts[0], "header")?;
        match header.get("alg") {
            Some(Value::String(alg)) => tracing::debug!(%alg, "token header"),
            _ => return Err(decode_failure("header has no string 'alg'".to_string())),
        }

        match decode_segment(parts[1], "payload")? {
            Value::Object(claims) => {
                tracing::debug!(claims = claims.len(), "decoded identity token");
                Ok(Self { claims })
            }
            other => Err(decode_failure(format!(
                "payload must be a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn get_object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.claims.get(name).and_then(Value::as_object)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.claims.iter()
    }

    /// Participant identity for log lines: `participant_id`, else `sub`.
    pub fn participant_id(&self) -> Option<&str> {
        self.get_str(PARTICIPANT_ID_CLAIM)
            .or_else(|| self.get_str("sub"))
    }
}

fn decode_segment(segment: &str, name: &str) -> PolicyResult<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| decode_failure(format!("{} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| decode_failure(format!("{} is not JSON: {}", name, e)))
}

fn strip_bearer(token: &str) -> &str {
    match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => token[7..].trim_start(),
        _ => token,
    }
}

fn decode_failure(reason: String) -> PolicyError {
    tracing::warn!(reason = "E_TOKEN_DECODE", "{}", reason);
    PolicyError::TokenDecode { reason }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
