//! Rule functions evaluated at policy enforcement time.
//!
//! A rule function decides one atomic constraint from the constraint's
//! operator and right value plus the caller's claims. Missing claims deny
//! (fail-closed); unreadable claim data is an error (fail-loud).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::{ClaimSet, PARTICIPANT_ID_CLAIM};
use crate::error::PolicyResult;
use crate::geometry::{geometry_equals, geometry_intersects, parse_claim_geometry, parse_geometry};
use crate::model::{Expression, Operator, Permission};

pub const DEFAULT_ROLE_CLAIM: &str = "role";
pub const DEFAULT_GEOMETRY_CLAIM: &str = "geometry";

/// A predicate over `(operator, right value, permission, claims)`.
///
/// Operators a function does not understand evaluate to `false`.
pub trait RuleFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        operator: Operator,
        right_value: &Expression,
        permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<bool>;
}

/// Configuration tag selecting a rule function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    NoRestriction,
    RoleVerification,
    GeometryFilter,
}

/// Always allows. Escape hatch for unrestricted assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRestriction;

impl RuleFunction for NoRestriction {
    fn name(&self) -> &'static str {
        "no_restriction"
    }

    fn evaluate(
        &self,
        operator: Operator,
        right_value: &Expression,
        _permission: &Permission,
        _claims: &ClaimSet,
    ) -> PolicyResult<bool> {
        tracing::debug!(%operator, right = %right_value, "unrestricted constraint");
        Ok(true)
    }
}

/// Compares the caller's role claim with the constraint's right value.
#[derive(Debug, Clone)]
pub struct RoleVerification {
    pub claim: String,
    pub participant_claim: String,
}

impl Default for RoleVerification {
    fn default() -> Self {
        Self {
            claim: DEFAULT_ROLE_CLAIM.to_string(),
            participant_claim: PARTICIPANT_ID_CLAIM.to_string(),
        }
    }
}

impl RoleVerification {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            ..Self::default()
        }
    }

    fn is_member(role: &str, right_value: &Expression) -> bool {
        list_items(right_value)
            .iter()
            .any(|item| same_role(item, role))
    }
}

impl RuleFunction for RoleVerification {
    fn name(&self) -> &'static str {
        "role_verification"
    }

    fn evaluate(
        &self,
        operator: Operator,
        right_value: &Expression,
        _permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<bool> {
        let role = match claims.get(&self.claim).and_then(claim_text) {
            Some(role) => role,
            None => {
                tracing::info!(
                    reason = "W_CLAIM_ABSENT",
                    claim = %self.claim,
                    participant = claims.get_str(&self.participant_claim).unwrap_or("<unknown>"),
                    "role claim missing, denying"
                );
                return Ok(false);
            }
        };
        tracing::debug!(%role, %operator, right = %right_value, "verifying role");

        let expected = right_value.as_text();
        Ok(match operator {
            Operator::Eq => same_role(&role, &expected),
            Operator::Neq => !same_role(&role, &expected),
            Operator::In => Self::is_member(&role, right_value),
            Operator::IsNoneOf => !Self::is_member(&role, right_value),
            _ => false,
        })
    }
}

/// Compares the caller's geometry claim with a WKT right value.
#[derive(Debug, Clone)]
pub struct GeometryFilter {
    pub claim: String,
    pub participant_claim: String,
}

impl Default for GeometryFilter {
    fn default() -> Self {
        Self {
            claim: DEFAULT_GEOMETRY_CLAIM.to_string(),
            participant_claim: PARTICIPANT_ID_CLAIM.to_string(),
        }
    }
}

impl GeometryFilter {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            ..Self::default()
        }
    }
}

impl RuleFunction for GeometryFilter {
    fn name(&self) -> &'static str {
        "geometry_filter"
    }

    fn evaluate(
        &self,
        operator: Operator,
        right_value: &Expression,
        _permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<bool> {
        let claim = match claims.get(&self.claim) {
            Some(value) if !value.is_null() => value,
            _ => {
                tracing::info!(
                    reason = "W_CLAIM_ABSENT",
                    claim = %self.claim,
                    participant = claims.get_str(&self.participant_claim).unwrap_or("<unknown>"),
                    "geometry claim missing, denying"
                );
                return Ok(false);
            }
        };

        let claim_geometry = parse_claim_geometry(claim)?;
        let constraint_geometry = parse_geometry(&right_value.as_text())?;
        tracing::debug!(%operator, right = %right_value, "evaluating geometry constraint");

        Ok(match operator {
            Operator::Eq => geometry_equals(&claim_geometry, &constraint_geometry),
            Operator::In => geometry_intersects(&claim_geometry, &constraint_geometry),
            _ => false,
        })
    }
}

/// Case-insensitive comparison with full Unicode case folding.
fn same_role(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn claim_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Right value as a list: JSON array of strings, or comma-separated text.
fn list_items(right_value: &Expression) -> Vec<String> {
    match right_value.value() {
        Value::Array(items) => items
            .iter()
            .filter_map(claim_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => right_value
            .as_text()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}
