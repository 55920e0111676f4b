//! Contract negotiation value types.
//!
//! These mirror the shape of a dataspace contract request: a request wraps
//! an offer, the offer wraps a policy, and the policy's permissions carry the
//! constraints that the rewriter and the rule functions operate on. Every
//! type is an immutable value; transformations build new values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// ODRL constraint operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
    In,
    HasPart,
    IsA,
    IsAllOf,
    IsAnyOf,
    IsNoneOf,
    IsPartOf,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Geq,
        Operator::Lt,
        Operator::Leq,
        Operator::In,
        Operator::HasPart,
        Operator::IsA,
        Operator::IsAllOf,
        Operator::IsAnyOf,
        Operator::IsNoneOf,
        Operator::IsPartOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Gt => "GT",
            Operator::Geq => "GEQ",
            Operator::Lt => "LT",
            Operator::Leq => "LEQ",
            Operator::In => "IN",
            Operator::HasPart => "HAS_PART",
            Operator::IsA => "IS_A",
            Operator::IsAllOf => "IS_ALL_OF",
            Operator::IsAnyOf => "IS_ANY_OF",
            Operator::IsNoneOf => "IS_NONE_OF",
            Operator::IsPartOf => "IS_PART_OF",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = PolicyError;

    /// Accepts `EQ`, `eq`, `odrl:eq`, `isNoneOf`, `odrl:isNoneOf`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw
            .strip_prefix("odrl:")
            .or_else(|| raw.strip_prefix("http://www.w3.org/ns/odrl/2/"))
            .unwrap_or(raw);
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        Operator::ALL
            .iter()
            .find(|op| op.as_str().replace('_', "") == normalized)
            .copied()
            .ok_or_else(|| PolicyError::config(format!("unknown operator '{}'", s)))
    }
}

/// A literal expression on either side of a constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(Value);

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Strings render unquoted, everything else as compact JSON.
    pub fn as_text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Self::literal(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicConstraint {
    pub left_expression: Expression,
    pub operator: Operator,
    pub right_expression: Expression,
}

impl AtomicConstraint {
    pub fn new(
        left_expression: impl Into<Expression>,
        operator: Operator,
        right_expression: impl Into<Expression>,
    ) -> Self {
        Self {
            left_expression: left_expression.into(),
            operator,
            right_expression: right_expression.into(),
        }
    }
}

/// Atomic comparison or a logical combination of nested constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    Atomic(AtomicConstraint),
    And { and: Vec<Constraint> },
    Or { or: Vec<Constraint> },
    Xone { xone: Vec<Constraint> },
}

impl Constraint {
    pub fn atomic(
        left_expression: impl Into<Expression>,
        operator: Operator,
        right_expression: impl Into<Expression>,
    ) -> Self {
        Self::Atomic(AtomicConstraint::new(
            left_expression,
            operator,
            right_expression,
        ))
    }

    pub fn as_atomic(&self) -> Option<&AtomicConstraint> {
        match self {
            Self::Atomic(atomic) => Some(atomic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
        }
    }
}

/// Duties are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duty(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub action: Action,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub duties: Vec<Duty>,
}

impl Permission {
    pub fn new(action: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        Self {
            action: Action::new(action),
            constraints,
            duties: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    #[default]
    Set,
    Offer,
    Contract,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub prohibitions: Vec<Value>,
    #[serde(default)]
    pub obligations: Vec<Value>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub extensible_properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOffer {
    pub id: String,
    pub asset_id: String,
    pub policy: Policy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAddress {
    pub uri: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub transactional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest {
    #[serde(default)]
    pub callback_addresses: Vec<CallbackAddress>,
    pub protocol: String,
    pub counter_party_address: String,
    pub contract_offer: ContractOffer,
}

impl ContractRequest {
    pub fn permissions(&self) -> &[Permission] {
        &self.contract_offer.policy.permissions
    }
}
