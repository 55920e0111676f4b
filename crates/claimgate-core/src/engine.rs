//! Rule registry and permission evaluation.
//!
//! Rule functions are bound to constraint left expressions. At enforcement
//! time each atomic constraint is routed to its bound function; logical
//! constraints combine the results of their children.

use std::collections::HashMap;
use std::sync::Arc;

use crate::claims::ClaimSet;
use crate::config::PolicyConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::model::{AtomicConstraint, Constraint, Permission, Policy};
use crate::rules::RuleFunction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny {
        left_expression: Option<String>,
        reason: String,
    },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    fn deny(left_expression: Option<String>, reason: impl Into<String>) -> Self {
        PolicyDecision::Deny {
            left_expression,
            reason: reason.into(),
        }
    }
}

#[derive(Default, Clone)]
pub struct RuleRegistry {
    functions: HashMap<String, Arc<dyn RuleFunction>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<(&String, &'static str)> = self
            .functions
            .iter()
            .map(|(key, function)| (key, function.name()))
            .collect();
        bound.sort();
        f.debug_struct("RuleRegistry").field("bound", &bound).finish()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `function` to constraints whose left expression is `key`.
    /// A later registration for the same key replaces the earlier one.
    pub fn register(&mut self, key: impl Into<String>, function: Arc<dyn RuleFunction>) {
        let key = key.into();
        tracing::debug!(key = %key, function = function.name(), "registered rule function");
        self.functions.insert(key, function);
    }

    /// Registry with one rule function per configured binding.
    pub fn from_bindings(config: &PolicyConfig) -> Self {
        let mut registry = Self::new();
        for (key, kind) in &config.bindings {
            registry.register(key.clone(), config.rule_function(*kind));
        }
        registry
    }

    pub fn function_for(&self, key: &str) -> Option<&Arc<dyn RuleFunction>> {
        self.functions.get(key)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Permissions are alternatives: the first allowing permission wins.
    pub fn evaluate_policy(&self, policy: &Policy, claims: &ClaimSet) -> PolicyResult<PolicyDecision> {
        let mut first_denial = None;
        for permission in &policy.permissions {
            match self.evaluate_permission(permission, claims)? {
                PolicyDecision::Allow => return Ok(PolicyDecision::Allow),
                denial => {
                    first_denial.get_or_insert(denial);
                }
            }
        }
        Ok(first_denial
            .unwrap_or_else(|| PolicyDecision::deny(None, "policy grants no permissions")))
    }

    /// Like [`evaluate_policy`](Self::evaluate_policy), with a denial
    /// reported as [`PolicyError::AccessDenied`].
    pub fn enforce(&self, policy: &Policy, claims: &ClaimSet) -> PolicyResult<()> {
        match self.evaluate_policy(policy, claims)? {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny {
                left_expression,
                reason,
            } => {
                let reason = match left_expression {
                    Some(left) => format!("{} ({})", reason, left),
                    None => reason,
                };
                Err(PolicyError::AccessDenied { reason })
            }
        }
    }

    /// All constraints of a permission must hold. No constraints allows.
    pub fn evaluate_permission(
        &self,
        permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<PolicyDecision> {
        for constraint in &permission.constraints {
            let decision = self.evaluate_constraint(constraint, permission, claims)?;
            if !decision.is_allowed() {
                return Ok(decision);
            }
        }
        Ok(PolicyDecision::Allow)
    }

    fn evaluate_constraint(
        &self,
        constraint: &Constraint,
        permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<PolicyDecision> {
        match constraint {
            Constraint::Atomic(atomic) => self.evaluate_atomic(atomic, permission, claims),
            Constraint::And { and } => {
                for child in and {
                    let decision = self.evaluate_constraint(child, permission, claims)?;
                    if !decision.is_allowed() {
                        return Ok(decision);
                    }
                }
                Ok(PolicyDecision::Allow)
            }
            Constraint::Or { or } => {
                for child in or {
                    if self.evaluate_constraint(child, permission, claims)?.is_allowed() {
                        return Ok(PolicyDecision::Allow);
                    }
                }
                Ok(PolicyDecision::deny(None, "no alternative of OR constraint holds"))
            }
            Constraint::Xone { xone } => {
                let mut satisfied = 0usize;
                for child in xone {
                    if self.evaluate_constraint(child, permission, claims)?.is_allowed() {
                        satisfied += 1;
                    }
                }
                if satisfied == 1 {
                    Ok(PolicyDecision::Allow)
                } else {
                    Ok(PolicyDecision::deny(
                        None,
                        format!("XONE constraint satisfied by {} alternatives", satisfied),
                    ))
                }
            }
        }
    }

    fn evaluate_atomic(
        &self,
        atomic: &AtomicConstraint,
        permission: &Permission,
        claims: &ClaimSet,
    ) -> PolicyResult<PolicyDecision> {
        let key = atomic.left_expression.as_text();
        let Some(function) = self.functions.get(&key) else {
            tracing::warn!(reason = "W_RULE_UNBOUND", left = %key, "no rule function bound, denying");
            return Ok(PolicyDecision::deny(
                Some(key),
                "no rule function bound to left expression",
            ));
        };

        if function.evaluate(atomic.operator, &atomic.right_expression, permission, claims)? {
            Ok(PolicyDecision::Allow)
        } else {
            Ok(PolicyDecision::deny(
                Some(key.clone()),
                format!(
                    "{} rejected {} {} {}",
                    function.name(),
                    key,
                    atomic.operator,
                    atomic.right_expression
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operator;
    use crate::rules::{GeometryFilter, NoRestriction, RoleVerification};
    use serde_json::{json, Value};

    fn claims(value: Value) -> ClaimSet {
        match value {
            Value::Object(map) => ClaimSet::from_map(map),
            _ => unreachable!(),
        }
    }

    fn registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry.register("role", Arc::new(RoleVerification::default()));
        registry.register("location", Arc::new(GeometryFilter::default()));
        registry.register("open", Arc::new(NoRestriction));
        registry
    }

    #[test]
    fn test_all_constraints_must_hold() {
        let permission = Permission::new(
            "use",
            vec![
                Constraint::atomic("role", Operator::Eq, "researcher"),
                Constraint::atomic("location", Operator::In, "POLYGON((0 0,2 0,2 2,0 2,0 0))"),
            ],
        );
        let inside = claims(json!({ "role": "Researcher", "geometry": "POINT(1 1)" }));
        let outside = claims(json!({ "role": "Researcher", "geometry": "POINT(5 5)" }));

        let registry = registry();
        assert!(registry
            .evaluate_permission(&permission, &inside)
            .unwrap()
            .is_allowed());

        match registry.evaluate_permission(&permission, &outside).unwrap() {
            PolicyDecision::Deny {
                left_expression, ..
            } => assert_eq!(left_expression.as_deref(), Some("location")),
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_permission_without_constraints_allows() {
        let permission = Permission::new("use", Vec::new());
        assert!(registry()
            .evaluate_permission(&permission, &ClaimSet::default())
            .unwrap()
            .is_allowed());
    }

    #[test]
    fn test_unbound_left_expression_denies() {
        let permission = Permission::new(
            "use",
            vec![Constraint::atomic("purpose", Operator::Eq, "research")],
        );
        let decision = registry()
            .evaluate_permission(&permission, &ClaimSet::default())
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_logical_constraints() {
        let researcher = claims(json!({ "role": "Researcher" }));
        let or = Permission::new(
            "use",
            vec![Constraint::Or {
                or: vec![
                    Constraint::atomic("role", Operator::Eq, "admin"),
                    Constraint::atomic("role", Operator::Eq, "researcher"),
                ],
            }],
        );
        let xone = Permission::new(
            "use",
            vec![Constraint::Xone {
                xone: vec![
                    Constraint::atomic("open", Operator::Eq, "x"),
                    Constraint::atomic("role", Operator::Eq, "researcher"),
                ],
            }],
        );

        let registry = registry();
        assert!(registry.evaluate_permission(&or, &researcher).unwrap().is_allowed());
        assert!(!registry.evaluate_permission(&xone, &researcher).unwrap().is_allowed());
    }

    #[test]
    fn test_parse_errors_propagate() {
        let permission = Permission::new(
            "use",
            vec![Constraint::atomic("location", Operator::In, "POINT(1 1)")],
        );
        let broken = claims(json!({ "geometry": "not-a-wkt-string" }));
        let err = registry()
            .evaluate_permission(&permission, &broken)
            .unwrap_err();
        assert!(matches!(err, PolicyError::GeometryParse { .. }));
    }

    #[test]
    fn test_enforce_reports_denial_as_access_denied() {
        let policy = Policy {
            permissions: vec![Permission::new(
                "use",
                vec![Constraint::atomic("role", Operator::Eq, "admin")],
            )],
            ..Policy::default()
        };
        let registry = registry();

        assert!(registry
            .enforce(&policy, &claims(json!({ "role": "Admin" })))
            .is_ok());

        let err = registry
            .enforce(&policy, &claims(json!({ "role": "guest" })))
            .unwrap_err();
        assert!(err.is_access_denied());
        assert_eq!(err.http_status(), 403);
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn test_enforce_keeps_parse_errors() {
        let policy = Policy {
            permissions: vec![Permission::new(
                "use",
                vec![Constraint::atomic("location", Operator::In, "POINT(1 1)")],
            )],
            ..Policy::default()
        };
        let err = registry()
            .enforce(&policy, &claims(json!({ "geometry": "not-a-wkt-string" })))
            .unwrap_err();
        assert!(!err.is_access_denied());
        assert!(matches!(err, PolicyError::GeometryParse { .. }));
    }

    #[test]
    fn test_policy_permissions_are_alternatives() {
        let policy = Policy {
            permissions: vec![
                Permission::new("use", vec![Constraint::atomic("role", Operator::Eq, "admin")]),
                Permission::new(
                    "use",
                    vec![Constraint::atomic("role", Operator::Eq, "researcher")],
                ),
            ],
            ..Policy::default()
        };
        let registry = registry();
        assert!(registry
            .evaluate_policy(&policy, &claims(json!({ "role": "researcher" })))
            .unwrap()
            .is_allowed());
        assert!(!registry
            .evaluate_policy(&policy, &claims(json!({ "role": "guest" })))
            .unwrap()
            .is_allowed());
        assert!(!registry
            .evaluate_policy(&Policy::default(), &ClaimSet::default())
            .unwrap()
            .is_allowed());
    }
}
