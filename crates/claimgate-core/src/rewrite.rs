//! Contract request rewriting.
//!
//! A consumer may place its identity token inside a permission constraint
//! whose left expression is the token placeholder. Before the request goes
//! to negotiation, each such constraint is replaced with a concrete
//! `(<namespace><Role>, <operator>, <permission>)` constraint resolved from
//! the token's `orgRoles` claim. Everything else is copied verbatim.
//!
//! # Resolution
//!
//! ```text
//! constraint.left == placeholder ?
//!     no  -> copy unchanged
//!     yes -> decode right expression as token      (decode error: abort all)
//!         -> RoleResolver::resolve(claims)         (first candidate wins)
//!         -> organization key matches client id ?
//!                yes -> replace with concrete constraint
//!                no  -> drop constraint, keep permission
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::claims::ClaimSet;
use crate::error::PolicyResult;
use crate::model::{AtomicConstraint, Constraint, ContractOffer, ContractRequest, Permission, Policy};

pub const DEFAULT_TOKEN_PLACEHOLDER: &str = "https://w3id.org/edc/v0.0.1/ns/token";
pub const DEFAULT_ROLE_NAMESPACE: &str = "https://w3id.org/edc/v0.0.1/ns/";
pub const ORG_ROLES_CLAIM: &str = "orgRoles";

/// Maps a role-name keyword to the concrete role and permission keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub keyword: String,
    pub role: String,
    pub permission: String,
}

impl RoleMapping {
    pub fn new(
        keyword: impl Into<String>,
        role: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            role: role.into(),
            permission: permission.into(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        !self.keyword.is_empty() && text.to_lowercase().contains(&self.keyword.to_lowercase())
    }
}

pub fn default_role_mappings() -> Vec<RoleMapping> {
    vec![
        RoleMapping::new("research", "Researcher", "read"),
        RoleMapping::new("foreststewards", "ForestStewards", "write"),
    ]
}

/// A role found in the caller's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCandidate {
    /// Organization key the role is scoped to. `None` for unscoped roles.
    pub org_key: Option<String>,
    /// Role name as asserted in the token.
    pub role_name: String,
    pub role: String,
    pub permission: String,
}

/// Strategy turning claims into role candidates, in claim order.
pub trait RoleResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn candidates(&self, claims: &ClaimSet) -> Vec<RoleCandidate>;

    /// First candidate wins; ambiguity is logged, never merged.
    fn resolve(&self, claims: &ClaimSet) -> Option<RoleCandidate> {
        let mut candidates = self.candidates(claims);
        candidates.dedup();
        if candidates.len() > 1 {
            let roles: Vec<String> = candidates
                .iter()
                .map(|c| format!("{}@{}", c.role, c.org_key.as_deref().unwrap_or("-")))
                .collect();
            tracing::warn!(
                reason = "W_ROLE_AMBIGUOUS",
                strategy = self.name(),
                candidates = ?roles,
                chosen = %roles[0],
                "multiple roles matched, using first match"
            );
        }
        candidates.into_iter().next()
    }
}

/// Scans `orgRoles` values for role keywords (case-insensitive substring).
#[derive(Debug, Clone)]
pub struct KeywordRoleResolver {
    mappings: Vec<RoleMapping>,
}

impl KeywordRoleResolver {
    pub fn new(mappings: Vec<RoleMapping>) -> Self {
        Self { mappings }
    }
}

impl Default for KeywordRoleResolver {
    fn default() -> Self {
        Self::new(default_role_mappings())
    }
}

impl RoleResolver for KeywordRoleResolver {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn candidates(&self, claims: &ClaimSet) -> Vec<RoleCandidate> {
        let Some(org_roles) = claims.get_object(ORG_ROLES_CLAIM) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for (org_key, value) in org_roles {
            for role_name in role_names(value) {
                for mapping in self.mappings.iter().filter(|m| m.matches(role_name)) {
                    found.push(RoleCandidate {
                        org_key: Some(org_key.clone()),
                        role_name: role_name.to_string(),
                        role: mapping.role.clone(),
                        permission: mapping.permission.clone(),
                    });
                }
            }
        }
        found
    }
}

/// Matches `orgRoles` keys shaped `<org>/<role>` or `<org>:<role>` whose
/// role segment starts with a keyword.
#[derive(Debug, Clone)]
pub struct KeyPrefixRoleResolver {
    mappings: Vec<RoleMapping>,
}

impl KeyPrefixRoleResolver {
    pub fn new(mappings: Vec<RoleMapping>) -> Self {
        Self { mappings }
    }
}

impl RoleResolver for KeyPrefixRoleResolver {
    fn name(&self) -> &'static str {
        "key_prefix"
    }

    fn candidates(&self, claims: &ClaimSet) -> Vec<RoleCandidate> {
        let Some(org_roles) = claims.get_object(ORG_ROLES_CLAIM) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for (key, value) in org_roles {
            let Some((org, segment)) = key.split_once(['/', ':']) else {
                continue;
            };
            let segment_lower = segment.to_lowercase();
            for mapping in &self.mappings {
                if mapping.keyword.is_empty()
                    || !segment_lower.starts_with(&mapping.keyword.to_lowercase())
                {
                    continue;
                }
                let role_name = role_names(value)
                    .first()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| segment.to_string());
                found.push(RoleCandidate {
                    org_key: Some(org.to_string()),
                    role_name,
                    role: mapping.role.clone(),
                    permission: mapping.permission.clone(),
                });
            }
        }
        found
    }
}

/// Assigns the same unscoped role to every token. Test fixture strategy.
#[derive(Debug, Clone)]
pub struct FixedRoleResolver {
    mapping: RoleMapping,
}

impl FixedRoleResolver {
    pub fn new(mapping: RoleMapping) -> Self {
        Self { mapping }
    }
}

impl RoleResolver for FixedRoleResolver {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn candidates(&self, _claims: &ClaimSet) -> Vec<RoleCandidate> {
        vec![RoleCandidate {
            org_key: None,
            role_name: self.mapping.keyword.clone(),
            role: self.mapping.role.clone(),
            permission: self.mapping.permission.clone(),
        }]
    }
}

fn role_names(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// An organization key belongs to the configured client when it equals the
/// client id, or is a whole trailing segment of it, ignoring case.
///
/// A trailing segment starts after a separator (`org-123`) or where letters
/// switch to digits (`org123`), so `123` belongs to `org123` but `23`, `3`
/// and `g123` do not.
pub fn organization_matches(client_id: &str, org_key: &str) -> bool {
    let key = org_key.trim().to_lowercase();
    let client = client_id.trim().to_lowercase();
    if key.is_empty() {
        return false;
    }
    if client == key {
        return true;
    }
    let Some(prefix) = client.strip_suffix(key.as_str()) else {
        return false;
    };
    match (prefix.chars().next_back(), key.chars().next()) {
        (Some(before), Some(first)) => {
            !before.is_alphanumeric()
                || (before.is_alphabetic() && first.is_numeric())
                || (before.is_numeric() && first.is_alphabetic())
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSettings {
    pub token_placeholder: String,
    pub role_namespace: String,
    pub client_id: String,
}

impl RewriteSettings {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            token_placeholder: DEFAULT_TOKEN_PLACEHOLDER.to_string(),
            role_namespace: DEFAULT_ROLE_NAMESPACE.to_string(),
            client_id: client_id.into(),
        }
    }
}

/// Counts of what a rewrite did, for logs and CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub replaced: usize,
    pub dropped: usize,
    pub passed_through: usize,
}

pub struct RequestRewriter {
    settings: RewriteSettings,
    resolver: Arc<dyn RoleResolver>,
}

impl std::fmt::Debug for RequestRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRewriter")
            .field("settings", &self.settings)
            .field("resolver", &self.resolver.name())
            .finish()
    }
}

impl RequestRewriter {
    pub fn new(settings: RewriteSettings, resolver: Arc<dyn RoleResolver>) -> Self {
        Self { settings, resolver }
    }

    pub fn settings(&self) -> &RewriteSettings {
        &self.settings
    }

    pub fn is_opaque(&self, constraint: &AtomicConstraint) -> bool {
        constraint.left_expression.as_text() == self.settings.token_placeholder
    }

    /// Build a new request with every opaque constraint resolved.
    ///
    /// A token that cannot be decoded aborts the whole rewrite.
    pub fn rewrite(&self, request: &ContractRequest) -> PolicyResult<ContractRequest> {
        self.rewrite_with_summary(request).map(|(request, _)| request)
    }

    pub fn rewrite_with_summary(
        &self,
        request: &ContractRequest,
    ) -> PolicyResult<(ContractRequest, RewriteSummary)> {
        let mut summary = RewriteSummary::default();
        let policy = self.rewrite_policy_into(&request.contract_offer.policy, &mut summary)?;

        let offer = ContractOffer {
            policy,
            ..request.contract_offer.clone()
        };
        let rewritten = ContractRequest {
            contract_offer: offer,
            ..request.clone()
        };

        tracing::info!(
            offer = %request.contract_offer.id,
            replaced = summary.replaced,
            dropped = summary.dropped,
            passed_through = summary.passed_through,
            "rewrote contract request"
        );
        Ok((rewritten, summary))
    }

    pub fn rewrite_policy(&self, policy: &Policy) -> PolicyResult<Policy> {
        self.rewrite_policy_into(policy, &mut RewriteSummary::default())
    }

    pub fn rewrite_permission(&self, permission: &Permission) -> PolicyResult<Permission> {
        self.rewrite_permission_into(permission, &mut RewriteSummary::default())
    }

    fn rewrite_policy_into(
        &self,
        policy: &Policy,
        summary: &mut RewriteSummary,
    ) -> PolicyResult<Policy> {
        let permissions = policy
            .permissions
            .iter()
            .map(|permission| self.rewrite_permission_into(permission, summary))
            .collect::<PolicyResult<Vec<_>>>()?;

        Ok(Policy {
            permissions,
            ..policy.clone()
        })
    }

    fn rewrite_permission_into(
        &self,
        permission: &Permission,
        summary: &mut RewriteSummary,
    ) -> PolicyResult<Permission> {
        let mut constraints = Vec::with_capacity(permission.constraints.len());
        for constraint in &permission.constraints {
            match constraint {
                Constraint::Atomic(atomic) if self.is_opaque(atomic) => {
                    match self.resolve_constraint(atomic)? {
                        Some(resolved) => {
                            summary.replaced += 1;
                            constraints.push(resolved);
                        }
                        None => summary.dropped += 1,
                    }
                }
                other => {
                    summary.passed_through += 1;
                    constraints.push(other.clone());
                }
            }
        }

        if constraints.is_empty() && !permission.constraints.is_empty() {
            tracing::info!(
                action = %permission.action.action_type,
                "permission has no constraints left after rewrite, keeping it"
            );
        }

        Ok(Permission {
            constraints,
            ..permission.clone()
        })
    }

    fn resolve_constraint(&self, atomic: &AtomicConstraint) -> PolicyResult<Option<Constraint>> {
        let claims = ClaimSet::from_token(&atomic.right_expression.as_text())?;
        tracing::debug!(claims = ?claims, "resolving role from embedded token");

        let Some(candidate) = self.resolver.resolve(&claims) else {
            tracing::warn!(
                reason = "W_ROLE_UNRESOLVED",
                strategy = self.resolver.name(),
                participant = claims.participant_id().unwrap_or("<unknown>"),
                "no known role in token, dropping constraint"
            );
            return Ok(None);
        };

        if let Some(org_key) = &candidate.org_key {
            if !organization_matches(&self.settings.client_id, org_key) {
                tracing::warn!(
                    reason = "W_ROLE_REJECTED",
                    org_key = %org_key,
                    client_id = %self.settings.client_id,
                    role = %candidate.role,
                    "role belongs to another organization, dropping constraint"
                );
                return Ok(None);
            }
        }

        let resolved = AtomicConstraint::new(
            format!("{}{}", self.settings.role_namespace, candidate.role).as_str(),
            atomic.operator,
            candidate.permission.as_str(),
        );
        tracing::info!(
            role = %candidate.role,
            role_name = %candidate.role_name,
            permission = %candidate.permission,
            "replaced token constraint"
        );
        Ok(Some(Constraint::Atomic(resolved)))
    }
}
