//! Policy configuration.
//!
//! Loaded from YAML (`PolicyConfig::from_file`) or built from defaults, then
//! overlaid with `CLAIMGATE_*` environment variables. Builds the request
//! rewriter and the rule registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::sync::Arc;

use crate::claims::PARTICIPANT_ID_CLAIM;
use crate::engine::RuleRegistry;
use crate::error::{PolicyError, PolicyResult};
use crate::rewrite::{
    default_role_mappings, FixedRoleResolver, KeyPrefixRoleResolver, KeywordRoleResolver,
    RequestRewriter, RewriteSettings, RoleMapping, RoleResolver, DEFAULT_ROLE_NAMESPACE,
    DEFAULT_TOKEN_PLACEHOLDER,
};
use crate::rules::{
    GeometryFilter, NoRestriction, RoleVerification, RuleFunction, RuleKind,
    DEFAULT_GEOMETRY_CLAIM, DEFAULT_ROLE_CLAIM,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoleStrategy {
    /// Match keywords inside `orgRoles` values.
    #[default]
    Keyword,
    /// Match keywords against the role segment of `orgRoles` keys.
    KeyPrefix,
    /// Assign `fixed_role` to every token.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Organization identifier of this connector's OAuth client.
    pub client_id: Option<String>,
    pub token_placeholder: String,
    pub role_namespace: String,
    pub role_claim: String,
    pub geometry_claim: String,
    pub participant_claim: String,
    pub role_strategy: RoleStrategy,
    pub fixed_role: Option<RoleMapping>,
    pub roles: Vec<RoleMapping>,
    /// Left expression -> rule function.
    pub bindings: BTreeMap<String, RuleKind>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            format!("{}role", DEFAULT_ROLE_NAMESPACE),
            RuleKind::RoleVerification,
        );
        bindings.insert(
            format!("{}geometry", DEFAULT_ROLE_NAMESPACE),
            RuleKind::GeometryFilter,
        );

        Self {
            client_id: None,
            token_placeholder: DEFAULT_TOKEN_PLACEHOLDER.to_string(),
            role_namespace: DEFAULT_ROLE_NAMESPACE.to_string(),
            role_claim: DEFAULT_ROLE_CLAIM.to_string(),
            geometry_claim: DEFAULT_GEOMETRY_CLAIM.to_string(),
            participant_claim: PARTICIPANT_ID_CLAIM.to_string(),
            role_strategy: RoleStrategy::default(),
            fixed_role: None,
            roles: default_role_mappings(),
            bindings,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_yaml_str(yaml: &str) -> PolicyResult<Self> {
        let config: PolicyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PolicyError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Environment variables win over file and default values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("CLAIMGATE_CLIENT_ID") {
            if !v.trim().is_empty() {
                self.client_id = Some(v.trim().to_string());
            }
        }
        if let Ok(v) = env::var("CLAIMGATE_TOKEN_PLACEHOLDER") {
            self.token_placeholder = v;
        }
        if let Ok(v) = env::var("CLAIMGATE_ROLE_NAMESPACE") {
            self.role_namespace = v;
        }
        if let Ok(v) = env::var("CLAIMGATE_ROLE_CLAIM") {
            self.role_claim = v;
        }
        if let Ok(v) = env::var("CLAIMGATE_GEOMETRY_CLAIM") {
            self.geometry_claim = v;
        }
        self
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self.token_placeholder.trim().is_empty() {
            return Err(PolicyError::config("token_placeholder must not be empty"));
        }
        match self.role_strategy {
            RoleStrategy::Fixed if self.fixed_role.is_none() => Err(PolicyError::config(
                "role_strategy 'fixed' requires fixed_role",
            )),
            RoleStrategy::Keyword | RoleStrategy::KeyPrefix if self.roles.is_empty() => Err(
                PolicyError::config("at least one role mapping is required"),
            ),
            _ => Ok(()),
        }
    }

    pub fn build_resolver(&self) -> PolicyResult<Arc<dyn RoleResolver>> {
        self.validate()?;
        Ok(match self.role_strategy {
            RoleStrategy::Keyword => Arc::new(KeywordRoleResolver::new(self.roles.clone())),
            RoleStrategy::KeyPrefix => Arc::new(KeyPrefixRoleResolver::new(self.roles.clone())),
            RoleStrategy::Fixed => {
                let mapping = self.fixed_role.clone().ok_or_else(|| {
                    PolicyError::config("role_strategy 'fixed' requires fixed_role")
                })?;
                Arc::new(FixedRoleResolver::new(mapping))
            }
        })
    }

    pub fn build_rewriter(&self) -> PolicyResult<RequestRewriter> {
        let client_id = self
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PolicyError::config("client_id is required for request rewriting")
            })?;

        let settings = RewriteSettings {
            token_placeholder: self.token_placeholder.clone(),
            role_namespace: self.role_namespace.clone(),
            client_id: client_id.to_string(),
        };
        Ok(RequestRewriter::new(settings, self.build_resolver()?))
    }

    pub fn rule_function(&self, kind: RuleKind) -> Arc<dyn RuleFunction> {
        match kind {
            RuleKind::NoRestriction => Arc::new(NoRestriction),
            RuleKind::RoleVerification => Arc::new(RoleVerification {
                claim: self.role_claim.clone(),
                participant_claim: self.participant_claim.clone(),
            }),
            RuleKind::GeometryFilter => Arc::new(GeometryFilter {
                claim: self.geometry_claim.clone(),
                participant_claim: self.participant_claim.clone(),
            }),
        }
    }

    pub fn build_registry(&self) -> RuleRegistry {
        RuleRegistry::from_bindings(self)
    }
}
