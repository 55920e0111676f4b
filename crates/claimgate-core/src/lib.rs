//! Attribute-based policy evaluation for contract negotiation.
//!
//! This crate provides:
//!
//! - Claim extraction from bearer identity tokens (structure only)
//! - Rule functions deciding constraints from claims: unrestricted, role
//!   verification and geometry filtering
//! - A rule registry binding rule functions to constraint left expressions
//! - Rewriting of contract requests whose constraints carry an identity
//!   token, replacing them with concrete role constraints
//! - A dispatcher handing finalized requests to the negotiation subsystem
//!
//! # Quick Start
//!
//! ```no_run
//! use claimgate_core::{ContractRequest, PolicyConfig};
//!
//! # fn example(request: ContractRequest) -> claimgate_core::PolicyResult<()> {
//! let config = PolicyConfig::from_env();
//! let rewriter = config.build_rewriter()?;
//! let rewritten = rewriter.rewrite(&request)?;
//! # let _ = rewritten;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CLAIMGATE_CLIENT_ID` | Organization identifier matched against `orgRoles` keys |
//! | `CLAIMGATE_TOKEN_PLACEHOLDER` | Left expression marking a token constraint |
//! | `CLAIMGATE_ROLE_NAMESPACE` | Prefix of rewritten role left expressions |
//! | `CLAIMGATE_ROLE_CLAIM` | Claim read by role verification (default: `role`) |
//! | `CLAIMGATE_GEOMETRY_CLAIM` | Claim read by geometry filtering (default: `geometry`) |

pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod model;
pub mod negotiation;
pub mod rewrite;
pub mod rules;

pub use claims::ClaimSet;
pub use config::{PolicyConfig, RoleStrategy};
pub use engine::{PolicyDecision, RuleRegistry};
pub use error::{PolicyError, PolicyResult};
pub use geometry::{geometry_equals, geometry_intersects, parse_geometry, BoundingBox};
pub use model::{
    Action, AtomicConstraint, CallbackAddress, Constraint, ContractOffer, ContractRequest, Duty,
    Expression, Operator, Permission, Policy, PolicyType,
};
pub use negotiation::{
    InMemoryNegotiationManager, NegotiationDispatcher, NegotiationId, NegotiationManager,
};
pub use rewrite::{
    organization_matches, FixedRoleResolver, KeyPrefixRoleResolver, KeywordRoleResolver,
    RequestRewriter, RewriteSettings, RewriteSummary, RoleCandidate, RoleMapping, RoleResolver,
    DEFAULT_ROLE_NAMESPACE, DEFAULT_TOKEN_PLACEHOLDER,
};
pub use rules::{GeometryFilter, NoRestriction, RoleVerification, RuleFunction, RuleKind};
