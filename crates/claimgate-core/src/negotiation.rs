//! Hand-off of finalized contract requests to the negotiation subsystem.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::PolicyResult;
use crate::model::ContractRequest;
use crate::rewrite::RequestRewriter;

/// Identifier of a created negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationId(pub String);

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The negotiation subsystem: persistence, protocol transmission and state
/// progression all live behind this trait.
#[async_trait]
pub trait NegotiationManager: Send + Sync {
    async fn initiate(&self, request: ContractRequest) -> PolicyResult<NegotiationId>;
}

/// Rewrites (when configured) and forwards contract requests.
pub struct NegotiationDispatcher {
    manager: Arc<dyn NegotiationManager>,
    rewriter: Option<RequestRewriter>,
}

impl NegotiationDispatcher {
    pub fn new(manager: Arc<dyn NegotiationManager>) -> Self {
        Self {
            manager,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: RequestRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Rewrite failures stop the request before the manager sees it.
    pub async fn initiate_negotiation(
        &self,
        request: &ContractRequest,
    ) -> PolicyResult<NegotiationId> {
        let finalized = match &self.rewriter {
            Some(rewriter) => rewriter.rewrite(request)?,
            None => request.clone(),
        };

        let id = self.manager.initiate(finalized).await?;
        tracing::info!(
            negotiation = %id,
            offer = %request.contract_offer.id,
            counter_party = %request.counter_party_address,
            "negotiation initiated"
        );
        Ok(id)
    }
}

/// Records forwarded requests and hands out random identifiers.
#[derive(Debug, Default)]
pub struct InMemoryNegotiationManager {
    requests: Mutex<Vec<(NegotiationId, ContractRequest)>>,
}

impl InMemoryNegotiationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn requests(&self) -> Vec<(NegotiationId, ContractRequest)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl NegotiationManager for InMemoryNegotiationManager {
    async fn initiate(&self, request: ContractRequest) -> PolicyResult<NegotiationId> {
        let id = NegotiationId(uuid::Uuid::new_v4().to_string());
        self.requests.lock().await.push((id.clone(), request));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::model::{Constraint, ContractOffer, Operator, Permission, Policy};
    use crate::rewrite::{KeywordRoleResolver, RewriteSettings, DEFAULT_TOKEN_PLACEHOLDER};

    fn request(constraints: Vec<Constraint>) -> ContractRequest {
        ContractRequest {
            callback_addresses: Vec::new(),
            protocol: "dataspace-protocol-http".to_string(),
            counter_party_address: "http://provider/protocol".to_string(),
            contract_offer: ContractOffer {
                id: "offer-1".to_string(),
                asset_id: "asset-1".to_string(),
                policy: Policy {
                    permissions: vec![Permission::new("use", constraints)],
                    ..Policy::default()
                },
            },
        }
    }

    fn rewriter() -> RequestRewriter {
        RequestRewriter::new(
            RewriteSettings::new("org123"),
            Arc::new(KeywordRoleResolver::default()),
        )
    }

    #[tokio::test]
    async fn test_forwards_unchanged_without_rewriter() {
        let manager = Arc::new(InMemoryNegotiationManager::new());
        let dispatcher = NegotiationDispatcher::new(manager.clone());
        let req = request(vec![Constraint::atomic("region", Operator::Eq, "eu")]);

        let id = dispatcher.initiate_negotiation(&req).await.unwrap();
        let recorded = manager.requests().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, id);
        assert_eq!(recorded[0].1, req);
    }

    #[tokio::test]
    async fn test_decode_failure_never_reaches_manager() {
        let manager = Arc::new(InMemoryNegotiationManager::new());
        let dispatcher = NegotiationDispatcher::new(manager.clone()).with_rewriter(rewriter());
        let req = request(vec![Constraint::atomic(
            DEFAULT_TOKEN_PLACEHOLDER,
            Operator::Eq,
            "not.a.token",
        )]);

        let err = dispatcher.initiate_negotiation(&req).await.unwrap_err();
        assert!(matches!(err, PolicyError::TokenDecode { .. }));
        assert!(manager.requests().await.is_empty());
    }

    struct FailingManager;

    #[async_trait]
    impl NegotiationManager for FailingManager {
        async fn initiate(&self, _request: ContractRequest) -> PolicyResult<NegotiationId> {
            Err(PolicyError::Negotiation {
                message: "store unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_manager_errors_propagate() {
        let dispatcher = NegotiationDispatcher::new(Arc::new(FailingManager));
        let err = dispatcher
            .initiate_negotiation(&request(Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
