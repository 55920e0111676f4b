use anyhow::Context;
use claimgate_core::{
    ClaimSet, ContractRequest, InMemoryNegotiationManager, NegotiationDispatcher, PolicyConfig,
    PolicyDecision,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use super::args::{ClaimsArgs, Cli, Command, ConfigArgs, EvaluateArgs, RewriteArgs};
use crate::exit_codes::{ACCESS_DENIED, SUCCESS};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Claims(args) => cmd_claims(args),
        Command::Rewrite(args) => cmd_rewrite(args),
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Negotiate(args) => cmd_negotiate(args).await,
    }
}

fn cmd_claims(args: ClaimsArgs) -> anyhow::Result<i32> {
    let claims = ClaimSet::from_token(&args.token)?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(SUCCESS)
}

fn cmd_rewrite(args: RewriteArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let request = read_request(&args.request)?;
    let rewriter = config.build_rewriter()?;

    let (rewritten, summary) = rewriter.rewrite_with_summary(&request)?;
    tracing::info!(
        request = %args.request.display(),
        replaced = summary.replaced,
        dropped = summary.dropped,
        unchanged = summary.passed_through,
        "rewrite finished"
    );
    println!("{}", serde_json::to_string_pretty(&rewritten)?);
    Ok(SUCCESS)
}

fn cmd_evaluate(args: EvaluateArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let request = read_request(&args.request)?;
    let claims = ClaimSet::from_token(&args.token)?;
    let registry = config.build_registry();

    let mut results = Vec::new();
    for (index, permission) in request.permissions().iter().enumerate() {
        let decision = registry.evaluate_permission(permission, &claims)?;
        results.push(match decision {
            PolicyDecision::Allow => json!({
                "permission": index,
                "action": permission.action.action_type,
                "decision": "allow"
            }),
            PolicyDecision::Deny {
                left_expression,
                reason,
            } => json!({
                "permission": index,
                "action": permission.action.action_type,
                "decision": "deny",
                "left_expression": left_expression,
                "reason": reason
            }),
        });
    }
    println!("{}", serde_json::to_string_pretty(&results)?);

    match registry.enforce(&request.contract_offer.policy, &claims) {
        Ok(()) => Ok(SUCCESS),
        Err(e) if e.is_access_denied() => {
            tracing::warn!(participant = claims.participant_id().unwrap_or("<unknown>"), "{}", e);
            Ok(ACCESS_DENIED)
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_negotiate(args: RewriteArgs) -> anyhow::Result<i32> {
    let config = load_config(&args.config)?;
    let request = read_request(&args.request)?;

    let manager = Arc::new(InMemoryNegotiationManager::new());
    let dispatcher =
        NegotiationDispatcher::new(manager.clone()).with_rewriter(config.build_rewriter()?);
    let id = dispatcher.initiate_negotiation(&request).await?;

    let forwarded = manager
        .requests()
        .await
        .into_iter()
        .find(|(recorded, _)| *recorded == id)
        .map(|(_, request)| request);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "negotiation_id": id,
            "request": forwarded
        }))?
    );
    Ok(SUCCESS)
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<PolicyConfig> {
    let config = match &args.config {
        Some(path) => PolicyConfig::from_file(path)?,
        None => PolicyConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(client_id) = &args.client_id {
        config.client_id = Some(client_id.clone());
    }
    Ok(config)
}

fn read_request(path: &Path) -> anyhow::Result<ContractRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse contract request {}", path.display()))
}
