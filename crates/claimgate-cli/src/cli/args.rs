use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "claimgate",
    version,
    about = "Claim-based constraint evaluation and contract request rewriting"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an identity token and print its claims
    Claims(ClaimsArgs),
    /// Replace token constraints in a contract request with role constraints
    Rewrite(RewriteArgs),
    /// Evaluate a contract request's policy against a caller's claims
    Evaluate(EvaluateArgs),
    /// Rewrite and hand a contract request to an in-memory negotiation manager
    Negotiate(RewriteArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Policy configuration file (YAML)
    #[arg(short, long, env = "CLAIMGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Organization identifier of this connector (overrides config and env)
    #[arg(long)]
    pub client_id: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ClaimsArgs {
    /// Identity token (JWS compact form, `Bearer ` prefix allowed)
    #[arg(short, long)]
    pub token: String,
}

#[derive(Args, Clone, Debug)]
pub struct RewriteArgs {
    /// Contract request file (JSON)
    #[arg(short, long)]
    pub request: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Clone, Debug)]
pub struct EvaluateArgs {
    /// Contract request file (JSON)
    #[arg(short, long)]
    pub request: PathBuf,

    /// Caller identity token
    #[arg(short, long)]
    pub token: String,

    #[command(flatten)]
    pub config: ConfigArgs,
}
