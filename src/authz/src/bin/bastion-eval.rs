//! # bastion-eval
//!
//! Evaluate access decisions against a JSON store snapshot.
//!
//! ```text
//! bastion-eval --snapshot store.json check alice document doc-1 read --org org-1
//! bastion-eval --snapshot store.json expand alice document doc-1 read edit delete
//! bastion-eval --snapshot store.json roles alice --group engineering
//! ```
//!
//! Decisions and role sets are printed as JSON on stdout; logs go to stderr
//! and follow `RUST_LOG`.

use anyhow::{Context, Result};
use bastion_authz::{DecisionEngine, EngineConfig, EvalContext, InMemoryStore, ResourceCheck};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "bastion-eval")]
#[command(about = "Evaluate authorization decisions against a store snapshot")]
#[command(version)]
struct Cli {
    /// JSON store snapshot
    #[arg(short, long, env = "BASTION_SNAPSHOT")]
    snapshot: PathBuf,

    /// Engine configuration (TOML)
    #[arg(short, long, env = "BASTION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ContextArgs {
    /// Organization in context
    #[arg(long)]
    org: Option<String>,

    /// Group in context
    #[arg(long)]
    group: Option<String>,

    /// Evaluate at this instant (RFC 3339) instead of now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

impl ContextArgs {
    fn to_context(&self) -> EvalContext {
        let mut ctx = EvalContext::new();
        if let Some(org) = &self.org {
            ctx = ctx.with_organization(org);
        }
        if let Some(group) = &self.group {
            ctx = ctx.with_group(group);
        }
        if let Some(at) = self.at {
            ctx = ctx.at(at);
        }
        ctx
    }
}

#[derive(Subcommand)]
enum Command {
    /// Decide a single request
    Check {
        principal: String,
        resource_type: String,
        resource_id: String,
        action: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// List which of the given actions are allowed
    Expand {
        principal: String,
        resource_type: String,
        resource_id: String,
        #[arg(required = true)]
        actions: Vec<String>,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Show the effective role set with provenance
    Roles {
        principal: String,
        #[command(flatten)]
        context: ContextArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs on stderr so stdout stays machine-readable
    let default_filter = if cli.verbose { "info,bastion_authz=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => EngineConfig::default(),
    };

    let store = InMemoryStore::load(&cli.snapshot)
        .with_context(|| format!("Failed to load store snapshot from {:?}", cli.snapshot))?;
    info!("Loaded store snapshot from {:?}", cli.snapshot);

    let engine = DecisionEngine::new(config, Arc::new(store)).context("Failed to build engine")?;

    let output = match cli.command {
        Command::Check {
            principal,
            resource_type,
            resource_id,
            action,
            context,
        } => {
            let decision = engine
                .evaluate(&principal, &resource_type, &resource_id, &action, &context.to_context())
                .await
                .context("Evaluation failed")?;
            serde_json::to_value(&decision)?
        }
        Command::Expand {
            principal,
            resource_type,
            resource_id,
            actions,
            context,
        } => {
            let ctx = context.to_context();
            let checks: Vec<ResourceCheck> = actions
                .iter()
                .map(|action| ResourceCheck::new(&resource_type, &resource_id, action))
                .collect();
            let bulk = engine.evaluate_bulk(&principal, &checks, &ctx).await?;
            let allowed: Vec<&str> = checks
                .iter()
                .filter(|check| bulk.allowed(check))
                .map(|check| check.action.as_str())
                .collect();
            json!({
                "principal_id": principal,
                "resource": format!("{}:{}", resource_type, resource_id),
                "allowed_actions": allowed,
            })
        }
        Command::Roles { principal, context } => {
            let roles = engine
                .effective_roles(&principal, &context.to_context())
                .await
                .context("Role resolution failed")?;
            serde_json::to_value(&roles)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
