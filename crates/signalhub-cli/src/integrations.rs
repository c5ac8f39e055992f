//! Partner integration command handlers.

use std::sync::Arc;

use clap::{Args, Subcommand};
use signalhub_core::{IntegrationStatus, PartnerCredentials, PartnerKind};
use signalhub_pipeline::{IntegrationRegistry, NewIntegration};

use crate::Services;

#[derive(Debug, Subcommand)]
pub enum IntegrationCommands {
    /// List partner integrations (credentials are never printed)
    List {
        #[arg(long)]
        partner: Option<PartnerKind>,
    },
    /// Register a partner, or replace its credentials and status
    Add(AddIntegration),
}

#[derive(Debug, Args)]
pub struct AddIntegration {
    /// linkedin, indeed or glassdoor
    #[arg(long)]
    pub partner: PartnerKind,
    /// pending, active, suspended or error
    #[arg(long, default_value = "pending")]
    pub status: IntegrationStatus,
    #[arg(long, env = "SIGNALHUB_PARTNER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    #[arg(long, env = "SIGNALHUB_PARTNER_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,
    #[arg(long, env = "SIGNALHUB_PARTNER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub client_id: Option<String>,
    #[arg(long, env = "SIGNALHUB_PARTNER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Indeed partner id
    #[arg(long)]
    pub partner_id: Option<String>,
    /// Secret the partner signs its webhooks with
    #[arg(long, env = "SIGNALHUB_PARTNER_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,
}

impl From<AddIntegration> for NewIntegration {
    fn from(args: AddIntegration) -> Self {
        NewIntegration {
            partner: args.partner,
            status: args.status,
            credentials: PartnerCredentials {
                access_token: args.access_token,
                refresh_token: args.refresh_token,
                client_id: args.client_id,
                client_secret: args.client_secret,
                partner_id: args.partner_id,
                api_key: args.api_key,
            },
            webhook_secret: args.webhook_secret,
        }
    }
}

pub(crate) async fn run(services: &Services, command: IntegrationCommands) -> anyhow::Result<()> {
    let registry = IntegrationRegistry::new(Arc::clone(&services.store));
    match command {
        IntegrationCommands::List { partner } => {
            let summaries = registry.list(partner).await?;
            if summaries.is_empty() {
                println!("no partner integrations configured");
            }
            for s in &summaries {
                println!(
                    "{:<4} {:<10} {:<10} postings={} token={} api_key={} webhook_secret={}",
                    s.id,
                    s.partner.as_str(),
                    s.status.as_str(),
                    s.job_posting_count,
                    s.has_access_token,
                    s.has_api_key,
                    s.has_webhook_secret
                );
            }
        }
        IntegrationCommands::Add(args) => {
            let integration = registry.register(&NewIntegration::from(args)).await?;
            println!(
                "integration {} saved: {} {}",
                integration.id,
                integration.partner.as_str(),
                integration.status.as_str()
            );
        }
    }
    Ok(())
}
