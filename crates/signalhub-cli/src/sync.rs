//! Partner sync command handlers.

use clap::Subcommand;
use signalhub_core::{ConflictStrategy, PartnerKind};
use signalhub_pipeline::SyncReport;

use crate::Services;

#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Import partner jobs as signals
    Pull {
        /// linkedin, indeed or glassdoor; all active partners when omitted
        #[arg(long)]
        partner: Option<PartnerKind>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Publish unprocessed job-posting signals to partners
    Push {
        #[arg(long)]
        partner: Option<PartnerKind>,
        /// Only these signal ids; repeat for several
        #[arg(long = "signal")]
        signal_ids: Vec<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Pull, push, then resolve conflicts
    Bidirectional {
        #[arg(long)]
        partner: Option<PartnerKind>,
        /// ours, theirs or newest
        #[arg(long, default_value = "newest")]
        strategy: ConflictStrategy,
    },
    /// Show integrations with their latest sync logs
    Status {
        #[arg(long)]
        partner: Option<PartnerKind>,
    },
}

fn print_report(label: &str, report: &SyncReport) {
    println!(
        "{label}: {}",
        if report.success { "ok" } else { "failed" }
    );
    for r in &report.results {
        println!(
            "  {:<10} processed={} failed={}{}",
            r.partner.as_str(),
            r.records_processed,
            r.records_failed,
            r.error
                .as_deref()
                .map(|e| format!(" error={e}"))
                .unwrap_or_default()
        );
    }
}

pub(crate) async fn run(services: &Services, command: SyncCommands) -> anyhow::Result<()> {
    let sync = services.sync_service();
    match command {
        SyncCommands::Pull { partner, limit } => {
            let report = sync.sync_from_partners(partner, limit).await?;
            print_report("pull", &report);
        }
        SyncCommands::Push {
            partner,
            signal_ids,
            limit,
        } => {
            let ids = (!signal_ids.is_empty()).then_some(signal_ids);
            let report = sync.sync_to_partners(partner, ids.as_deref(), limit).await?;
            print_report("push", &report);
        }
        SyncCommands::Bidirectional { partner, strategy } => {
            let report = sync.bidirectional_sync(partner, strategy).await?;
            print_report("pull", &report.pull);
            print_report("push", &report.push);
            print_report("conflicts", &report.conflicts);
        }
        SyncCommands::Status { partner } => {
            let statuses = sync.sync_status(partner).await?;
            if statuses.is_empty() {
                println!("no partner integrations configured");
            }
            for status in &statuses {
                let integration = &status.integration;
                println!(
                    "{:<10} {:<10} postings={} last_sync={}",
                    integration.partner.as_str(),
                    integration.status.as_str(),
                    status.job_posting_count,
                    integration
                        .last_sync_at
                        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
                );
                for log in &status.recent_logs {
                    println!(
                        "    {} {:<20} {:<8} processed={} failed={}",
                        log.started_at.format("%Y-%m-%d %H:%M"),
                        log.sync_type.as_str(),
                        log.status.as_str(),
                        log.records_processed,
                        log.records_failed
                    );
                }
            }
        }
    }
    Ok(())
}
