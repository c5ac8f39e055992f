//! Ingestion command handlers.

use clap::Subcommand;
use signalhub_core::{FundingFilters, IngestFilters};

use crate::Services;

#[derive(Debug, Subcommand)]
pub enum IngestCommands {
    /// Collect job postings from the configured sources
    Jobs {
        /// Search keyword; repeat for several
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        /// Location filter (defaults to SIGNALHUB_DEFAULT_LOCATION)
        #[arg(long)]
        location: Option<String>,
        /// Only postings from the last N days (1 to 365)
        #[arg(long, default_value = "7")]
        days_back: u32,
        /// Restrict to these sources (serpapi, scraperapi, rss)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Queue the run for the worker instead of running it now
        #[arg(long)]
        queue: bool,
    },
    /// Collect funding rounds
    Funding {
        /// Minimum round size
        #[arg(long)]
        min_amount: Option<f64>,
        /// Round name filter; repeat for several
        #[arg(long = "round")]
        rounds: Vec<String>,
        #[arg(long, default_value = "7")]
        days_back: u32,
    },
}

pub(crate) async fn run(services: &Services, command: IngestCommands) -> anyhow::Result<()> {
    match command {
        IngestCommands::Jobs {
            keywords,
            location,
            days_back,
            sources,
            queue,
        } => {
            let filters = IngestFilters {
                keywords,
                location: location.or_else(|| Some(services.config.default_location.clone())),
                days_back: Some(days_back),
            };
            let sources = (!sources.is_empty()).then_some(sources);
            let outcome = services
                .ingestor
                .ingest_job_postings(&filters, queue, sources.as_deref())
                .await?;

            if let Some(job_id) = outcome.stats.queue_job_id {
                println!("queued ingestion job {job_id}");
                return Ok(());
            }
            println!(
                "collected {} posting(s): {} new, {} duplicate(s), {} source error(s)",
                outcome.stats.total_collected,
                outcome.signals.len(),
                outcome.stats.duplicates,
                outcome.stats.errors,
            );
            for (source, count) in &outcome.stats.sources {
                println!("  {source:<12} {count}");
            }
        }
        IngestCommands::Funding {
            min_amount,
            rounds,
            days_back,
        } => {
            let stored = services
                .ingestor
                .ingest_funding_signals(&FundingFilters {
                    min_amount,
                    rounds,
                    days_back: Some(days_back),
                })
                .await?;
            println!("stored {} funding signal(s)", stored.len());
            for signal in &stored {
                println!(
                    "  {:<30} {}",
                    signal.company_name,
                    signal.title.as_deref().unwrap_or("\u{2014}")
                );
            }
        }
    }
    Ok(())
}
