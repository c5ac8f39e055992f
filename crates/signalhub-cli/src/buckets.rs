use std::sync::Arc;

use clap::Subcommand;
use signalhub_pipeline::{BucketEngine, CandidateWorkflow};

use crate::Services;

#[derive(Debug, Subcommand)]
pub enum BucketCommands {
    /// Classify unprocessed signals into action buckets
    Process,
    /// Run the candidate workflow for a bucket
    Trigger {
        #[arg(long)]
        bucket: i64,
    },
    /// List a bucket's candidates by likelihood to move
    Candidates {
        #[arg(long)]
        bucket: i64,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run(services: &Services, command: BucketCommands) -> anyhow::Result<()> {
    match command {
        BucketCommands::Process => {
            let icp = services.current_icp().await?;
            let engine = BucketEngine::new(Arc::clone(&services.store))
                .with_batch_size(services.config.classify_batch_size);
            let stats = engine.classify_pending(&icp).await?;
            println!(
                "processed {} signal(s): {} assignment(s), {} rejected by ICP",
                stats.processed, stats.assignments, stats.rejected
            );
        }
        BucketCommands::Trigger { bucket } => {
            let icp = services.current_icp().await?;
            let candidates = CandidateWorkflow::new(Arc::clone(&services.store))
                .trigger(bucket, &icp)
                .await?;
            println!("bucket {bucket}: {} candidate(s) stored", candidates.len());
        }
        BucketCommands::Candidates { bucket, limit } => {
            let candidates = CandidateWorkflow::new(Arc::clone(&services.store))
                .list_candidates(bucket, limit.clamp(1, 200))
                .await?;
            if candidates.is_empty() {
                println!("no candidates for bucket {bucket}");
                return Ok(());
            }
            for c in &candidates {
                println!(
                    "{:>5.2}  {:<28} {}",
                    c.likelihood_to_move,
                    c.full_name,
                    c.current_title.as_deref().unwrap_or("\u{2014}")
                );
            }
        }
    }
    Ok(())
}
