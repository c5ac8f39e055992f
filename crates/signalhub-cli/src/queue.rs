use std::sync::Arc;

use clap::Subcommand;
use signalhub_pipeline::{IngestJobHandler, Worker};
use tokio::sync::watch;

use crate::Services;

#[derive(Debug, Subcommand)]
pub enum QueueCommands {
    /// Show job counts by state
    Stats,
    /// Run the queue worker until interrupted
    Work {
        /// Run the jobs that are due now, then exit
        #[arg(long)]
        drain: bool,
    },
    /// Drop finished jobs past the retention window
    Prune,
}

pub(crate) async fn run(services: &Services, command: QueueCommands) -> anyhow::Result<()> {
    let queue = services.queue();
    match command {
        QueueCommands::Stats => {
            let stats = queue.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        QueueCommands::Work { drain } => {
            let worker = Worker::new(
                queue.clone(),
                Arc::new(IngestJobHandler::new(Arc::clone(&services.ingestor))),
            );
            if drain {
                let attempted = worker.drain().await?;
                println!("attempted {attempted} job(s)");
                return Ok(());
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(worker.run(shutdown_rx));
            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupt received, waiting for in-flight jobs");
            shutdown_tx.send(true).ok();
            handle.await?;
        }
        QueueCommands::Prune => {
            let removed = queue.prune().await?;
            println!("removed {removed} finished job(s)");
        }
    }
    Ok(())
}
