mod buckets;
mod ingest;
mod integrations;
mod queue;
mod sync;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use signalhub_collectors::CollectorSet;
use signalhub_core::{AppConfig, IcpConfig};
use signalhub_db::{BucketStore, PgStore, SignalStore, Store};
use signalhub_partners::HttpPartnerClientFactory;
use signalhub_pipeline::{IngestSettings, Ingestor, JobQueue, PartnerSyncService, QueueSettings};
use tracing_subscriber::EnvFilter;

use crate::buckets::BucketCommands;
use crate::ingest::IngestCommands;
use crate::integrations::IntegrationCommands;
use crate::queue::QueueCommands;
use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "signalhub-cli")]
#[command(about = "Signal hub command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Collect job postings or funding rounds
    Ingest {
        #[command(subcommand)]
        command: IngestCommands,
    },
    /// Classify signals and run candidate workflows
    Buckets {
        #[command(subcommand)]
        command: BucketCommands,
    },
    /// Register and list partner integrations
    Integrations {
        #[command(subcommand)]
        command: IntegrationCommands,
    },
    /// Synchronise with partner job platforms
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect and work the ingestion queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

/// Store-backed services shared by the subcommands.
pub(crate) struct Services {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub ingestor: Arc<Ingestor>,
}

impl Services {
    fn new(config: AppConfig, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let collectors = CollectorSet::from_config(&config)?;
        let queue = JobQueue::new(Arc::clone(&store), QueueSettings::from_config(&config));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            collectors,
            queue,
            IngestSettings::from_config(&config),
        );
        Ok(Self {
            config,
            store,
            ingestor: Arc::new(ingestor),
        })
    }

    pub(crate) fn queue(&self) -> &JobQueue {
        self.ingestor.queue()
    }

    pub(crate) fn sync_service(&self) -> PartnerSyncService {
        PartnerSyncService::new(
            Arc::clone(&self.store),
            Arc::new(HttpPartnerClientFactory::from_config(&self.config)),
        )
    }

    /// The ICP saved through the API, else the YAML file, else built-in defaults.
    pub(crate) async fn current_icp(&self) -> anyhow::Result<IcpConfig> {
        if let Some(icp) = self.store.load_icp_config().await? {
            return Ok(icp);
        }
        match signalhub_core::load_icp_config(&self.config.icp_path) {
            Ok(icp) => Ok(icp),
            Err(e) => {
                tracing::warn!(error = %e, "using built-in ICP defaults");
                Ok(IcpConfig::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("signalhub-cli: no command given; see --help");
        return Ok(());
    };

    let config = signalhub_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = signalhub_db::PoolConfig::from_app_config(&config);
    let pool = signalhub_db::connect_pool(&config.database_url, pool_config).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));

    if let Commands::Db { command } = &command {
        match command {
            DbCommands::Ping => {
                store.ping().await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = signalhub_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        }
        return Ok(());
    }

    let services = Services::new(config, store)?;
    match command {
        Commands::Ingest { command } => ingest::run(&services, command).await,
        Commands::Buckets { command } => buckets::run(&services, command).await,
        Commands::Integrations { command } => integrations::run(&services, command).await,
        Commands::Sync { command } => sync::run(&services, command).await,
        Commands::Queue { command } => queue::run(&services, command).await,
        Commands::Db { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests;
