mod api;
mod middleware;
mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;

use signalhub_collectors::CollectorSet;
use signalhub_db::{PgStore, Store};
use signalhub_partners::HttpPartnerClientFactory;
use signalhub_pipeline::{IngestJobHandler, Worker};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::{AuthState, RateLimitState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = signalhub_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = signalhub_db::PoolConfig::from_app_config(&config);
    let pool = signalhub_db::connect_pool(&config.database_url, pool_config).await?;
    signalhub_db::run_migrations(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let default_icp = match signalhub_core::load_icp_config(&config.icp_path) {
        Ok(icp) => icp,
        Err(e) => {
            tracing::warn!(error = %e, "using built-in ICP defaults");
            signalhub_core::IcpConfig::default()
        }
    };
    let collectors = CollectorSet::from_config(&config)?;
    let factory = Arc::new(HttpPartnerClientFactory::from_config(&config));
    let state = AppState::new(store, collectors, factory, &config, default_icp);

    let _scheduler = scheduler::build_scheduler(state.clone()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Worker::new(
        state.queue().clone(),
        Arc::new(IngestJobHandler::new(Arc::clone(&state.ingestor))),
    );
    let worker_task = tokio::spawn(worker.run(shutdown_rx));

    let auth = AuthState::from_config(&config)?;
    let app = build_app(state, auth, RateLimitState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "signalhub server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    if let Err(e) = worker_task.await {
        tracing::error!(error = %e, "queue worker exited abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
