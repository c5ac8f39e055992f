//! Background job scheduler.
//!
//! Registers the recurring ingestion, funding, partner sync and queue
//! retention jobs against the shared [`AppState`].

use signalhub_core::{ConflictStrategy, FundingFilters, IngestFilters};
use signalhub_pipeline::{IngestJobPayload, JobOrigin};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::api::AppState;

const SCHEDULED_KEYWORDS: [&str; 4] = ["Head of Engineering", "VP of Sales", "Director", "CTO"];
const MIN_SCHEDULED_FUNDING: f64 = 1_000_000.0;

/// Builds and starts the scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process.
/// Dropping it stops every job.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_ingest_job(&scheduler, state.clone()).await?;
    register_funding_job(&scheduler, state.clone()).await?;
    register_partner_sync_job(&scheduler, state.clone()).await?;
    register_queue_prune_job(&scheduler, state).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Queues a job-posting ingestion every six hours. The worker runs it.
async fn register_ingest_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 0 */6 * * *", move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            let payload = IngestJobPayload {
                filters: IngestFilters {
                    keywords: SCHEDULED_KEYWORDS.iter().map(|k| (*k).to_string()).collect(),
                    location: Some(state.cron.default_location.clone()),
                    days_back: Some(1),
                },
                sources: None,
                origin: JobOrigin::Scheduled,
            };
            match state.queue().enqueue_ingest(&payload).await {
                Ok(job_id) => tracing::info!(job_id, "scheduler: ingestion queued"),
                Err(e) => tracing::error!(error = %e, "scheduler: failed to queue ingestion"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Collects funding rounds daily at 02:00 UTC.
async fn register_funding_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 0 2 * * *", move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            tracing::info!("scheduler: starting daily funding run");
            let filters = FundingFilters {
                min_amount: Some(MIN_SCHEDULED_FUNDING),
                rounds: Vec::new(),
                days_back: Some(1),
            };
            match state.ingestor.ingest_funding_signals(&filters).await {
                Ok(stored) => {
                    tracing::info!(stored = stored.len(), "scheduler: funding run complete");
                }
                Err(e) => tracing::error!(error = %e, "scheduler: funding run failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn register_partner_sync_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            match state
                .sync
                .bidirectional_sync(None, ConflictStrategy::Newest)
                .await
            {
                Ok(report) if report.success => {
                    tracing::info!("scheduler: partner sync complete");
                }
                Ok(report) => {
                    let failed = report
                        .pull
                        .results
                        .iter()
                        .chain(&report.push.results)
                        .chain(&report.conflicts.results)
                        .filter(|r| !r.success)
                        .count();
                    tracing::warn!(failed, "scheduler: partner sync finished with failures");
                }
                Err(e) => tracing::error!(error = %e, "scheduler: partner sync failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn register_queue_prune_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            if let Err(e) = state.queue().prune().await {
                tracing::warn!(error = %e, "scheduler: queue prune failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
