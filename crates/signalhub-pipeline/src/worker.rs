//! Queue consumer: bounded concurrency, a global start-rate cap, and
//! exponential retry until the job's attempt budget is spent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use signalhub_db::{JobStore, QueuedJob};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::PipelineError;
use crate::ingest::Ingestor;
use crate::queue::{IngestJobPayload, JobEvent, JobQueue, INGEST_JOB_KIND};

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs one attempt of `job`; the returned value is stored as its result.
    async fn handle(&self, job: &QueuedJob) -> Result<serde_json::Value, PipelineError>;
}

/// Runs queued ingestion through the orchestrator's non-queued path.
pub struct IngestJobHandler {
    ingestor: Arc<Ingestor>,
}

impl IngestJobHandler {
    #[must_use]
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }
}

#[async_trait]
impl JobHandler for IngestJobHandler {
    async fn handle(&self, job: &QueuedJob) -> Result<serde_json::Value, PipelineError> {
        if job.kind != INGEST_JOB_KIND {
            return Err(PipelineError::UnknownJobKind(job.kind.clone()));
        }
        let payload: IngestJobPayload = serde_json::from_value(job.payload.clone())?;
        let outcome = self
            .ingestor
            .run_now(&payload.filters, payload.sources.as_deref())
            .await?;
        Ok(serde_json::json!({
            "count": outcome.signals.len(),
            "stats": outcome.stats,
        }))
    }
}

pub struct Worker {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
}

impl Worker {
    #[must_use]
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>) -> Self {
        Self { queue, handler }
    }

    /// Claims and runs jobs until `shutdown` flips to `true` or its sender is
    /// dropped, then waits for in-flight jobs to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.queue.settings().clone();
        let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let mut ticker =
            tokio::time::interval(Duration::from_secs(1) / settings.max_jobs_per_sec.max(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();
        tracing::info!(
            concurrency = settings.concurrency,
            max_jobs_per_sec = settings.max_jobs_per_sec,
            "queue worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "queue job task panicked");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.store.claim_next_job().await {
                Ok(Some(job)) => {
                    let queue = self.queue.clone();
                    let handler = Arc::clone(&self.handler);
                    tasks.spawn(async move {
                        execute(&queue, handler.as_ref(), job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(settings.poll_interval) => {}
                    }
                }
                Err(err) => {
                    drop(permit);
                    tracing::warn!(error = %err, "failed to claim next job");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(settings.poll_interval) => {}
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "queue job task panicked");
            }
        }
        tracing::info!("queue worker stopped");
    }

    /// Runs every job that is due right now, one at a time, and returns how
    /// many were attempted. Retries scheduled for later are left queued.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] if a job cannot be claimed.
    pub async fn drain(&self) -> Result<usize, PipelineError> {
        let mut attempted = 0;
        while let Some(job) = self.queue.store.claim_next_job().await? {
            execute(&self.queue, self.handler.as_ref(), job).await;
            attempted += 1;
        }
        Ok(attempted)
    }
}

async fn execute(queue: &JobQueue, handler: &dyn JobHandler, job: QueuedJob) {
    let job_id = job.id;
    match handler.handle(&job).await {
        Ok(result) => {
            if let Err(err) = queue.store.complete_job(job_id, &result).await {
                tracing::error!(job_id, error = %err, "failed to record job completion");
                return;
            }
            tracing::info!(job_id, kind = %job.kind, "job completed");
            queue.publish(JobEvent::Completed { job_id, result });
        }
        Err(err) if job.attempts >= job.max_attempts => {
            let message = err.to_string();
            if let Err(db_err) = queue.store.fail_job(job_id, &message).await {
                tracing::error!(job_id, error = %db_err, "failed to record job failure");
                return;
            }
            tracing::error!(
                job_id,
                kind = %job.kind,
                attempts = job.attempts,
                error = %err,
                "job failed after exhausting retries"
            );
            queue.publish(JobEvent::Failed {
                job_id,
                attempts: job.attempts,
                error: message,
            });
        }
        Err(err) => {
            let message = err.to_string();
            let delay = queue.settings().retry_delay(job.attempts);
            let run_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            if let Err(db_err) = queue.store.retry_job(job_id, run_at, &message).await {
                tracing::error!(job_id, error = %db_err, "failed to schedule job retry");
                return;
            }
            tracing::warn!(
                job_id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "job attempt failed; retrying"
            );
            queue.publish(JobEvent::Retrying {
                job_id,
                attempt: job.attempts,
                run_at,
                error: message,
            });
        }
    }
}
