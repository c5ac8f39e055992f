//! Durable job queue over [`signalhub_db::JobStore`].
//!
//! `enqueue` returns as soon as the row is written. Workers publish
//! [`JobEvent`]s on a broadcast channel that observers may subscribe to;
//! nothing waits on them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalhub_core::{AppConfig, IngestFilters};
use signalhub_db::{DbError, JobStore, NewJob, RetentionPolicy, Store};
use tokio::sync::broadcast;

use crate::error::PipelineError;

/// Kind tag of the deferred ingestion job.
pub const INGEST_JOB_KIND: &str = "collect-signals";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where a queued ingestion came from. Webhook jobs run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOrigin {
    Webhook,
    Scheduled,
    Manual,
}

impl JobOrigin {
    /// Lower runs first.
    #[must_use]
    pub fn priority(self) -> i32 {
        match self {
            JobOrigin::Webhook => 1,
            JobOrigin::Scheduled | JobOrigin::Manual => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJobPayload {
    #[serde(flatten)]
    pub filters: IngestFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    pub origin: JobOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Completed {
        job_id: i64,
        result: serde_json::Value,
    },
    Retrying {
        job_id: i64,
        attempt: i32,
        run_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        job_id: i64,
        attempts: i32,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_jobs_per_sec: u32,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Idle sleep between claims when no job is due.
    pub poll_interval: Duration,
    pub retention: RetentionPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_jobs_per_sec: 10,
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            retention: RetentionPolicy::default(),
        }
    }
}

impl QueueSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.queue_concurrency,
            max_jobs_per_sec: config.queue_max_jobs_per_sec,
            max_attempts: config.queue_max_attempts,
            backoff_base: Duration::from_millis(config.queue_backoff_base_ms),
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: i32) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(0).min(16);
        self.backoff_base.saturating_mul(2u32.pow(exponent))
    }
}

/// Counts exposed by the queue stats endpoint. `waiting` includes jobs
/// held back by a retry delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Clone)]
pub struct JobQueue {
    pub(crate) store: Arc<dyn Store>,
    settings: QueueSettings,
    events: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, settings: QueueSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            settings,
            events,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Queues a deferred ingestion run and returns its job id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the payload cannot be encoded or stored.
    pub async fn enqueue_ingest(&self, payload: &IngestJobPayload) -> Result<i64, PipelineError> {
        let value = serde_json::to_value(payload)?;
        let id = self
            .enqueue(INGEST_JOB_KIND, value, payload.origin.priority())
            .await?;
        tracing::info!(
            job_id = id,
            origin = ?payload.origin,
            keywords = ?payload.filters.keywords,
            "ingestion job queued"
        );
        Ok(id)
    }

    /// Queues several ingestion runs; ids come back in input order.
    ///
    /// # Errors
    ///
    /// Stops at the first payload that cannot be stored.
    pub async fn enqueue_bulk(
        &self,
        payloads: &[IngestJobPayload],
    ) -> Result<Vec<i64>, PipelineError> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.enqueue_ingest(payload).await?);
        }
        Ok(ids)
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if the job row cannot be written.
    pub async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<i64, DbError> {
        let job = self
            .store
            .enqueue_job(&NewJob {
                kind: kind.to_string(),
                payload,
                priority,
                max_attempts: i32::try_from(self.settings.max_attempts.max(1))
                    .unwrap_or(i32::MAX),
            })
            .await?;
        Ok(job.id)
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if the counts cannot be read.
    pub async fn stats(&self) -> Result<QueueStats, DbError> {
        let counts = self.store.job_counts().await?;
        Ok(QueueStats {
            waiting: counts.waiting + counts.delayed,
            delayed: counts.delayed,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
        })
    }

    /// Drops finished jobs past the retention window.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub async fn prune(&self) -> Result<u64, DbError> {
        let removed = self.store.prune_jobs(&self.settings.retention).await?;
        if removed > 0 {
            tracing::debug!(removed, "pruned finished jobs");
        }
        Ok(removed)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        // No subscribers is the normal case.
        let _ = self.events.send(event);
    }
}
