//! Storage seam shared by the pipeline, server and CLI.
//!
//! Every write that can race between workers (signal insert, bucket upsert,
//! assignment upsert, counter increment, job claim) is atomic in each
//! implementation: unique constraints and `ON CONFLICT` in Postgres, a single
//! mutex in [`crate::MemoryStore`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalhub_core::{
    ActionBucket, Application, ApplicationStatus, BucketAssignment, BucketType,
    BucketWithSignals, CandidateProfile, Enrichment, IcpConfig, IntegrationStatus, NewApplication,
    NewCandidateProfile, NewSignal, NewSyncLog, PartnerCredentials, PartnerIntegration,
    PartnerJobPosting, PartnerJobStatus, PartnerKind, Signal, SignalType, SyncLog,
};

use crate::DbError;

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Cheap liveness check used by the health endpoint.
    async fn ping(&self) -> Result<(), DbError>;

    /// Inserts `signal` unless a row with the same natural key exists.
    /// Returns `None` for a duplicate.
    async fn insert_signal_if_new(&self, signal: &NewSignal) -> Result<Option<Signal>, DbError>;

    async fn get_signal(&self, id: i64) -> Result<Option<Signal>, DbError>;

    /// Newest first, skipping `offset` rows. `signal_type` narrows to one kind.
    async fn list_signals(
        &self,
        signal_type: Option<SignalType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Signal>, DbError>;

    /// Oldest unprocessed signals first.
    async fn list_unprocessed_signals(&self, limit: i64) -> Result<Vec<Signal>, DbError>;

    /// Unprocessed `job_posting` signals, optionally restricted to `ids`.
    async fn list_unprocessed_job_postings(
        &self,
        ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<Signal>, DbError>;

    async fn mark_signal_processed(&self, id: i64) -> Result<(), DbError>;

    /// Overwrites the mutable fields that take part in conflict resolution.
    async fn update_signal_title_location(
        &self,
        id: i64,
        title: Option<&str>,
        location: Option<&str>,
    ) -> Result<(), DbError>;

    async fn get_enrichment(&self, signal_id: i64) -> Result<Option<Enrichment>, DbError>;

    async fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<(), DbError>;
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Returns the bucket for `bucket_type`, creating it on first use.
    async fn ensure_bucket(&self, bucket_type: BucketType) -> Result<ActionBucket, DbError>;

    async fn get_bucket(&self, id: i64) -> Result<Option<ActionBucket>, DbError>;

    /// Inserts or overwrites the confidence of the `(bucket_id, signal_id)` pair.
    async fn upsert_assignment(
        &self,
        bucket_id: i64,
        signal_id: i64,
        confidence: f64,
    ) -> Result<BucketAssignment, DbError>;

    /// Active buckets by descending priority, each with its signals by
    /// descending confidence.
    async fn list_buckets_with_signals(&self) -> Result<Vec<BucketWithSignals>, DbError>;

    async fn get_bucket_with_signals(&self, id: i64)
        -> Result<Option<BucketWithSignals>, DbError>;

    async fn insert_candidates(
        &self,
        candidates: &[NewCandidateProfile],
    ) -> Result<Vec<CandidateProfile>, DbError>;

    /// Candidates for a bucket by descending likelihood to move.
    async fn list_candidates(
        &self,
        bucket_id: i64,
        limit: i64,
    ) -> Result<Vec<CandidateProfile>, DbError>;

    async fn load_icp_config(&self) -> Result<Option<IcpConfig>, DbError>;

    async fn save_icp_config(&self, config: &IcpConfig) -> Result<(), DbError>;
}

/// Fields for creating or refreshing a partner's copy of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPartnerJobPosting {
    pub integration_id: i64,
    pub signal_id: Option<i64>,
    pub partner_job_id: String,
    pub status: PartnerJobStatus,
    pub metadata: serde_json::Value,
    pub posted_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PartnerStore: Send + Sync {
    /// All integrations, optionally filtered by partner.
    async fn list_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError>;

    /// `ACTIVE` integrations, optionally filtered by partner.
    async fn list_active_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError>;

    async fn upsert_integration(
        &self,
        partner: PartnerKind,
        status: IntegrationStatus,
        credentials: &PartnerCredentials,
        webhook_secret: Option<&str>,
    ) -> Result<PartnerIntegration, DbError>;

    /// Sets the status and, when `synced_at` is given, the last-sync time.
    async fn update_integration_status(
        &self,
        id: i64,
        status: IntegrationStatus,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;

    async fn update_integration_credentials(
        &self,
        id: i64,
        credentials: &PartnerCredentials,
    ) -> Result<(), DbError>;

    /// Inserts or refreshes the posting keyed by `(integration_id, partner_job_id)`.
    /// An existing `signal_id` link is kept when the new one is `None`.
    async fn upsert_job_posting(
        &self,
        posting: &NewPartnerJobPosting,
    ) -> Result<PartnerJobPosting, DbError>;

    async fn find_job_posting(
        &self,
        integration_id: i64,
        partner_job_id: &str,
    ) -> Result<Option<PartnerJobPosting>, DbError>;

    /// Postings linked to a signal, optionally for one integration.
    async fn list_linked_postings(
        &self,
        integration_id: Option<i64>,
    ) -> Result<Vec<PartnerJobPosting>, DbError>;

    async fn count_job_postings(&self, integration_id: i64) -> Result<i64, DbError>;

    async fn update_posting_metadata(
        &self,
        id: i64,
        metadata: &serde_json::Value,
    ) -> Result<(), DbError>;

    async fn update_posting_status(&self, id: i64, status: PartnerJobStatus)
        -> Result<(), DbError>;

    /// Inserts an application and bumps its posting's `application_count` as
    /// one unit. A repeated `(posting_id, partner_application_id)` changes
    /// nothing and returns `None`, so concurrent deliveries count once.
    async fn record_application(
        &self,
        application: &NewApplication,
    ) -> Result<Option<Application>, DbError>;

    /// Updates applications under postings owned by `integration_id` only.
    /// Returns the number of applications updated.
    async fn update_application_status(
        &self,
        integration_id: i64,
        partner_application_id: &str,
        status: ApplicationStatus,
    ) -> Result<u64, DbError>;

    async fn list_applications(&self, posting_id: i64) -> Result<Vec<Application>, DbError>;

    async fn insert_sync_log(&self, log: &NewSyncLog) -> Result<SyncLog, DbError>;

    /// Most recent first.
    async fn list_sync_logs(&self, integration_id: i64, limit: i64)
        -> Result<Vec<SyncLog>, DbError>;
}

/// Counter value after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub count: i64,
    /// Time until the current window closes.
    pub resets_in: Duration,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments the counter for `key`. The first increment after
    /// the previous window closed starts a new window of length `window`.
    async fn increment_counter(&self, key: &str, window: Duration)
        -> Result<CounterState, DbError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DbError::InvalidValue {
                column: "ingest_jobs.status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub kind: String,
    pub payload: serde_json::Value,
    /// Lower runs first.
    pub priority: i32,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    /// Ready to run now.
    pub waiting: i64,
    /// Waiting for a retry backoff to elapse.
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// How long finished jobs stay inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed_max_age: Duration,
    pub completed_max_count: i64,
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::from_secs(3600),
            completed_max_count: 1000,
            failed_max_age: Duration::from_secs(24 * 3600),
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue_job(&self, job: &NewJob) -> Result<QueuedJob, DbError>;

    /// Claims the highest-priority due job, moving it to `active` and
    /// incrementing its attempt count. Safe to call from many workers.
    async fn claim_next_job(&self) -> Result<Option<QueuedJob>, DbError>;

    async fn complete_job(&self, id: i64, result: &serde_json::Value) -> Result<(), DbError>;

    /// Returns an active job to `waiting`, due at `run_at`.
    async fn retry_job(&self, id: i64, run_at: DateTime<Utc>, error: &str)
        -> Result<(), DbError>;

    async fn fail_job(&self, id: i64, error: &str) -> Result<(), DbError>;

    async fn get_job(&self, id: i64) -> Result<Option<QueuedJob>, DbError>;

    async fn job_counts(&self) -> Result<JobCounts, DbError>;

    /// Deletes finished jobs outside the retention policy; returns the count.
    async fn prune_jobs(&self, policy: &RetentionPolicy) -> Result<u64, DbError>;
}

/// Everything the pipeline needs from storage.
pub trait Store: SignalStore + BucketStore + PartnerStore + CounterStore + JobStore {}

impl<T> Store for T where T: SignalStore + BucketStore + PartnerStore + CounterStore + JobStore {}
