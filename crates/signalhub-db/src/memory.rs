//! In-process [`crate::Store`] used by tests and local runs without Postgres.
//!
//! All state sits behind one mutex so every operation is atomic, matching
//! the guarantees the Postgres constraints give.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalhub_core::{
    ActionBucket, Application, ApplicationStatus, AssignedSignal, BucketAssignment, BucketType,
    BucketWithSignals, CandidateProfile, Enrichment, IcpConfig, IntegrationStatus, NaturalKey,
    NewApplication, NewCandidateProfile, NewSignal, NewSyncLog, PartnerCredentials,
    PartnerIntegration, PartnerJobPosting, PartnerJobStatus, PartnerKind, Signal, SignalType,
    SyncLog,
};
use tokio::time::Instant;

use crate::store::{
    BucketStore, CounterState, CounterStore, JobCounts, JobStatus, JobStore, NewJob,
    NewPartnerJobPosting, PartnerStore, QueuedJob, RetentionPolicy, SignalStore,
};
use crate::DbError;

#[derive(Debug)]
struct Counter {
    count: i64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    signals: Vec<Signal>,
    signal_keys: HashMap<NaturalKey, i64>,
    enrichments: HashMap<i64, Enrichment>,
    buckets: Vec<ActionBucket>,
    assignments: Vec<BucketAssignment>,
    candidates: Vec<CandidateProfile>,
    icp_config: Option<IcpConfig>,
    integrations: Vec<PartnerIntegration>,
    postings: Vec<PartnerJobPosting>,
    applications: Vec<Application>,
    sync_logs: Vec<SyncLog>,
    counters: HashMap<String, Counter>,
    jobs: Vec<QueuedJob>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn signal_mut(&mut self, id: i64) -> Result<&mut Signal, DbError> {
        self.signals
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(DbError::NotFound)
    }

    fn posting_mut(&mut self, id: i64) -> Result<&mut PartnerJobPosting, DbError> {
        self.postings
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DbError::NotFound)
    }

    fn integration_mut(&mut self, id: i64) -> Result<&mut PartnerIntegration, DbError> {
        self.integrations
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(DbError::NotFound)
    }

    fn job_mut(&mut self, id: i64) -> Result<&mut QueuedJob, DbError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(DbError::NotFound)
    }

    fn bucket_with_signals(&self, bucket: &ActionBucket) -> BucketWithSignals {
        let mut signals: Vec<AssignedSignal> = self
            .assignments
            .iter()
            .filter(|a| a.bucket_id == bucket.id)
            .filter_map(|a| {
                self.signals
                    .iter()
                    .find(|s| s.id == a.signal_id)
                    .map(|s| AssignedSignal {
                        signal: s.clone(),
                        confidence: a.confidence,
                    })
            })
            .collect();
        signals.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.signal.id.cmp(&b.signal.id))
        });
        BucketWithSignals {
            bucket: bucket.clone(),
            signals,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Backdates or forward-dates a signal's `updated_at` for conflict fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the signal does not exist.
    pub fn set_signal_updated_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), DbError> {
        self.lock().signal_mut(id)?.updated_at = at;
        Ok(())
    }

    /// Backdates or forward-dates a posting's `updated_at` for conflict fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the posting does not exist.
    pub fn set_posting_updated_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), DbError> {
        self.lock().posting_mut(id)?.updated_at = at;
        Ok(())
    }

    /// Every stored signal in insertion order.
    #[must_use]
    pub fn signals(&self) -> Vec<Signal> {
        self.lock().signals.clone()
    }
}

fn take_limit<T>(items: impl Iterator<Item = T>, limit: i64) -> Vec<T> {
    items
        .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
        .collect()
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn insert_signal_if_new(&self, signal: &NewSignal) -> Result<Option<Signal>, DbError> {
        let mut inner = self.lock();
        let key = signal.natural_key();
        if inner.signal_keys.contains_key(&key) {
            return Ok(None);
        }
        let id = inner.next_id();
        let now = Utc::now();
        let stored = Signal {
            id,
            signal_type: signal.signal_type,
            source: signal.source.clone(),
            title: signal.title.clone(),
            company_name: signal.company_name.clone(),
            company_url: signal.company_url.clone(),
            job_url: signal.job_url.clone(),
            location: signal.location.clone(),
            posted_date: signal.posted_date,
            raw_data: signal.raw_data.clone(),
            processed: false,
            created_at: now,
            updated_at: now,
        };
        inner.signal_keys.insert(key, id);
        inner.signals.push(stored.clone());
        Ok(Some(stored))
    }

    async fn get_signal(&self, id: i64) -> Result<Option<Signal>, DbError> {
        Ok(self.lock().signals.iter().find(|s| s.id == id).cloned())
    }

    async fn list_signals(
        &self,
        signal_type: Option<SignalType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Signal>, DbError> {
        let inner = self.lock();
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        Ok(take_limit(
            inner
                .signals
                .iter()
                .rev()
                .filter(|s| signal_type.is_none_or(|t| s.signal_type == t))
                .skip(skip)
                .cloned(),
            limit,
        ))
    }

    async fn list_unprocessed_signals(&self, limit: i64) -> Result<Vec<Signal>, DbError> {
        let inner = self.lock();
        Ok(take_limit(
            inner.signals.iter().filter(|s| !s.processed).cloned(),
            limit,
        ))
    }

    async fn list_unprocessed_job_postings(
        &self,
        ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<Signal>, DbError> {
        let inner = self.lock();
        Ok(take_limit(
            inner
                .signals
                .iter()
                .filter(|s| !s.processed && s.signal_type == SignalType::JobPosting)
                .filter(|s| ids.is_none_or(|ids| ids.contains(&s.id)))
                .cloned(),
            limit,
        ))
    }

    async fn mark_signal_processed(&self, id: i64) -> Result<(), DbError> {
        let mut inner = self.lock();
        let signal = inner.signal_mut(id)?;
        signal.processed = true;
        signal.updated_at = Utc::now();
        Ok(())
    }

    async fn update_signal_title_location(
        &self,
        id: i64,
        title: Option<&str>,
        location: Option<&str>,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let signal = inner.signal_mut(id)?;
        signal.title = title.map(ToString::to_string);
        signal.location = location.map(ToString::to_string);
        signal.updated_at = Utc::now();
        Ok(())
    }

    async fn get_enrichment(&self, signal_id: i64) -> Result<Option<Enrichment>, DbError> {
        Ok(self.lock().enrichments.get(&signal_id).cloned())
    }

    async fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<(), DbError> {
        self.lock()
            .enrichments
            .insert(enrichment.signal_id, enrichment.clone());
        Ok(())
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn ensure_bucket(&self, bucket_type: BucketType) -> Result<ActionBucket, DbError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.buckets.iter().find(|b| b.bucket_type == bucket_type) {
            return Ok(existing.clone());
        }
        let bucket = ActionBucket {
            id: inner.next_id(),
            bucket_type,
            name: bucket_type.display_name().to_string(),
            description: Some(bucket_type.description().to_string()),
            priority: bucket_type.priority(),
            is_active: true,
            created_at: Utc::now(),
        };
        inner.buckets.push(bucket.clone());
        Ok(bucket)
    }

    async fn get_bucket(&self, id: i64) -> Result<Option<ActionBucket>, DbError> {
        Ok(self.lock().buckets.iter().find(|b| b.id == id).cloned())
    }

    async fn upsert_assignment(
        &self,
        bucket_id: i64,
        signal_id: i64,
        confidence: f64,
    ) -> Result<BucketAssignment, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner
            .assignments
            .iter_mut()
            .find(|a| a.bucket_id == bucket_id && a.signal_id == signal_id)
        {
            existing.confidence = confidence;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let assignment = BucketAssignment {
            id: inner.next_id(),
            bucket_id,
            signal_id,
            confidence,
            created_at: now,
            updated_at: now,
        };
        inner.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn list_buckets_with_signals(&self) -> Result<Vec<BucketWithSignals>, DbError> {
        let inner = self.lock();
        let mut buckets: Vec<&ActionBucket> = inner.buckets.iter().filter(|b| b.is_active).collect();
        buckets.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(buckets
            .into_iter()
            .map(|b| inner.bucket_with_signals(b))
            .collect())
    }

    async fn get_bucket_with_signals(
        &self,
        id: i64,
    ) -> Result<Option<BucketWithSignals>, DbError> {
        let inner = self.lock();
        Ok(inner
            .buckets
            .iter()
            .find(|b| b.id == id)
            .map(|b| inner.bucket_with_signals(b)))
    }

    async fn insert_candidates(
        &self,
        candidates: &[NewCandidateProfile],
    ) -> Result<Vec<CandidateProfile>, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut stored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let profile = CandidateProfile {
                id: inner.next_id(),
                bucket_id: candidate.bucket_id,
                signal_id: candidate.signal_id,
                full_name: candidate.full_name.clone(),
                current_title: candidate.current_title.clone(),
                current_company: candidate.current_company.clone(),
                linkedin_url: candidate.linkedin_url.clone(),
                skills: candidate.skills.clone(),
                tenure_months: candidate.tenure_months,
                likelihood_to_move: candidate.likelihood_to_move,
                created_at: now,
            };
            inner.candidates.push(profile.clone());
            stored.push(profile);
        }
        Ok(stored)
    }

    async fn list_candidates(
        &self,
        bucket_id: i64,
        limit: i64,
    ) -> Result<Vec<CandidateProfile>, DbError> {
        let inner = self.lock();
        let mut candidates: Vec<CandidateProfile> = inner
            .candidates
            .iter()
            .filter(|c| c.bucket_id == bucket_id)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.likelihood_to_move
                .total_cmp(&a.likelihood_to_move)
                .then(a.id.cmp(&b.id))
        });
        Ok(take_limit(candidates.into_iter(), limit))
    }

    async fn load_icp_config(&self) -> Result<Option<IcpConfig>, DbError> {
        Ok(self.lock().icp_config.clone())
    }

    async fn save_icp_config(&self, config: &IcpConfig) -> Result<(), DbError> {
        self.lock().icp_config = Some(config.clone());
        Ok(())
    }
}

#[async_trait]
impl PartnerStore for MemoryStore {
    async fn list_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError> {
        Ok(self
            .lock()
            .integrations
            .iter()
            .filter(|i| partner.is_none_or(|p| i.partner == p))
            .cloned()
            .collect())
    }

    async fn list_active_integrations(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<PartnerIntegration>, DbError> {
        Ok(self
            .lock()
            .integrations
            .iter()
            .filter(|i| i.status == IntegrationStatus::Active)
            .filter(|i| partner.is_none_or(|p| i.partner == p))
            .cloned()
            .collect())
    }

    async fn upsert_integration(
        &self,
        partner: PartnerKind,
        status: IntegrationStatus,
        credentials: &PartnerCredentials,
        webhook_secret: Option<&str>,
    ) -> Result<PartnerIntegration, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.integrations.iter_mut().find(|i| i.partner == partner) {
            existing.status = status;
            existing.credentials = credentials.clone();
            existing.webhook_secret = webhook_secret.map(ToString::to_string);
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let integration = PartnerIntegration {
            id: inner.next_id(),
            partner,
            status,
            credentials: credentials.clone(),
            webhook_secret: webhook_secret.map(ToString::to_string),
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.integrations.push(integration.clone());
        Ok(integration)
    }

    async fn update_integration_status(
        &self,
        id: i64,
        status: IntegrationStatus,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let integration = inner.integration_mut(id)?;
        integration.status = status;
        if synced_at.is_some() {
            integration.last_sync_at = synced_at;
        }
        integration.updated_at = Utc::now();
        Ok(())
    }

    async fn update_integration_credentials(
        &self,
        id: i64,
        credentials: &PartnerCredentials,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let integration = inner.integration_mut(id)?;
        integration.credentials = credentials.clone();
        integration.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_job_posting(
        &self,
        posting: &NewPartnerJobPosting,
    ) -> Result<PartnerJobPosting, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.postings.iter_mut().find(|p| {
            p.integration_id == posting.integration_id && p.partner_job_id == posting.partner_job_id
        }) {
            if posting.signal_id.is_some() {
                existing.signal_id = posting.signal_id;
            }
            existing.status = posting.status;
            existing.metadata = posting.metadata.clone();
            if posting.posted_at.is_some() {
                existing.posted_at = posting.posted_at;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let stored = PartnerJobPosting {
            id: inner.next_id(),
            integration_id: posting.integration_id,
            signal_id: posting.signal_id,
            partner_job_id: posting.partner_job_id.clone(),
            status: posting.status,
            metadata: posting.metadata.clone(),
            application_count: 0,
            posted_at: posting.posted_at,
            created_at: now,
            updated_at: now,
        };
        inner.postings.push(stored.clone());
        Ok(stored)
    }

    async fn find_job_posting(
        &self,
        integration_id: i64,
        partner_job_id: &str,
    ) -> Result<Option<PartnerJobPosting>, DbError> {
        Ok(self
            .lock()
            .postings
            .iter()
            .find(|p| p.integration_id == integration_id && p.partner_job_id == partner_job_id)
            .cloned())
    }

    async fn list_linked_postings(
        &self,
        integration_id: Option<i64>,
    ) -> Result<Vec<PartnerJobPosting>, DbError> {
        Ok(self
            .lock()
            .postings
            .iter()
            .filter(|p| p.signal_id.is_some())
            .filter(|p| integration_id.is_none_or(|id| p.integration_id == id))
            .cloned()
            .collect())
    }

    async fn count_job_postings(&self, integration_id: i64) -> Result<i64, DbError> {
        let count = self
            .lock()
            .postings
            .iter()
            .filter(|p| p.integration_id == integration_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn update_posting_metadata(
        &self,
        id: i64,
        metadata: &serde_json::Value,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let posting = inner.posting_mut(id)?;
        posting.metadata = metadata.clone();
        posting.updated_at = Utc::now();
        Ok(())
    }

    async fn update_posting_status(
        &self,
        id: i64,
        status: PartnerJobStatus,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let posting = inner.posting_mut(id)?;
        posting.status = status;
        posting.updated_at = Utc::now();
        Ok(())
    }

    async fn record_application(
        &self,
        application: &NewApplication,
    ) -> Result<Option<Application>, DbError> {
        let mut inner = self.lock();
        if inner.applications.iter().any(|a| {
            a.posting_id == application.posting_id
                && a.partner_application_id == application.partner_application_id
        }) {
            return Ok(None);
        }
        let now = Utc::now();
        let posting = inner.posting_mut(application.posting_id)?;
        posting.application_count += 1;
        posting.updated_at = now;
        let stored = Application {
            id: inner.next_id(),
            posting_id: application.posting_id,
            partner_application_id: application.partner_application_id.clone(),
            candidate_name: application.candidate_name.clone(),
            candidate_email: application.candidate_email.clone(),
            status: application.status,
            applied_at: application.applied_at,
            created_at: now,
            updated_at: now,
        };
        inner.applications.push(stored.clone());
        Ok(Some(stored))
    }

    async fn update_application_status(
        &self,
        integration_id: i64,
        partner_application_id: &str,
        status: ApplicationStatus,
    ) -> Result<u64, DbError> {
        let mut inner = self.lock();
        let owned: HashSet<i64> = inner
            .postings
            .iter()
            .filter(|p| p.integration_id == integration_id)
            .map(|p| p.id)
            .collect();
        let now = Utc::now();
        let mut updated = 0;
        for application in inner.applications.iter_mut().filter(|a| {
            a.partner_application_id == partner_application_id && owned.contains(&a.posting_id)
        }) {
            application.status = status;
            application.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn list_applications(&self, posting_id: i64) -> Result<Vec<Application>, DbError> {
        Ok(self
            .lock()
            .applications
            .iter()
            .filter(|a| a.posting_id == posting_id)
            .cloned()
            .collect())
    }

    async fn insert_sync_log(&self, log: &NewSyncLog) -> Result<SyncLog, DbError> {
        let mut inner = self.lock();
        let stored = SyncLog {
            id: inner.next_id(),
            integration_id: log.integration_id,
            sync_type: log.sync_type,
            status: log.status,
            records_processed: log.records_processed,
            records_failed: log.records_failed,
            error_message: log.error_message.clone(),
            metadata: log.metadata.clone(),
            started_at: log.started_at,
            completed_at: Some(Utc::now()),
        };
        inner.sync_logs.push(stored.clone());
        Ok(stored)
    }

    async fn list_sync_logs(
        &self,
        integration_id: i64,
        limit: i64,
    ) -> Result<Vec<SyncLog>, DbError> {
        let inner = self.lock();
        Ok(take_limit(
            inner
                .sync_logs
                .iter()
                .rev()
                .filter(|l| l.integration_id == integration_id)
                .cloned(),
            limit,
        ))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_counter(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterState, DbError> {
        let mut inner = self.lock();
        let now = Instant::now();
        let counter = inner
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Counter {
                count: 0,
                expires_at: now + window,
            });
        if counter.expires_at <= now {
            counter.count = 0;
            counter.expires_at = now + window;
        }
        counter.count += 1;
        Ok(CounterState {
            count: counter.count,
            resets_in: counter.expires_at.saturating_duration_since(now),
        })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn enqueue_job(&self, job: &NewJob) -> Result<QueuedJob, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let queued = QueuedJob {
            id: inner.next_id(),
            kind: job.kind.clone(),
            payload: job.payload.clone(),
            priority: job.priority,
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: job.max_attempts,
            run_at: now,
            last_error: None,
            result: None,
            created_at: now,
            finished_at: None,
        };
        inner.jobs.push(queued.clone());
        Ok(queued)
    }

    async fn claim_next_job(&self) -> Result<Option<QueuedJob>, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let next = inner
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Waiting && j.run_at <= now)
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.run_at.cmp(&b.run_at))
                    .then(a.id.cmp(&b.id))
            });
        Ok(next.map(|job| {
            job.status = JobStatus::Active;
            job.attempts += 1;
            job.clone()
        }))
    }

    async fn complete_job(&self, id: i64, result: &serde_json::Value) -> Result<(), DbError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Completed;
        job.result = Some(result.clone());
        job.last_error = None;
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn retry_job(
        &self,
        id: i64,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Waiting;
        job.run_at = run_at;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn fail_job(&self, id: i64, error: &str) -> Result<(), DbError> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_job(&self, id: i64) -> Result<Option<QueuedJob>, DbError> {
        Ok(self.lock().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn job_counts(&self) -> Result<JobCounts, DbError> {
        let inner = self.lock();
        let now = Utc::now();
        let mut counts = JobCounts::default();
        for job in &inner.jobs {
            match job.status {
                JobStatus::Waiting if job.run_at > now => counts.delayed += 1,
                JobStatus::Waiting => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn prune_jobs(&self, policy: &RetentionPolicy) -> Result<u64, DbError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let completed_cutoff = cutoff(now, policy.completed_max_age);
        let failed_cutoff = cutoff(now, policy.failed_max_age);

        let mut completed: Vec<(DateTime<Utc>, i64)> = inner
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .map(|j| (j.finished_at.unwrap_or(j.created_at), j.id))
            .collect();
        completed.sort_by(|a, b| b.cmp(a));
        let keep = usize::try_from(policy.completed_max_count.max(0)).unwrap_or(usize::MAX);
        let overflow: Vec<i64> = completed.iter().skip(keep).map(|(_, id)| *id).collect();

        let before = inner.jobs.len();
        inner.jobs.retain(|j| {
            let finished = j.finished_at.unwrap_or(j.created_at);
            match j.status {
                JobStatus::Completed => finished >= completed_cutoff && !overflow.contains(&j.id),
                JobStatus::Failed => finished >= failed_cutoff,
                JobStatus::Waiting | JobStatus::Active => true,
            }
        });
        Ok(u64::try_from(before - inner.jobs.len()).unwrap_or(0))
    }
}
