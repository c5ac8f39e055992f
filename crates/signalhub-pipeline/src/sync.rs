//! Two-way synchronisation between stored signals and partner job platforms.
//!
//! Each integration is synced on its own: one partner failing never stops the
//! others. Every step writes a sync log and moves the integration to
//! `ACTIVE` (with a fresh `last_sync_at`) or `ERROR`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use signalhub_core::{
    ConflictStrategy, IngestFilters, IntegrationStatus, NewSyncLog, PartnerIntegration,
    PartnerJobPosting, PartnerJobStatus, PartnerKind, Signal, SyncLog, SyncStatus, SyncType,
};
use signalhub_db::{NewPartnerJobPosting, PartnerStore, SignalStore, Store};
use signalhub_partners::{
    JobPostingData, JobPostingUpdate, PartnerClient, PartnerClientFactory, PartnerJob,
};

use crate::dedup::store_if_new;
use crate::error::PipelineError;

const DEFAULT_PULL_LIMIT: usize = 100;
const DEFAULT_PUSH_LIMIT: i64 = 50;
const RECENT_LOG_LIMIT: i64 = 10;

/// Outcome of one sync step against one integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSyncResult {
    pub partner: PartnerKind,
    pub integration_id: i64,
    pub success: bool,
    pub records_processed: i32,
    pub records_failed: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    pub results: Vec<PartnerSyncResult>,
}

impl SyncReport {
    fn from_results(results: Vec<PartnerSyncResult>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidirectionalReport {
    pub success: bool,
    pub pull: SyncReport,
    pub push: SyncReport,
    pub conflicts: SyncReport,
}

/// Current state of one integration for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSyncStatus {
    pub integration: PartnerIntegration,
    pub job_posting_count: i64,
    pub recent_logs: Vec<SyncLog>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StepCounts {
    processed: i32,
    failed: i32,
}

pub struct PartnerSyncService {
    store: Arc<dyn Store>,
    factory: Arc<dyn PartnerClientFactory>,
    pull_limit: usize,
    push_limit: i64,
}

impl PartnerSyncService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, factory: Arc<dyn PartnerClientFactory>) -> Self {
        Self {
            store,
            factory,
            pull_limit: DEFAULT_PULL_LIMIT,
            push_limit: DEFAULT_PUSH_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, pull_limit: usize, push_limit: i64) -> Self {
        self.pull_limit = pull_limit.max(1);
        self.push_limit = push_limit.max(1);
        self
    }

    /// Imports up to `limit` partner jobs per integration as signals and links
    /// them to posting records.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] only when the integration list cannot be
    /// read. Per-integration failures are reported in the result.
    pub async fn sync_from_partners(
        &self,
        partner: Option<PartnerKind>,
        limit: Option<usize>,
    ) -> Result<SyncReport, PipelineError> {
        let limit = limit.unwrap_or(self.pull_limit).max(1);
        let integrations = self.store.list_active_integrations(partner).await?;
        let mut results = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            let started_at = Utc::now();
            let outcome = self.pull_integration(integration, limit).await;
            results.push(
                self.finish_step(integration, SyncType::Pull, started_at, outcome)
                    .await,
            );
        }
        Ok(SyncReport::from_results(results))
    }

    /// Publishes unprocessed job-posting signals to every active partner.
    ///
    /// # Errors
    ///
    /// See [`PartnerSyncService::sync_from_partners`].
    pub async fn sync_to_partners(
        &self,
        partner: Option<PartnerKind>,
        signal_ids: Option<&[i64]>,
        limit: Option<i64>,
    ) -> Result<SyncReport, PipelineError> {
        let integrations = self.store.list_active_integrations(partner).await?;
        let signals = self
            .store
            .list_unprocessed_job_postings(signal_ids, limit.unwrap_or(self.push_limit).max(1))
            .await?;
        let mut results = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            let started_at = Utc::now();
            let outcome = self.push_integration(integration, &signals).await;
            results.push(
                self.finish_step(integration, SyncType::Push, started_at, outcome)
                    .await,
            );
        }
        Ok(SyncReport::from_results(results))
    }

    /// Pull, push, then reconcile linked postings with `strategy`.
    ///
    /// # Errors
    ///
    /// See [`PartnerSyncService::sync_from_partners`].
    pub async fn bidirectional_sync(
        &self,
        partner: Option<PartnerKind>,
        strategy: ConflictStrategy,
    ) -> Result<BidirectionalReport, PipelineError> {
        let pull = self.sync_from_partners(partner, None).await?;
        let push = self.sync_to_partners(partner, None, None).await?;
        let conflicts = self.resolve_conflicts(partner, strategy).await?;
        tracing::info!(
            %strategy,
            pull_ok = pull.success,
            push_ok = push.success,
            conflicts_ok = conflicts.success,
            "bidirectional sync finished"
        );
        Ok(BidirectionalReport {
            success: pull.success && push.success && conflicts.success,
            pull,
            push,
            conflicts,
        })
    }

    /// Reconciles title and location between signals and their linked
    /// partner postings.
    ///
    /// # Errors
    ///
    /// See [`PartnerSyncService::sync_from_partners`].
    pub async fn resolve_conflicts(
        &self,
        partner: Option<PartnerKind>,
        strategy: ConflictStrategy,
    ) -> Result<SyncReport, PipelineError> {
        let integrations = self.store.list_active_integrations(partner).await?;
        let mut results = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            let started_at = Utc::now();
            let outcome = self.reconcile_integration(integration, strategy).await;
            results.push(
                self.finish_step(
                    integration,
                    SyncType::ConflictResolution,
                    started_at,
                    outcome,
                )
                .await,
            );
        }
        Ok(SyncReport::from_results(results))
    }

    /// Integrations with their posting counts and latest sync logs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] when the store fails.
    pub async fn sync_status(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<IntegrationSyncStatus>, PipelineError> {
        let integrations = self.store.list_integrations(partner).await?;
        let mut statuses = Vec::with_capacity(integrations.len());
        for integration in integrations {
            let job_posting_count = self.store.count_job_postings(integration.id).await?;
            let recent_logs = self
                .store
                .list_sync_logs(integration.id, RECENT_LOG_LIMIT)
                .await?;
            statuses.push(IntegrationSyncStatus {
                integration,
                job_posting_count,
                recent_logs,
            });
        }
        Ok(statuses)
    }

    async fn pull_integration(
        &self,
        integration: &PartnerIntegration,
        limit: usize,
    ) -> Result<StepCounts, PipelineError> {
        let client = self.factory.client_for(integration)?;
        let jobs = client.search_jobs(&IngestFilters::default()).await;
        self.persist_refreshed_credentials(integration, client.as_ref())
            .await;
        let jobs = jobs?;

        let mut counts = StepCounts::default();
        for job in jobs.into_iter().take(limit) {
            let partner_job_id = job.partner_job_id.clone();
            match self.import_job(integration, job).await {
                Ok(()) => counts.processed += 1,
                Err(err) => {
                    tracing::warn!(
                        partner = %integration.partner,
                        partner_job_id,
                        error = %err,
                        "failed to import partner job"
                    );
                    counts.failed += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn import_job(
        &self,
        integration: &PartnerIntegration,
        job: PartnerJob,
    ) -> Result<(), PipelineError> {
        let PartnerJob {
            partner_job_id,
            posting,
        } = job;
        let metadata = json!({
            "title": posting.title,
            "location": posting.location,
            "url": posting.job_url,
            "source": posting.source,
            "syncedAt": Utc::now(),
        });
        let signal = store_if_new(self.store.as_ref(), posting).await?;
        self.store
            .upsert_job_posting(&NewPartnerJobPosting {
                integration_id: integration.id,
                signal_id: signal.map(|s| s.id),
                partner_job_id,
                status: PartnerJobStatus::Posted,
                metadata,
                posted_at: None,
            })
            .await?;
        Ok(())
    }

    async fn push_integration(
        &self,
        integration: &PartnerIntegration,
        signals: &[Signal],
    ) -> Result<StepCounts, PipelineError> {
        let client = self.factory.client_for(integration)?;
        let mut counts = StepCounts::default();
        for signal in signals {
            match self.post_signal(integration, client.as_ref(), signal).await {
                Ok(()) => counts.processed += 1,
                Err(err) => {
                    tracing::warn!(
                        partner = %integration.partner,
                        signal_id = signal.id,
                        error = %err,
                        "failed to post signal to partner"
                    );
                    counts.failed += 1;
                }
            }
        }
        self.persist_refreshed_credentials(integration, client.as_ref())
            .await;
        Ok(counts)
    }

    async fn post_signal(
        &self,
        integration: &PartnerIntegration,
        client: &dyn PartnerClient,
        signal: &Signal,
    ) -> Result<(), PipelineError> {
        let data = JobPostingData {
            title: signal.title.clone().unwrap_or_default(),
            company: signal.company_name.clone(),
            location: signal.location.clone(),
            description: signal
                .raw_data
                .get("description")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            url: signal.job_url.clone(),
        };
        let posted = client.post_job(&data).await?;
        self.store
            .upsert_job_posting(&NewPartnerJobPosting {
                integration_id: integration.id,
                signal_id: Some(signal.id),
                partner_job_id: posted.partner_job_id,
                status: PartnerJobStatus::Posted,
                metadata: json!({
                    "title": signal.title,
                    "location": signal.location,
                    "url": posted.url,
                }),
                posted_at: Some(Utc::now()),
            })
            .await?;
        self.store.mark_signal_processed(signal.id).await?;
        Ok(())
    }

    async fn reconcile_integration(
        &self,
        integration: &PartnerIntegration,
        strategy: ConflictStrategy,
    ) -> Result<StepCounts, PipelineError> {
        let client = self.factory.client_for(integration)?;
        let postings = self.store.list_linked_postings(Some(integration.id)).await?;
        let mut counts = StepCounts::default();
        for posting in &postings {
            match self.reconcile(client.as_ref(), posting, strategy).await {
                Ok(()) => counts.processed += 1,
                Err(err) => {
                    tracing::warn!(
                        posting_id = posting.id,
                        error = %err,
                        "failed to reconcile posting"
                    );
                    counts.failed += 1;
                }
            }
        }
        self.persist_refreshed_credentials(integration, client.as_ref())
            .await;
        Ok(counts)
    }

    async fn reconcile(
        &self,
        client: &dyn PartnerClient,
        posting: &PartnerJobPosting,
        strategy: ConflictStrategy,
    ) -> Result<(), PipelineError> {
        let Some(signal_id) = posting.signal_id else {
            return Ok(());
        };
        let Some(signal) = self.store.get_signal(signal_id).await? else {
            return Ok(());
        };

        match resolution(strategy, &signal, posting) {
            Resolution::Keep => Ok(()),
            Resolution::TakePartner { title, location } => {
                tracing::debug!(signal_id, posting_id = posting.id, "taking partner values");
                self.store
                    .update_signal_title_location(signal_id, title.as_deref(), location.as_deref())
                    .await?;
                Ok(())
            }
            Resolution::PushSignal => {
                tracing::debug!(signal_id, posting_id = posting.id, "pushing signal values");
                let update = JobPostingUpdate {
                    title: signal.title.clone(),
                    location: signal.location.clone(),
                    description: None,
                };
                client.update_job(&posting.partner_job_id, &update).await?;
                let mut metadata = match &posting.metadata {
                    serde_json::Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                metadata.insert("title".to_string(), json!(signal.title));
                metadata.insert("location".to_string(), json!(signal.location));
                self.store
                    .update_posting_metadata(posting.id, &serde_json::Value::Object(metadata))
                    .await?;
                Ok(())
            }
        }
    }

    async fn persist_refreshed_credentials(
        &self,
        integration: &PartnerIntegration,
        client: &dyn PartnerClient,
    ) {
        let Some(credentials) = client.take_refreshed_credentials().await else {
            return;
        };
        if let Err(err) = self
            .store
            .update_integration_credentials(integration.id, &credentials)
            .await
        {
            tracing::warn!(
                integration_id = integration.id,
                error = %err,
                "failed to persist refreshed credentials"
            );
        }
    }

    /// Writes the step's sync log and integration status. Store failures
    /// here are logged; the step result is returned either way.
    async fn finish_step(
        &self,
        integration: &PartnerIntegration,
        sync_type: SyncType,
        started_at: DateTime<Utc>,
        outcome: Result<StepCounts, PipelineError>,
    ) -> PartnerSyncResult {
        let (counts, error) = match outcome {
            Ok(counts) => (counts, None),
            Err(err) => {
                tracing::error!(
                    partner = %integration.partner,
                    sync_type = %sync_type,
                    error = %err,
                    "partner sync step failed"
                );
                (StepCounts::default(), Some(err.to_string()))
            }
        };
        let status = if error.is_some() {
            SyncStatus::Error
        } else {
            SyncStatus::from_counts(counts.processed, counts.failed)
        };

        let log = NewSyncLog {
            integration_id: integration.id,
            sync_type,
            status,
            records_processed: counts.processed,
            records_failed: counts.failed,
            error_message: error.clone(),
            metadata: json!({ "partner": integration.partner }),
            started_at,
        };
        if let Err(err) = self.store.insert_sync_log(&log).await {
            tracing::warn!(integration_id = integration.id, error = %err, "failed to write sync log");
        }

        let (integration_status, synced_at) = if error.is_some() {
            (IntegrationStatus::Error, None)
        } else {
            (IntegrationStatus::Active, Some(Utc::now()))
        };
        if let Err(err) = self
            .store
            .update_integration_status(integration.id, integration_status, synced_at)
            .await
        {
            tracing::warn!(
                integration_id = integration.id,
                error = %err,
                "failed to update integration status"
            );
        }

        PartnerSyncResult {
            partner: integration.partner,
            integration_id: integration.id,
            success: error.is_none(),
            records_processed: counts.processed,
            records_failed: counts.failed,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Keep,
    TakePartner {
        title: Option<String>,
        location: Option<String>,
    },
    PushSignal,
}

fn resolution(
    strategy: ConflictStrategy,
    signal: &Signal,
    posting: &PartnerJobPosting,
) -> Resolution {
    let partner_title = posting
        .metadata_title()
        .map(String::from)
        .or_else(|| signal.title.clone());
    let partner_location = posting
        .metadata_location()
        .map(String::from)
        .or_else(|| signal.location.clone());
    let differs = partner_title != signal.title || partner_location != signal.location;

    let take_partner = Resolution::TakePartner {
        title: partner_title,
        location: partner_location,
    };
    match strategy {
        ConflictStrategy::Ours => Resolution::Keep,
        ConflictStrategy::Theirs if differs => take_partner,
        ConflictStrategy::Theirs => Resolution::Keep,
        ConflictStrategy::Newest => {
            if !differs {
                Resolution::Keep
            } else if posting.updated_at > signal.updated_at {
                take_partner
            } else if signal.updated_at > posting.updated_at {
                Resolution::PushSignal
            } else {
                Resolution::Keep
            }
        }
    }
}
