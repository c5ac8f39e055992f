//! Ingestion orchestrator: rate-limited, bounded fan-out over the collectors,
//! then dedup and storage.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use signalhub_collectors::{Collector, CollectorSet, DEFAULT_SOURCES};
use signalhub_core::{AppConfig, FundingFilters, IngestFilters, RawPosting, Signal};
use signalhub_db::{SignalStore, Store};

use crate::dedup::dedupe_and_store;
use crate::error::{IngestValidationError, PipelineError};
use crate::queue::{IngestJobPayload, JobOrigin, JobQueue};
use crate::rate_limit::RateLimiter;

const MAX_DAYS_BACK: u32 = 365;

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub concurrency: usize,
    pub source_rate_limit: u32,
    pub source_rate_window: Duration,
    pub collector_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            source_rate_limit: 50,
            source_rate_window: Duration::from_secs(60),
            collector_timeout: Duration::from_secs(30),
        }
    }
}

impl IngestSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            concurrency: config.ingest_concurrency,
            source_rate_limit: config.source_rate_limit,
            source_rate_window: Duration::from_secs(config.source_rate_window_secs),
            collector_timeout: Duration::from_secs(config.collector_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    /// Raw postings returned by the collectors, duplicates included.
    pub total_collected: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub sources: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_job_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub signals: Vec<Signal>,
    pub stats: IngestionStats,
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn Store>,
    collectors: CollectorSet,
    limiter: RateLimiter,
    queue: JobQueue,
    settings: IngestSettings,
}

impl Ingestor {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        collectors: CollectorSet,
        queue: JobQueue,
        settings: IngestSettings,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(Arc::clone(&store)),
            store,
            collectors,
            queue,
            settings,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Collects job postings now, or queues the run when `use_queue` is set.
    ///
    /// Queued runs return no signals and carry the job id in
    /// `stats.queue_job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for unknown sources or an
    /// out-of-range `days_back`, and [`PipelineError::Db`] when the store fails.
    /// Collector failures are counted in the stats instead.
    pub async fn ingest_job_postings(
        &self,
        filters: &IngestFilters,
        use_queue: bool,
        sources: Option<&[String]>,
    ) -> Result<IngestOutcome, PipelineError> {
        let selected = self.resolve_sources(sources)?;
        validate_days_back(filters.days_back)?;

        if use_queue {
            let payload = IngestJobPayload {
                filters: filters.clone(),
                sources: sources.map(<[String]>::to_vec),
                origin: JobOrigin::Manual,
            };
            let job_id = self.queue.enqueue_ingest(&payload).await?;
            return Ok(IngestOutcome {
                signals: Vec::new(),
                stats: IngestionStats {
                    queue_job_id: Some(job_id),
                    ..IngestionStats::default()
                },
            });
        }

        self.run(filters, &selected).await
    }

    /// The non-queued path. Also the handler body of queued ingestion jobs.
    ///
    /// # Errors
    ///
    /// See [`Ingestor::ingest_job_postings`].
    pub async fn run_now(
        &self,
        filters: &IngestFilters,
        sources: Option<&[String]>,
    ) -> Result<IngestOutcome, PipelineError> {
        let selected = self.resolve_sources(sources)?;
        self.run(filters, &selected).await
    }

    async fn run(
        &self,
        filters: &IngestFilters,
        collectors: &[Arc<dyn Collector>],
    ) -> Result<IngestOutcome, PipelineError> {
        let owned: Vec<Arc<dyn Collector>> = collectors.iter().map(Arc::clone).collect();
        let pending: Vec<_> = owned
            .into_iter()
            .map(|collector| self.collect_tagged(collector, filters))
            .collect();
        let mut results: Vec<(&'static str, Result<Vec<RawPosting>, PipelineError>)> =
            stream::iter(pending)
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;
        // Completion order varies; merge in a stable order so dedup keeps the same winner.
        results.sort_by_key(|(source, _)| *source);

        let mut stats = IngestionStats::default();
        let mut postings = Vec::new();
        for (source, result) in results {
            match result {
                Ok(batch) => {
                    stats.sources.insert(source.to_string(), batch.len());
                    stats.total_collected += batch.len();
                    postings.extend(batch);
                }
                Err(err) => {
                    tracing::warn!(
                        source,
                        error = %err,
                        "collector failed; continuing with other sources"
                    );
                    stats.sources.insert(source.to_string(), 0);
                    stats.errors += 1;
                }
            }
        }

        let outcome = dedupe_and_store(self.store.as_ref(), postings).await?;
        stats.duplicates = outcome.duplicates;
        tracing::info!(
            stored = outcome.signals.len(),
            collected = stats.total_collected,
            duplicates = stats.duplicates,
            errors = stats.errors,
            "job posting ingestion finished"
        );
        Ok(IngestOutcome {
            signals: outcome.signals,
            stats,
        })
    }

    async fn collect_tagged(
        &self,
        collector: Arc<dyn Collector>,
        filters: &IngestFilters,
    ) -> (&'static str, Result<Vec<RawPosting>, PipelineError>) {
        let source = collector.source();
        (source, self.collect_from(collector.as_ref(), filters).await)
    }

    async fn collect_from(
        &self,
        collector: &dyn Collector,
        filters: &IngestFilters,
    ) -> Result<Vec<RawPosting>, PipelineError> {
        let source = collector.source();
        let key = format!("{source}:{}", filters.location_key());
        self.limiter
            .wait_for_limit(
                &key,
                self.settings.source_rate_limit,
                self.settings.source_rate_window,
            )
            .await?;
        let timeout = self.settings.collector_timeout;
        match tokio::time::timeout(timeout, collector.collect(filters)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PipelineError::Timeout {
                source_name: source.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    /// Collects funding rounds and stores the ones not seen before.
    ///
    /// A failing funding source yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] when the store fails.
    pub async fn ingest_funding_signals(
        &self,
        filters: &FundingFilters,
    ) -> Result<Vec<Signal>, PipelineError> {
        if filters.min_amount.is_some_and(|amount| amount < 0.0) {
            return Err(IngestValidationError::NegativeMinAmount.into());
        }
        validate_days_back(filters.days_back)?;

        let funding = self.collectors.funding();
        let timeout = self.settings.collector_timeout;
        let events = match tokio::time::timeout(timeout, funding.collect_funding(filters)).await {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                tracing::warn!(
                    source = funding.source(),
                    error = %err,
                    "funding collector failed"
                );
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(source = funding.source(), "funding collector timed out");
                Vec::new()
            }
        };

        let collected = events.len();
        let mut stored = Vec::new();
        for event in events {
            if let Some(signal) = self
                .store
                .insert_signal_if_new(&event.into_new_signal())
                .await?
            {
                stored.push(signal);
            }
        }
        tracing::info!(collected, stored = stored.len(), "funding ingestion finished");
        Ok(stored)
    }

    fn resolve_sources(
        &self,
        requested: Option<&[String]>,
    ) -> Result<Vec<Arc<dyn Collector>>, IngestValidationError> {
        match requested {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| {
                    self.collectors
                        .get(name.trim())
                        .ok_or_else(|| IngestValidationError::UnknownSource(name.clone()))
                })
                .collect(),
            _ => Ok(DEFAULT_SOURCES
                .iter()
                .filter_map(|source| self.collectors.get(source))
                .collect()),
        }
    }
}

fn validate_days_back(days_back: Option<u32>) -> Result<(), IngestValidationError> {
    match days_back {
        Some(value) if value == 0 || value > MAX_DAYS_BACK => {
            Err(IngestValidationError::DaysBackOutOfRange {
                value,
                max: MAX_DAYS_BACK,
            })
        }
        _ => Ok(()),
    }
}
