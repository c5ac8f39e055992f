//! Signal processing: ingestion, the job queue and its worker, bucket
//! classification, candidate workflows, partner sync and inbound webhooks.

mod classify;
mod dedup;
mod error;
mod ingest;
mod integrations;
mod queue;
mod rate_limit;
mod sync;
mod webhook;
mod worker;
mod workflow;

pub use classify::{
    check_icp, BucketEngine, BucketRules, ClassificationStats, Enricher, IcpRejection,
    NullEnricher,
};
pub use dedup::{dedupe_and_store, store_if_new, DedupOutcome};
pub use error::{IngestValidationError, IntegrationValidationError, PipelineError, WebhookError};
pub use ingest::{IngestOutcome, IngestSettings, IngestionStats, Ingestor};
pub use integrations::{IntegrationRegistry, IntegrationSummary, NewIntegration};
pub use queue::{
    IngestJobPayload, JobEvent, JobOrigin, JobQueue, QueueSettings, QueueStats, INGEST_JOB_KIND,
};
pub use rate_limit::RateLimiter;
pub use sync::{
    BidirectionalReport, IntegrationSyncStatus, PartnerSyncResult, PartnerSyncService, SyncReport,
};
pub use webhook::{PartnerWebhookOutcome, SignalWebhookOutcome, WebhookHandler, WebhookSecrets};
pub use worker::{IngestJobHandler, JobHandler, Worker};
pub use workflow::{
    CandidateLead, CandidateQuery, CandidateSource, CandidateWorkflow, LikelihoodScorer,
    SampleCandidateSource,
};
