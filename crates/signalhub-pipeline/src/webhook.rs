//! Inbound webhooks: partner events (applications, job status) and pushed
//! signals. Signatures are checked before anything is read or written.

use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use signalhub_collectors::parse_posted_date;
use signalhub_core::{
    AppConfig, ApplicationStatus, IngestFilters, NewApplication, NewSignal, NewSyncLog,
    PartnerIntegration, PartnerKind, SignalType, SyncStatus, SyncType,
};
use signalhub_db::{PartnerStore, SignalStore, Store};
use signalhub_partners::{verify_signature, PartnerClientFactory, WebhookEvent};

use crate::error::WebhookError;
use crate::queue::{IngestJobPayload, JobOrigin, JobQueue};

const DEFAULT_SIGNAL_SOURCE: &str = "webhook";
const DEFAULT_WEBHOOK_DAYS_BACK: u32 = 30;

/// Fallback secrets used when an integration row carries none.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WebhookSecrets {
    pub linkedin: Option<String>,
    pub indeed: Option<String>,
    /// Shared secret for pushed signals. Unset means unsigned payloads are accepted.
    pub signals: Option<String>,
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("WebhookSecrets")
            .field("linkedin", &redact(&self.linkedin))
            .field("indeed", &redact(&self.indeed))
            .field("signals", &redact(&self.signals))
            .finish()
    }
}

impl WebhookSecrets {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            linkedin: config.linkedin_webhook_secret.clone(),
            indeed: config.indeed_webhook_secret.clone(),
            signals: config.webhook_secret.clone(),
        }
    }

    fn for_partner(&self, partner: PartnerKind) -> Option<&str> {
        match partner {
            PartnerKind::LinkedIn => self.linkedin.as_deref(),
            PartnerKind::Indeed => self.indeed.as_deref(),
            PartnerKind::Glassdoor => None,
        }
    }
}

/// What a verified partner webhook changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerWebhookOutcome {
    pub event: String,
    pub records_updated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SignalWebhookOutcome {
    #[serde(rename_all = "camelCase")]
    Funding { received: usize, stored: usize },
    #[serde(rename_all = "camelCase")]
    JobPostingQueued { job_id: i64 },
}

pub struct WebhookHandler {
    store: Arc<dyn Store>,
    factory: Arc<dyn PartnerClientFactory>,
    queue: JobQueue,
    secrets: WebhookSecrets,
}

impl WebhookHandler {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn PartnerClientFactory>,
        queue: JobQueue,
        secrets: WebhookSecrets,
    ) -> Self {
        Self {
            store,
            factory,
            queue,
            secrets,
        }
    }

    /// Answers a partner's subscription handshake.
    #[must_use]
    pub fn verify_webhook_challenge(challenge: &str) -> String {
        challenge.to_string()
    }

    /// Verifies and applies one partner event, then records a webhook sync log.
    ///
    /// # Errors
    ///
    /// Authentication failures ([`WebhookError::is_authentication`]) are
    /// returned before the payload is parsed. Malformed events and store
    /// failures are returned after the sync log is written.
    pub async fn process_partner_webhook(
        &self,
        partner: PartnerKind,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<PartnerWebhookOutcome, WebhookError> {
        let integration = self
            .store
            .list_active_integrations(Some(partner))
            .await?
            .into_iter()
            .next()
            .ok_or(WebhookError::NoActiveIntegration(partner))?;
        let secret = integration
            .webhook_secret
            .as_deref()
            .or_else(|| self.secrets.for_partner(partner))
            .ok_or(WebhookError::MissingSecret(partner))?;
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        let client = self.factory.client_for(&integration)?;
        if !client.verify_webhook_signature(payload, signature, secret) {
            tracing::warn!(%partner, "rejected webhook with invalid signature");
            return Err(WebhookError::InvalidSignature);
        }

        let started_at = Utc::now();
        let result = match client.parse_webhook_event(payload) {
            Ok(event) => self.apply_event(&integration, &event).await,
            Err(err) => Err(err.into()),
        };

        let (status, processed, failed, error_message) = match &result {
            Ok(outcome) => (
                SyncStatus::Success,
                i32::try_from(outcome.records_updated).unwrap_or(i32::MAX),
                0,
                None,
            ),
            Err(err) => (SyncStatus::Error, 0, 1, Some(err.to_string())),
        };
        let event = result.as_ref().map(|o| o.event.clone()).ok();
        let log = NewSyncLog {
            integration_id: integration.id,
            sync_type: SyncType::Webhook,
            status,
            records_processed: processed,
            records_failed: failed,
            error_message,
            metadata: serde_json::json!({ "event": event }),
            started_at,
        };
        if let Err(err) = self.store.insert_sync_log(&log).await {
            tracing::warn!(%partner, error = %err, "failed to write webhook sync log");
        }
        result
    }

    async fn apply_event(
        &self,
        integration: &PartnerIntegration,
        event: &WebhookEvent,
    ) -> Result<PartnerWebhookOutcome, WebhookError> {
        let records_updated = match event {
            WebhookEvent::ApplicationReceived {
                partner_job_id,
                partner_application_id,
                candidate_name,
                candidate_email,
                applied_at,
            } => {
                let Some(posting) = self
                    .store
                    .find_job_posting(integration.id, partner_job_id)
                    .await?
                else {
                    tracing::warn!(
                        partner = %integration.partner,
                        partner_job_id,
                        "application for unknown posting"
                    );
                    return Ok(outcome(event, 0));
                };
                let recorded = self
                    .store
                    .record_application(&NewApplication {
                        posting_id: posting.id,
                        partner_application_id: partner_application_id.clone(),
                        candidate_name: candidate_name.clone(),
                        candidate_email: candidate_email.clone(),
                        status: ApplicationStatus::Applied,
                        applied_at: *applied_at,
                    })
                    .await?;
                if recorded.is_some() {
                    1
                } else {
                    tracing::debug!(partner_application_id, "application already recorded");
                    0
                }
            }
            WebhookEvent::ApplicationStatusChanged {
                partner_application_id,
                status,
            } => {
                self.store
                    .update_application_status(integration.id, partner_application_id, *status)
                    .await?
            }
            WebhookEvent::JobStatusChanged {
                partner_job_id,
                status,
            } => match self
                .store
                .find_job_posting(integration.id, partner_job_id)
                .await?
            {
                Some(posting) => {
                    self.store.update_posting_status(posting.id, *status).await?;
                    1
                }
                None => {
                    tracing::warn!(partner_job_id, "status change for unknown posting");
                    0
                }
            },
            WebhookEvent::Ignored { event_type } => {
                tracing::info!(partner = %integration.partner, event_type, "ignoring webhook event");
                0
            }
        };
        tracing::info!(
            partner = %integration.partner,
            event = event.kind(),
            records_updated,
            "partner webhook processed"
        );
        Ok(outcome(event, records_updated))
    }

    /// Accepts pushed funding rounds (stored now) or job-posting requests
    /// (queued ahead of scheduled work).
    ///
    /// # Errors
    ///
    /// Returns an authentication error when a signals secret is configured
    /// and the signature is missing or wrong, [`WebhookError::InvalidPayload`]
    /// for non-JSON bodies, and [`WebhookError::UnknownSignalType`] when the
    /// body is neither kind.
    pub async fn process_signal_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        source: Option<&str>,
    ) -> Result<SignalWebhookOutcome, WebhookError> {
        if let Some(secret) = self.secrets.signals.as_deref() {
            let signature = signature
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(WebhookError::MissingSignature)?;
            if !verify_signature(payload, signature, secret) {
                tracing::warn!("rejected signal webhook with invalid signature");
                return Err(WebhookError::InvalidSignature);
            }
        }

        let body: Value = serde_json::from_slice(payload)
            .map_err(|err| WebhookError::InvalidPayload(err.to_string()))?;
        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SIGNAL_SOURCE);

        if let Some(items) = funding_items(&body) {
            let received = items.len();
            let mut stored = 0;
            for item in items {
                let Some(signal) = funding_signal(item, source) else {
                    continue;
                };
                if self.store.insert_signal_if_new(&signal).await?.is_some() {
                    stored += 1;
                }
            }
            tracing::info!(source, received, stored, "funding webhook processed");
            return Ok(SignalWebhookOutcome::Funding { received, stored });
        }

        if let Some(filters) = job_posting_filters(&body) {
            let job_id = self
                .queue
                .enqueue_ingest(&IngestJobPayload {
                    filters,
                    sources: None,
                    origin: JobOrigin::Webhook,
                })
                .await?;
            tracing::info!(source, job_id, "job posting webhook queued");
            return Ok(SignalWebhookOutcome::JobPostingQueued { job_id });
        }

        Err(WebhookError::UnknownSignalType)
    }
}

fn outcome(event: &WebhookEvent, records_updated: u64) -> PartnerWebhookOutcome {
    PartnerWebhookOutcome {
        event: event.kind().to_string(),
        records_updated,
    }
}

fn is_type(value: &Value, wanted: &str) -> bool {
    value.get("type").and_then(Value::as_str) == Some(wanted)
}

/// Funding entries in a pushed body: matching array items, or an object of
/// type `funding` with its `items` (or itself as the single entry).
fn funding_items(body: &Value) -> Option<Vec<&Value>> {
    match body {
        Value::Array(items) => {
            let funding: Vec<&Value> = items
                .iter()
                .filter(|item| is_type(item, "funding") || item.get("funding_amount").is_some())
                .collect();
            (!funding.is_empty()).then_some(funding)
        }
        Value::Object(_) if is_type(body, "funding") => match body.get("items") {
            Some(Value::Array(items)) => Some(items.iter().collect()),
            _ => Some(vec![body]),
        },
        _ => None,
    }
}

fn funding_signal(item: &Value, default_source: &str) -> Option<NewSignal> {
    let str_field = |name: &str| {
        item.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let company = str_field("company_name").or_else(|| str_field("company"))?;
    let now = Utc::now();
    // Undated rounds are keyed on the day they arrive so same-day repeats dedupe.
    let posted_date = str_field("date")
        .and_then(|d| parse_posted_date(d, now))
        .unwrap_or_else(|| now.date_naive().and_time(NaiveTime::MIN).and_utc());
    Some(NewSignal {
        signal_type: SignalType::FundingAnnouncement,
        source: str_field("source").unwrap_or(default_source).to_string(),
        title: str_field("title").map(String::from),
        company_name: company.to_string(),
        company_url: str_field("company_url").map(String::from),
        job_url: None,
        location: str_field("location").map(String::from),
        posted_date: Some(posted_date),
        raw_data: item.clone(),
    })
}

fn job_posting_filters(body: &Value) -> Option<IngestFilters> {
    let job_title = body.get("job_title").and_then(Value::as_str);
    if !is_type(body, "job_posting") && job_title.is_none() {
        return None;
    }
    let mut keywords: Vec<String> = body
        .get("keywords")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    if keywords.is_empty() {
        keywords.extend(job_title.map(String::from));
    }
    let days_back = body
        .get("days_back")
        .or_else(|| body.get("daysBack"))
        .and_then(Value::as_u64)
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or(DEFAULT_WEBHOOK_DAYS_BACK);
    Some(IngestFilters {
        keywords,
        location: body
            .get("location")
            .and_then(Value::as_str)
            .map(String::from),
        days_back: Some(days_back),
    })
}
