//! Clients for partner job platforms.
//!
//! Every partner implements [`PartnerClient`]; callers pick one through a
//! [`PartnerClientFactory`] keyed by the integration's [`PartnerKind`]. All
//! outbound calls go through [`with_partner_retry`].

mod error;
mod http;
mod indeed;
mod linkedin;
mod retry;
mod signature;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signalhub_core::{
    AppConfig, ApplicationStatus, IngestFilters, PartnerCredentials, PartnerIntegration,
    PartnerJobStatus, PartnerKind, RawPosting,
};

pub use error::PartnerError;
pub use http::ClientSettings;
pub use indeed::{map_indeed_application_status, map_indeed_job_status, IndeedClient};
pub use linkedin::{map_linkedin_job_status, LinkedInClient};
pub use retry::{with_partner_retry, RetryPolicy};
pub use signature::{sign_payload, verify_signature};

/// A job found on a partner platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PartnerJob {
    pub partner_job_id: String,
    pub posting: RawPosting,
}

/// Fields sent when publishing a job to a partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPostingData {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// Partial update; `None` fields are left untouched at the partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPostingUpdate {
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl JobPostingUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.location.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedJob {
    pub partner_job_id: String,
    pub url: String,
}

/// Normalised partner webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    ApplicationReceived {
        partner_job_id: String,
        partner_application_id: String,
        candidate_name: Option<String>,
        candidate_email: Option<String>,
        applied_at: Option<DateTime<Utc>>,
    },
    ApplicationStatusChanged {
        partner_application_id: String,
        status: ApplicationStatus,
    },
    JobStatusChanged {
        partner_job_id: String,
        status: PartnerJobStatus,
    },
    /// Event types with no handler. Acknowledged and logged only.
    Ignored { event_type: String },
}

impl WebhookEvent {
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::ApplicationReceived { .. } => "application_received",
            WebhookEvent::ApplicationStatusChanged { .. } => "application_status_changed",
            WebhookEvent::JobStatusChanged { .. } => "job_status_changed",
            WebhookEvent::Ignored { event_type } => event_type,
        }
    }
}

#[async_trait]
pub trait PartnerClient: Send + Sync {
    fn kind(&self) -> PartnerKind;

    async fn search_jobs(&self, filters: &IngestFilters) -> Result<Vec<PartnerJob>, PartnerError>;

    async fn post_job(&self, job: &JobPostingData) -> Result<PostedJob, PartnerError>;

    async fn update_job(
        &self,
        partner_job_id: &str,
        update: &JobPostingUpdate,
    ) -> Result<(), PartnerError>;

    async fn delete_job(&self, partner_job_id: &str) -> Result<(), PartnerError>;

    /// Decodes a verified webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`PartnerError::InvalidWebhook`] for bodies that are not JSON
    /// or lack the fields their event type needs.
    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PartnerError>;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        verify_signature(payload, signature, secret)
    }

    /// Credentials replaced by a token refresh since the last call, so the
    /// caller can persist them. Clients without refresh return `None`.
    async fn take_refreshed_credentials(&self) -> Option<PartnerCredentials> {
        None
    }
}

/// Resolves the client for an integration row.
pub trait PartnerClientFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PartnerError::Unsupported`] for partners without a client.
    fn client_for(
        &self,
        integration: &PartnerIntegration,
    ) -> Result<Arc<dyn PartnerClient>, PartnerError>;
}

/// Partner API locations; overridden in tests to point at a mock server.
#[derive(Debug, Clone)]
pub struct PartnerEndpoints {
    pub linkedin_api: String,
    pub linkedin_auth: String,
    pub indeed_api: String,
}

impl Default for PartnerEndpoints {
    fn default() -> Self {
        Self {
            linkedin_api: linkedin::DEFAULT_API_BASE.to_string(),
            linkedin_auth: linkedin::DEFAULT_AUTH_BASE.to_string(),
            indeed_api: indeed::DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Builds HTTP clients from stored credentials, filling app-level defaults
/// (OAuth client id/secret, Indeed partner id) the row does not carry.
#[derive(Debug, Clone, Default)]
pub struct HttpPartnerClientFactory {
    settings: ClientSettings,
    endpoints: PartnerEndpoints,
    defaults: PartnerCredentials,
}

impl HttpPartnerClientFactory {
    #[must_use]
    pub fn new(settings: ClientSettings, endpoints: PartnerEndpoints) -> Self {
        Self {
            settings,
            endpoints,
            defaults: PartnerCredentials::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let settings = ClientSettings {
            timeout_secs: config.collector_timeout_secs,
            user_agent: config.user_agent.clone(),
            retry: RetryPolicy::default(),
        };
        Self::new(settings, PartnerEndpoints::default()).with_defaults(PartnerCredentials {
            client_id: config.linkedin_client_id.clone(),
            client_secret: config.linkedin_client_secret.clone(),
            partner_id: config.indeed_partner_id.clone(),
            ..PartnerCredentials::default()
        })
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: PartnerCredentials) -> Self {
        self.defaults = defaults;
        self
    }

    fn merged(&self, stored: &PartnerCredentials) -> PartnerCredentials {
        let pick = |own: &Option<String>, fallback: &Option<String>| {
            own.clone().or_else(|| fallback.clone())
        };
        PartnerCredentials {
            access_token: stored.access_token.clone(),
            refresh_token: stored.refresh_token.clone(),
            client_id: pick(&stored.client_id, &self.defaults.client_id),
            client_secret: pick(&stored.client_secret, &self.defaults.client_secret),
            partner_id: pick(&stored.partner_id, &self.defaults.partner_id),
            api_key: pick(&stored.api_key, &self.defaults.api_key),
        }
    }
}

impl PartnerClientFactory for HttpPartnerClientFactory {
    fn client_for(
        &self,
        integration: &PartnerIntegration,
    ) -> Result<Arc<dyn PartnerClient>, PartnerError> {
        let credentials = self.merged(&integration.credentials);
        match integration.partner {
            PartnerKind::LinkedIn => Ok(Arc::new(LinkedInClient::with_base_urls(
                credentials,
                &self.settings,
                &self.endpoints.linkedin_api,
                &self.endpoints.linkedin_auth,
            )?)),
            PartnerKind::Indeed => Ok(Arc::new(IndeedClient::with_base_url(
                credentials,
                &self.settings,
                &self.endpoints.indeed_api,
            )?)),
            PartnerKind::Glassdoor => Err(PartnerError::Unsupported(PartnerKind::Glassdoor)),
        }
    }
}

/// Parses an RFC 3339 or RFC 2822 timestamp.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalhub_core::IntegrationStatus;

    fn integration(partner: PartnerKind) -> PartnerIntegration {
        PartnerIntegration {
            id: 1,
            partner,
            status: IntegrationStatus::Active,
            credentials: PartnerCredentials {
                client_id: Some("row-client".to_string()),
                ..PartnerCredentials::default()
            },
            webhook_secret: None,
            last_sync_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn factory_dispatches_by_partner_kind() {
        let factory = HttpPartnerClientFactory::default();
        let linkedin = factory
            .client_for(&integration(PartnerKind::LinkedIn))
            .unwrap();
        let indeed = factory.client_for(&integration(PartnerKind::Indeed)).unwrap();

        assert_eq!(linkedin.kind(), PartnerKind::LinkedIn);
        assert_eq!(indeed.kind(), PartnerKind::Indeed);
    }

    #[test]
    fn glassdoor_has_no_client() {
        let factory = HttpPartnerClientFactory::default();
        let err = factory
            .client_for(&integration(PartnerKind::Glassdoor))
            .err()
            .unwrap();
        assert!(matches!(err, PartnerError::Unsupported(PartnerKind::Glassdoor)));
    }

    #[test]
    fn stored_credentials_win_over_defaults() {
        let factory = HttpPartnerClientFactory::default().with_defaults(PartnerCredentials {
            client_id: Some("app-client".to_string()),
            client_secret: Some("app-secret".to_string()),
            ..PartnerCredentials::default()
        });
        let merged = factory.merged(&integration(PartnerKind::LinkedIn).credentials);

        assert_eq!(merged.client_id.as_deref(), Some("row-client"));
        assert_eq!(merged.client_secret.as_deref(), Some("app-secret"));
    }

    #[test]
    fn parses_both_timestamp_formats() {
        assert!(parse_timestamp("2026-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("Mon, 02 Mar 2026 10:00:00 GMT").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
