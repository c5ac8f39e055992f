//! Registering partner integrations. Credentials are write-only: listings
//! report which ones are present, never their values.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use signalhub_core::{IntegrationStatus, PartnerCredentials, PartnerIntegration, PartnerKind};
use signalhub_db::{PartnerStore, Store};

use crate::error::{IntegrationValidationError, PipelineError};

/// Credentials and status for one partner. Registering a partner that
/// already has an integration replaces its credentials and status.
#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub partner: PartnerKind,
    pub status: IntegrationStatus,
    pub credentials: PartnerCredentials,
    pub webhook_secret: Option<String>,
}

impl NewIntegration {
    /// A `PENDING` integration with no credentials yet.
    #[must_use]
    pub fn pending(partner: PartnerKind) -> Self {
        Self {
            partner,
            status: IntegrationStatus::Pending,
            credentials: PartnerCredentials::default(),
            webhook_secret: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`IntegrationValidationError::MissingCredentials`] unless an
    /// access token or API key is present.
    pub fn validate(&self) -> Result<(), IntegrationValidationError> {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        if present(&self.credentials.access_token) || present(&self.credentials.api_key) {
            Ok(())
        } else {
            Err(IntegrationValidationError::MissingCredentials(self.partner))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: i64,
    pub partner: PartnerKind,
    pub status: IntegrationStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub job_posting_count: i64,
    pub has_access_token: bool,
    pub has_api_key: bool,
    pub has_webhook_secret: bool,
}

impl IntegrationSummary {
    fn new(integration: &PartnerIntegration, job_posting_count: i64) -> Self {
        Self {
            id: integration.id,
            partner: integration.partner,
            status: integration.status,
            last_sync_at: integration.last_sync_at,
            created_at: integration.created_at,
            updated_at: integration.updated_at,
            job_posting_count,
            has_access_token: integration.credentials.access_token.is_some(),
            has_api_key: integration.credentials.api_key.is_some(),
            has_webhook_secret: integration.webhook_secret.is_some(),
        }
    }
}

#[derive(Clone)]
pub struct IntegrationRegistry {
    store: Arc<dyn Store>,
}

impl IntegrationRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validates and stores `request`, returning the saved integration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidIntegration`] when credentials are
    /// missing and [`PipelineError::Db`] when the store fails.
    pub async fn register(
        &self,
        request: &NewIntegration,
    ) -> Result<PartnerIntegration, PipelineError> {
        request.validate()?;
        let integration = self
            .store
            .upsert_integration(
                request.partner,
                request.status,
                &request.credentials,
                request.webhook_secret.as_deref(),
            )
            .await?;
        tracing::info!(
            integration_id = integration.id,
            partner = %integration.partner,
            status = %integration.status,
            "partner integration registered"
        );
        Ok(integration)
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] when the store fails.
    pub async fn list(
        &self,
        partner: Option<PartnerKind>,
    ) -> Result<Vec<IntegrationSummary>, PipelineError> {
        let integrations = self.store.list_integrations(partner).await?;
        let mut summaries = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            let postings = self.store.count_job_postings(integration.id).await?;
            summaries.push(IntegrationSummary::new(integration, postings));
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }
}
