use signalhub_collectors::CollectorError;
use signalhub_core::PartnerKind;
use signalhub_db::DbError;
use signalhub_partners::PartnerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Partner(#[from] PartnerError),

    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Validation(#[from] IngestValidationError),

    #[error(transparent)]
    InvalidIntegration(#[from] IntegrationValidationError),

    #[error("source {source_name} timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("no handler registered for job kind {0:?}")]
    UnknownJobKind(String),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("bucket {0} not found")]
    BucketNotFound(i64),

    #[error("enrichment failed for signal {signal_id}: {reason}")]
    Enrichment { signal_id: i64, reason: String },
}

/// A malformed ingestion request. Rejected before anything is queued or stored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestValidationError {
    #[error("unknown source {0:?}")]
    UnknownSource(String),

    #[error("unknown signal type {0:?}")]
    UnknownSignalType(String),

    #[error("days_back must be between 1 and {max}, got {value}")]
    DaysBackOutOfRange { value: u32, max: u32 },

    #[error("minAmount must be a non-negative number")]
    NegativeMinAmount,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrationValidationError {
    #[error("{0} integration needs an access token or an API key")]
    MissingCredentials(PartnerKind),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no active {0} integration")]
    NoActiveIntegration(PartnerKind),

    #[error("no webhook secret configured for {0}")]
    MissingSecret(PartnerKind),

    #[error("missing webhook signature")]
    MissingSignature,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("unknown signal type")]
    UnknownSignalType,

    #[error(transparent)]
    Partner(#[from] PartnerError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl WebhookError {
    /// Signature problems. Never retried and never processed further.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSecret(_)
                | WebhookError::MissingSignature
                | WebhookError::InvalidSignature
        )
    }

    /// Problems with the request itself rather than with this service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            WebhookError::InvalidPayload(_) | WebhookError::UnknownSignalType => true,
            WebhookError::Partner(PartnerError::InvalidWebhook(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_are_authentication_errors() {
        assert!(WebhookError::InvalidSignature.is_authentication());
        assert!(WebhookError::MissingSignature.is_authentication());
        assert!(WebhookError::MissingSecret(PartnerKind::Indeed).is_authentication());
        assert!(!WebhookError::UnknownSignalType.is_authentication());
    }

    #[test]
    fn malformed_partner_events_are_client_errors() {
        let err = WebhookError::Partner(PartnerError::InvalidWebhook("no jobId".to_string()));
        assert!(err.is_client_error());
        assert!(!WebhookError::NoActiveIntegration(PartnerKind::LinkedIn).is_client_error());
    }
}
