use signalhub_core::PartnerKind;
use thiserror::Error;

/// Errors returned by partner API clients.
#[derive(Debug, Error)]
pub enum PartnerError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The partner rejected the credentials (HTTP 401).
    #[error("{partner} rejected the request credentials")]
    Unauthorized { partner: PartnerKind },

    #[error("{partner} returned HTTP {status} for {path}")]
    UnexpectedStatus {
        partner: PartnerKind,
        status: u16,
        path: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{partner} integration is missing {field}")]
    MissingCredentials {
        partner: PartnerKind,
        field: &'static str,
    },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("no client available for partner {0}")]
    Unsupported(PartnerKind),

    #[error("malformed webhook payload: {0}")]
    InvalidWebhook(String),

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl PartnerError {
    /// Transient failures: network errors, 429 and 5xx. Other 4xx responses
    /// and malformed payloads will not improve on retry.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            PartnerError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            PartnerError::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            PartnerError::Unauthorized { .. }
            | PartnerError::Deserialize { .. }
            | PartnerError::MissingCredentials { .. }
            | PartnerError::InvalidBaseUrl { .. }
            | PartnerError::Unsupported(_)
            | PartnerError::InvalidWebhook(_)
            | PartnerError::InvalidResponse(_) => false,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PartnerError::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> PartnerError {
        PartnerError::UnexpectedStatus {
            partner: PartnerKind::Indeed,
            status,
            path: "/api/v1/jobs".to_string(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_retriable() {
        assert!(status(503).is_retriable());
        assert!(status(429).is_retriable());
    }

    #[test]
    fn client_errors_are_not_retriable() {
        assert!(!status(404).is_retriable());
        assert!(!status(422).is_retriable());
    }

    #[test]
    fn unauthorized_is_flagged_but_not_retriable() {
        let err = PartnerError::Unauthorized {
            partner: PartnerKind::LinkedIn,
        };
        assert!(err.is_unauthorized());
        assert!(!err.is_retriable());
    }
}
