use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("feed parse error for {url}: {reason}")]
    Feed { url: String, reason: String },

    #[error("rate limited by {source_name}")]
    RateLimited { source_name: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CollectorError {
    /// Transient failures worth another attempt on the next scheduled run.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            CollectorError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            CollectorError::RateLimited { .. } => true,
            CollectorError::UnexpectedStatus { status, .. } => *status >= 500,
            CollectorError::Deserialize { .. }
            | CollectorError::Feed { .. }
            | CollectorError::InvalidBaseUrl { .. } => false,
        }
    }
}
