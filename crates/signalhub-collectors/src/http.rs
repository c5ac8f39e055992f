//! Shared HTTP plumbing for the collectors.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};

use crate::error::CollectorError;

/// Timeout and user agent shared by every collector.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "signalhub/0.1 (signal-ingestion)".to_string(),
        }
    }
}

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client, CollectorError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(settings.user_agent.as_str())
        .build()?)
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, CollectorError> {
    Url::parse(base_url).map_err(|e| CollectorError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

/// Map non-2xx statuses to collector errors.
pub(crate) fn check_status(
    source: &str,
    url: &Url,
    status: StatusCode,
) -> Result<(), CollectorError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CollectorError::RateLimited {
            source_name: source.to_string(),
        });
    }
    if !status.is_success() {
        return Err(CollectorError::UnexpectedStatus {
            status: status.as_u16(),
            url: redact_query(url),
        });
    }
    Ok(())
}

/// Sends a GET and parses the body as JSON.
pub(crate) async fn get_json(
    client: &Client,
    source: &str,
    url: Url,
) -> Result<serde_json::Value, CollectorError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(reqwest::Error::without_url)?;
    check_status(source, &url, response.status())?;
    let bytes = response.bytes().await.map_err(reqwest::Error::without_url)?;
    serde_json::from_slice(&bytes).map_err(|e| CollectorError::Deserialize {
        context: format!("{source} response"),
        source: e,
    })
}

/// Sends a GET and returns the raw body.
pub(crate) async fn get_bytes(
    client: &Client,
    source: &str,
    url: Url,
) -> Result<Vec<u8>, CollectorError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(reqwest::Error::without_url)?;
    check_status(source, &url, response.status())?;
    let bytes = response.bytes().await.map_err(reqwest::Error::without_url)?;
    Ok(bytes.to_vec())
}

/// URL without its query string, so API keys never reach logs or errors.
fn redact_query(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
