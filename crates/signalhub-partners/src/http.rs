//! HTTP plumbing shared by the partner clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use signalhub_core::PartnerKind;

use crate::error::PartnerError;
use crate::retry::RetryPolicy;

/// Timeout, user agent and retry schedule for partner API calls.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "signalhub/0.1 (signal-ingestion)".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

pub(crate) fn build_client(settings: &ClientSettings) -> Result<Client, PartnerError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(settings.user_agent.as_str())
        .build()?)
}

/// Parses `base_url`, forcing a trailing slash so endpoint segments append.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, PartnerError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| PartnerError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

/// `base` with `segments` appended as escaped path segments.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, PartnerError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| PartnerError::InvalidBaseUrl {
            url: base.to_string(),
            reason: "URL cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends `request` and parses the JSON body. An empty body yields `Null`.
pub(crate) async fn execute(
    partner: PartnerKind,
    request: RequestBuilder,
    path: &str,
) -> Result<serde_json::Value, PartnerError> {
    let response = request.send().await.map_err(reqwest::Error::without_url)?;
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(PartnerError::Unauthorized { partner });
    }
    if !status.is_success() {
        return Err(PartnerError::UnexpectedStatus {
            partner,
            status: status.as_u16(),
            path: path.to_string(),
        });
    }

    let bytes = response.bytes().await.map_err(reqwest::Error::without_url)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| PartnerError::Deserialize {
        context: format!("{partner} {path}"),
        source: e,
    })
}

/// Partner ids arrive as strings or numbers.
pub(crate) fn id_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_escapes_ids_and_keeps_base_path() {
        let base = parse_base_url("https://api.linkedin.com/v2").unwrap();
        let url = endpoint(&base, &["jobPostings", "urn:li:job/1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.linkedin.com/v2/jobPostings/urn:li:job%2F1"
        );
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        assert_eq!(id_string(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(id_string(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(id_string(Some(&json!(""))), None);
        assert_eq!(id_string(None), None);
    }
}
