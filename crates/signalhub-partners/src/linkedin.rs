//! LinkedIn Talent API client (OAuth 2.0 bearer tokens).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use signalhub_core::{
    IngestFilters, PartnerCredentials, PartnerJobStatus, PartnerKind, RawPosting,
};
use tokio::sync::RwLock;

use crate::error::PartnerError;
use crate::http::{build_client, endpoint, execute, id_string, parse_base_url, ClientSettings};
use crate::retry::{with_partner_retry, RetryPolicy};
use crate::signature::payload_digest;
use crate::{
    parse_timestamp, JobPostingData, JobPostingUpdate, PartnerClient, PartnerJob, PostedJob,
    WebhookEvent,
};

pub(crate) const DEFAULT_API_BASE: &str = "https://api.linkedin.com/v2/";
pub(crate) const DEFAULT_AUTH_BASE: &str = "https://www.linkedin.com/oauth/v2/";
const SOURCE: &str = "linkedin";
const SEARCH_PAGE_SIZE: &str = "25";

/// Maps LinkedIn's uppercase posting states; unknown values read as posted.
#[must_use]
pub fn map_linkedin_job_status(status: &str) -> PartnerJobStatus {
    match status {
        "PAUSED" => PartnerJobStatus::Paused,
        "CLOSED" => PartnerJobStatus::Closed,
        "DELETED" => PartnerJobStatus::Deleted,
        "EXPIRED" => PartnerJobStatus::Expired,
        "DRAFT" => PartnerJobStatus::Draft,
        _ => PartnerJobStatus::Posted,
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    elements: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchElement {
    title: Option<String>,
    company_details: Option<CompanyDetails>,
    formatted_location: Option<String>,
    job_posting_url: Option<String>,
    listed_at: Option<i64>,
    description: Option<TextBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct CompanyDetails {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TextBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

pub struct LinkedInClient {
    client: Client,
    api_base: Url,
    auth_base: Url,
    retry: RetryPolicy,
    credentials: RwLock<PartnerCredentials>,
    refreshed: AtomicBool,
}

impl LinkedInClient {
    /// # Errors
    ///
    /// Returns [`PartnerError::Http`] if the HTTP client cannot be built.
    pub fn new(
        credentials: PartnerCredentials,
        settings: &ClientSettings,
    ) -> Result<Self, PartnerError> {
        Self::with_base_urls(credentials, settings, DEFAULT_API_BASE, DEFAULT_AUTH_BASE)
    }

    /// # Errors
    ///
    /// Returns [`PartnerError::InvalidBaseUrl`] if either URL does not parse.
    pub fn with_base_urls(
        credentials: PartnerCredentials,
        settings: &ClientSettings,
        api_base: &str,
        auth_base: &str,
    ) -> Result<Self, PartnerError> {
        Ok(Self {
            client: build_client(settings)?,
            api_base: parse_base_url(api_base)?,
            auth_base: parse_base_url(auth_base)?,
            retry: settings.retry,
            credentials: RwLock::new(credentials),
            refreshed: AtomicBool::new(false),
        })
    }

    async fn bearer(&self) -> Result<String, PartnerError> {
        self.credentials
            .read()
            .await
            .access_token
            .clone()
            .ok_or(PartnerError::MissingCredentials {
                partner: PartnerKind::LinkedIn,
                field: "access token",
            })
    }

    async fn send_once(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, PartnerError> {
        let url = endpoint(&self.api_base, segments)?;
        let path = url.path().to_string();
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(self.bearer().await?)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        execute(PartnerKind::LinkedIn, request, &path).await
    }

    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, PartnerError> {
        with_partner_retry(
            self.retry,
            || self.refresh_access_token(),
            || self.send_once(method.clone(), segments, query, body),
        )
        .await
    }

    /// Exchanges the refresh token for a new access token. Returns `false`
    /// when the integration has nothing to refresh with.
    async fn refresh_access_token(&self) -> Result<bool, PartnerError> {
        let current = self.credentials.read().await.clone();
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            current.refresh_token,
            current.client_id,
            current.client_secret,
        ) else {
            tracing::warn!(
                partner = %PartnerKind::LinkedIn,
                "cannot refresh token: refresh token or client credentials missing"
            );
            return Ok(false);
        };

        let url = endpoint(&self.auth_base, &["accessToken"])?;
        let request = self.client.post(url).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ]);
        let body = execute(PartnerKind::LinkedIn, request, "/oauth/v2/accessToken").await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| PartnerError::Deserialize {
                context: "linkedin accessToken".to_string(),
                source: e,
            })?;

        let mut credentials = self.credentials.write().await;
        credentials.access_token = Some(token.access_token);
        if let Some(rotated) = token.refresh_token {
            credentials.refresh_token = Some(rotated);
        }
        self.refreshed.store(true, Ordering::SeqCst);
        Ok(true)
    }
}

fn to_partner_job(value: Value, fallback_location: Option<&str>) -> Option<PartnerJob> {
    let element: SearchElement = serde_json::from_value(value.clone()).unwrap_or_default();
    let job_url = element.job_posting_url.filter(|u| !u.is_empty());
    let partner_job_id = id_string(value.get("id")).or_else(|| job_url.clone())?;
    let title = element.title.filter(|t| !t.trim().is_empty())?;

    Some(PartnerJob {
        partner_job_id,
        posting: RawPosting {
            source: SOURCE.to_string(),
            title,
            company_name: element
                .company_details
                .and_then(|c| c.name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            company_url: None,
            job_url,
            location: element
                .formatted_location
                .or_else(|| fallback_location.map(ToString::to_string)),
            posted_date: element.listed_at.and_then(DateTime::<Utc>::from_timestamp_millis),
            description: element.description.and_then(|d| d.text),
            raw: value,
        },
    })
}

/// `"City, State, Country"` split into (city, country).
fn split_location(location: Option<&str>) -> (String, String) {
    let Some(location) = location.filter(|l| !l.trim().is_empty()) else {
        return (String::new(), "US".to_string());
    };
    let parts: Vec<&str> = location.split(',').map(str::trim).collect();
    let city = parts.first().copied().unwrap_or_default().to_string();
    let country = parts
        .last()
        .copied()
        .filter(|c| !c.is_empty())
        .unwrap_or("US")
        .to_string();
    (city, country)
}

fn location_json(location: Option<&str>) -> Value {
    let (city, country) = split_location(location);
    json!({ "country": country, "city": city })
}

fn require_str(event: &Value, field: &str) -> Result<String, PartnerError> {
    id_string(event.get(field))
        .ok_or_else(|| PartnerError::InvalidWebhook(format!("linkedin event missing {field}")))
}

#[async_trait]
impl PartnerClient for LinkedInClient {
    fn kind(&self) -> PartnerKind {
        PartnerKind::LinkedIn
    }

    async fn search_jobs(&self, filters: &IngestFilters) -> Result<Vec<PartnerJob>, PartnerError> {
        let query = [
            ("keywords", filters.keywords.join(" ")),
            ("location", filters.location.clone().unwrap_or_default()),
            ("count", SEARCH_PAGE_SIZE.to_string()),
            ("start", "0".to_string()),
        ];
        let body = self.call(Method::GET, &["jobSearch"], &query, None).await?;
        let response: SearchResponse =
            serde_json::from_value(body).map_err(|e| PartnerError::Deserialize {
                context: "linkedin jobSearch".to_string(),
                source: e,
            })?;

        let jobs: Vec<PartnerJob> = response
            .elements
            .into_iter()
            .filter_map(|element| to_partner_job(element, filters.location.as_deref()))
            .collect();
        tracing::info!(partner = SOURCE, count = jobs.len(), "LinkedIn job search completed");
        Ok(jobs)
    }

    async fn post_job(&self, job: &JobPostingData) -> Result<PostedJob, PartnerError> {
        let payload = json!({
            "postingDetails": {
                "title": job.title,
                "description": { "text": job.description.clone().unwrap_or_default() },
                "companyDetails": { "name": job.company },
                "location": location_json(job.location.as_deref()),
            },
            "visibility": { "visibilityType": "PUBLIC" },
        });
        let body = self
            .call(Method::POST, &["jobPostings"], &[], Some(&payload))
            .await?;
        let partner_job_id = id_string(body.get("id")).ok_or_else(|| {
            PartnerError::InvalidResponse("linkedin jobPostings response missing id".to_string())
        })?;
        let url = body
            .get("jobPostingUrl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        tracing::info!(partner = SOURCE, partner_job_id = %partner_job_id, title = %job.title, "job posted");
        Ok(PostedJob {
            partner_job_id,
            url,
        })
    }

    async fn update_job(
        &self,
        partner_job_id: &str,
        update: &JobPostingUpdate,
    ) -> Result<(), PartnerError> {
        let mut payload = serde_json::Map::new();
        if let Some(title) = &update.title {
            payload.insert("postingDetails.title".to_string(), json!(title));
        }
        if let Some(description) = &update.description {
            payload.insert(
                "postingDetails.description.text".to_string(),
                json!(description),
            );
        }
        if let Some(location) = &update.location {
            payload.insert(
                "postingDetails.location".to_string(),
                location_json(Some(location)),
            );
        }
        let payload = Value::Object(payload);
        self.call(
            Method::PATCH,
            &["jobPostings", partner_job_id],
            &[],
            Some(&payload),
        )
        .await?;
        tracing::info!(partner = SOURCE, partner_job_id, "job updated");
        Ok(())
    }

    async fn delete_job(&self, partner_job_id: &str) -> Result<(), PartnerError> {
        self.call(Method::DELETE, &["jobPostings", partner_job_id], &[], None)
            .await?;
        tracing::info!(partner = SOURCE, partner_job_id, "job deleted");
        Ok(())
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PartnerError> {
        let event: Value = serde_json::from_slice(payload)
            .map_err(|e| PartnerError::InvalidWebhook(e.to_string()))?;
        let event_type = event
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match event_type {
            "JOB_APPLICATION" => Ok(WebhookEvent::ApplicationReceived {
                partner_job_id: require_str(&event, "jobId")?,
                partner_application_id: id_string(event.get("applicationId"))
                    .unwrap_or_else(|| payload_digest(payload)),
                candidate_name: event
                    .pointer("/applicant/name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                candidate_email: event
                    .pointer("/applicant/email")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                applied_at: event
                    .get("appliedAt")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp),
            }),
            "JOB_STATUS_CHANGE" => Ok(WebhookEvent::JobStatusChanged {
                partner_job_id: require_str(&event, "jobId")?,
                status: map_linkedin_job_status(
                    event.get("status").and_then(Value::as_str).unwrap_or_default(),
                ),
            }),
            other => Ok(WebhookEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }

    async fn take_refreshed_credentials(&self) -> Option<PartnerCredentials> {
        if self.refreshed.swap(false, Ordering::SeqCst) {
            Some(self.credentials.read().await.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LinkedInClient {
        LinkedInClient::new(PartnerCredentials::default(), &ClientSettings::default()).unwrap()
    }

    #[test]
    fn status_mapping_defaults_to_posted() {
        assert_eq!(map_linkedin_job_status("ACTIVE"), PartnerJobStatus::Posted);
        assert_eq!(map_linkedin_job_status("CLOSED"), PartnerJobStatus::Closed);
        assert_eq!(map_linkedin_job_status("closed"), PartnerJobStatus::Posted);
        assert_eq!(map_linkedin_job_status("ARCHIVED"), PartnerJobStatus::Posted);
    }

    #[test]
    fn splits_city_and_country() {
        assert_eq!(
            split_location(Some("São Paulo, SP, Brazil")),
            ("São Paulo".to_string(), "Brazil".to_string())
        );
        assert_eq!(split_location(None), (String::new(), "US".to_string()));
    }

    #[test]
    fn search_elements_need_a_title_and_an_identifier() {
        let full = json!({
            "id": 77,
            "title": "VP Engineering",
            "companyDetails": { "name": "Acme" },
            "listedAt": 1_772_000_000_000_i64
        });
        let job = to_partner_job(full, Some("Brazil")).unwrap();
        assert_eq!(job.partner_job_id, "77");
        assert_eq!(job.posting.location.as_deref(), Some("Brazil"));
        assert!(job.posting.posted_date.is_some());

        assert!(to_partner_job(json!({ "title": "No id" }), None).is_none());
        assert!(to_partner_job(json!({ "id": 1 }), None).is_none());
    }

    #[test]
    fn parses_application_and_status_events() {
        let client = client();
        let application = client
            .parse_webhook_event(br#"{"eventType":"JOB_APPLICATION","jobId":"j1","applicationId":"a1","applicant":{"name":"Ana"}}"#)
            .unwrap();
        assert_eq!(
            application,
            WebhookEvent::ApplicationReceived {
                partner_job_id: "j1".to_string(),
                partner_application_id: "a1".to_string(),
                candidate_name: Some("Ana".to_string()),
                candidate_email: None,
                applied_at: None,
            }
        );

        let status = client
            .parse_webhook_event(br#"{"eventType":"JOB_STATUS_CHANGE","jobId":"j1","status":"EXPIRED"}"#)
            .unwrap();
        assert_eq!(
            status,
            WebhookEvent::JobStatusChanged {
                partner_job_id: "j1".to_string(),
                status: PartnerJobStatus::Expired,
            }
        );
    }

    #[test]
    fn application_without_id_gets_a_stable_digest() {
        let client = client();
        let body = br#"{"eventType":"JOB_APPLICATION","jobId":"j1"}"#;
        let first = client.parse_webhook_event(body).unwrap();
        let second = client.parse_webhook_event(body).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_events_are_ignored_and_garbage_is_rejected() {
        let client = client();
        assert_eq!(
            client.parse_webhook_event(br#"{"eventType":"PROFILE_VIEW"}"#).unwrap(),
            WebhookEvent::Ignored {
                event_type: "PROFILE_VIEW".to_string()
            }
        );
        assert!(client.parse_webhook_event(b"not json").is_err());
        assert!(client
            .parse_webhook_event(br#"{"eventType":"JOB_STATUS_CHANGE"}"#)
            .is_err());
    }
}
