//! Indeed partner API client (API key plus partner id header).

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use signalhub_core::{
    ApplicationStatus, IngestFilters, PartnerCredentials, PartnerJobStatus, PartnerKind,
    RawPosting,
};

use crate::error::PartnerError;
use crate::http::{build_client, endpoint, execute, id_string, parse_base_url, ClientSettings};
use crate::retry::{with_partner_retry, RetryPolicy};
use crate::signature::payload_digest;
use crate::{
    parse_timestamp, JobPostingData, JobPostingUpdate, PartnerClient, PartnerJob, PostedJob,
    WebhookEvent,
};

pub(crate) const DEFAULT_API_BASE: &str = "https://ads.indeed.com/";
const VIEW_JOB_URL: &str = "https://www.indeed.com/viewjob?jk=";
const SOURCE: &str = "indeed";
const DEFAULT_DAYS_BACK: u32 = 30;

#[must_use]
pub fn map_indeed_job_status(status: &str) -> PartnerJobStatus {
    match status.to_ascii_lowercase().as_str() {
        "paused" => PartnerJobStatus::Paused,
        "closed" => PartnerJobStatus::Closed,
        "deleted" => PartnerJobStatus::Deleted,
        "expired" => PartnerJobStatus::Expired,
        "draft" => PartnerJobStatus::Draft,
        _ => PartnerJobStatus::Posted,
    }
}

#[must_use]
pub fn map_indeed_application_status(status: &str) -> ApplicationStatus {
    match status.to_ascii_lowercase().as_str() {
        "reviewing" => ApplicationStatus::Reviewing,
        "screening" => ApplicationStatus::Screening,
        "interviewing" => ApplicationStatus::Interviewing,
        "offered" => ApplicationStatus::Offered,
        "accepted" => ApplicationStatus::Accepted,
        "rejected" => ApplicationStatus::Rejected,
        "withdrawn" => ApplicationStatus::Withdrawn,
        _ => ApplicationStatus::Applied,
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    jobkey: Option<String>,
    jobtitle: Option<String>,
    company: Option<String>,
    formatted_location: Option<String>,
    location: Option<String>,
    url: Option<String>,
    date: Option<String>,
    snippet: Option<String>,
}

pub struct IndeedClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    credentials: PartnerCredentials,
}

impl IndeedClient {
    /// # Errors
    ///
    /// Returns [`PartnerError::Http`] if the HTTP client cannot be built.
    pub fn new(
        credentials: PartnerCredentials,
        settings: &ClientSettings,
    ) -> Result<Self, PartnerError> {
        Self::with_base_url(credentials, settings, DEFAULT_API_BASE)
    }

    /// # Errors
    ///
    /// Returns [`PartnerError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        credentials: PartnerCredentials,
        settings: &ClientSettings,
        base_url: &str,
    ) -> Result<Self, PartnerError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: parse_base_url(base_url)?,
            retry: settings.retry,
            credentials,
        })
    }

    async fn send_once(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, PartnerError> {
        let api_key = self
            .credentials
            .api_key
            .as_deref()
            .ok_or(PartnerError::MissingCredentials {
                partner: PartnerKind::Indeed,
                field: "API key",
            })?;
        let url = endpoint(&self.base_url, segments)?;
        let path = url.path().to_string();
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(api_key)
            .header(
                "X-Indeed-Partner-ID",
                self.credentials.partner_id.as_deref().unwrap_or_default(),
            )
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        execute(PartnerKind::Indeed, request, &path).await
    }

    /// API keys do not refresh, so a 401 is final.
    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, PartnerError> {
        with_partner_retry(
            self.retry,
            || async { Ok(false) },
            || self.send_once(method.clone(), segments, query, body),
        )
        .await
    }
}

fn to_partner_job(value: Value, fallback_location: Option<&str>) -> Option<PartnerJob> {
    let result: SearchResult = serde_json::from_value(value.clone()).unwrap_or_default();
    let jobkey = result.jobkey.filter(|k| !k.trim().is_empty());
    let job_url = result
        .url
        .filter(|u| !u.is_empty())
        .or_else(|| jobkey.as_ref().map(|k| format!("{VIEW_JOB_URL}{k}")));
    let partner_job_id = jobkey.or_else(|| job_url.clone())?;
    let title = result.jobtitle.filter(|t| !t.trim().is_empty())?;

    Some(PartnerJob {
        partner_job_id,
        posting: RawPosting {
            source: SOURCE.to_string(),
            title,
            company_name: result
                .company
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            company_url: None,
            job_url,
            location: result
                .formatted_location
                .or(result.location)
                .or_else(|| fallback_location.map(ToString::to_string)),
            posted_date: result.date.as_deref().and_then(parse_timestamp),
            description: result.snippet,
            raw: value,
        },
    })
}

fn require_str(event: &Value, field: &str) -> Result<String, PartnerError> {
    id_string(event.get(field))
        .ok_or_else(|| PartnerError::InvalidWebhook(format!("indeed event missing {field}")))
}

fn status_field(event: &Value) -> &str {
    event.get("status").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl PartnerClient for IndeedClient {
    fn kind(&self) -> PartnerKind {
        PartnerKind::Indeed
    }

    async fn search_jobs(&self, filters: &IngestFilters) -> Result<Vec<PartnerJob>, PartnerError> {
        let query = [
            ("q", filters.keywords.join(" ")),
            ("l", filters.location.clone().unwrap_or_default()),
            ("limit", "25".to_string()),
            (
                "fromage",
                filters.days_back.unwrap_or(DEFAULT_DAYS_BACK).to_string(),
            ),
        ];
        let body = self
            .call(Method::GET, &["api", "v1", "jobs", "search"], &query, None)
            .await?;
        let response: SearchResponse =
            serde_json::from_value(body).map_err(|e| PartnerError::Deserialize {
                context: "indeed jobs/search".to_string(),
                source: e,
            })?;

        let jobs: Vec<PartnerJob> = response
            .results
            .into_iter()
            .filter_map(|result| to_partner_job(result, filters.location.as_deref()))
            .collect();
        tracing::info!(partner = SOURCE, count = jobs.len(), "Indeed job search completed");
        Ok(jobs)
    }

    async fn post_job(&self, job: &JobPostingData) -> Result<PostedJob, PartnerError> {
        let payload = json!({
            "title": job.title,
            "description": job.description.clone().unwrap_or_default(),
            "company": job.company,
            "location": job.location.clone().unwrap_or_default(),
            "jobType": "FULLTIME",
        });
        let body = self
            .call(Method::POST, &["api", "v1", "jobs"], &[], Some(&payload))
            .await?;
        let partner_job_id = id_string(body.get("jobId"))
            .or_else(|| id_string(body.get("id")))
            .ok_or_else(|| {
                PartnerError::InvalidResponse("indeed jobs response missing jobId".to_string())
            })?;
        let url = body
            .get("url")
            .and_then(Value::as_str)
            .map_or_else(|| format!("{VIEW_JOB_URL}{partner_job_id}"), ToString::to_string);

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
            payload.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &update.description {
            payload.insert("description".to_string(), json!(description));
        }
        if let Some(location) = &update.location {
            payload.insert("location".to_string(), json!(location));
        }
        let payload = Value::Object(payload);
        self.call(
            Method::PATCH,
            &["api", "v1", "jobs", partner_job_id],
            &[],
            Some(&payload),
        )
        .await?;
        tracing::info!(partner = SOURCE, partner_job_id, "job updated");
        Ok(())
    }

    async fn delete_job(&self, partner_job_id: &str) -> Result<(), PartnerError> {
        self.call(
            Method::DELETE,
            &["api", "v1", "jobs", partner_job_id],
            &[],
            None,
        )
        .await?;
        tracing::info!(partner = SOURCE, partner_job_id, "job deleted");
        Ok(())
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<WebhookEvent, PartnerError> {
        let event: Value = serde_json::from_slice(payload)
            .map_err(|e| PartnerError::InvalidWebhook(e.to_string()))?;
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();

        match event_type {
            "application.received" => Ok(WebhookEvent::ApplicationReceived {
                partner_job_id: require_str(&event, "jobId")?,
                partner_application_id: id_string(event.get("applicationId"))
                    .unwrap_or_else(|| payload_digest(payload)),
                candidate_name: event
                    .pointer("/candidate/name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                candidate_email: event
                    .pointer("/candidate/email")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                applied_at: event
                    .get("appliedAt")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp),
            }),
            "application.status_changed" => Ok(WebhookEvent::ApplicationStatusChanged {
                partner_application_id: require_str(&event, "applicationId")?,
                status: map_indeed_application_status(status_field(&event)),
            }),
            "job.status_changed" => Ok(WebhookEvent::JobStatusChanged {
                partner_job_id: require_str(&event, "jobId")?,
                status: map_indeed_job_status(status_field(&event)),
            }),
            other => Ok(WebhookEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}
