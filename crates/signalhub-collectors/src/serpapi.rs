//! LinkedIn job search through the SerpAPI `linkedin_jobs` engine.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use signalhub_core::{IngestFilters, RawPosting};

use crate::dates::parse_posted_date;
use crate::error::CollectorError;
use crate::http::{build_client, get_json, parse_base_url, HttpSettings};
use crate::Collector;

const DEFAULT_BASE_URL: &str = "https://serpapi.com/search.json";
pub const SOURCE: &str = "serpapi";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs_results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JobResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    company_name: String,
    location: Option<String>,
    link: Option<String>,
    description: Option<String>,
    detected_extensions: Option<DetectedExtensions>,
}

#[derive(Debug, Deserialize)]
struct DetectedExtensions {
    posted_at: Option<String>,
}

pub struct SerpApiCollector {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
}

impl SerpApiCollector {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, settings: &HttpSettings) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, settings, DEFAULT_BASE_URL)
    }

    /// Points the collector at a mock server in tests.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: Option<String>,
        settings: &HttpSettings,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_client(settings)?,
            api_key,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn search_url(&self, api_key: &str, filters: &IngestFilters) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("engine", "linkedin_jobs")
            .append_pair("api_key", api_key)
            .append_pair("keywords", &filters.keywords.join(" "))
            .append_pair("location", filters.location.as_deref().unwrap_or_default())
            .append_pair("page", "1");
        url
    }
}

fn to_posting(value: serde_json::Value, fallback_location: Option<&str>) -> Option<RawPosting> {
    let job: JobResult = serde_json::from_value(value.clone()).ok()?;
    if job.title.trim().is_empty() || job.company_name.trim().is_empty() {
        return None;
    }
    let posted_date = job
        .detected_extensions
        .and_then(|ext| ext.posted_at)
        .and_then(|text| parse_posted_date(&text, Utc::now()));

    Some(RawPosting {
        source: SOURCE.to_string(),
        title: job.title.trim().to_string(),
        company_name: job.company_name.trim().to_string(),
        company_url: None,
        job_url: job.link.filter(|l| !l.is_empty()),
        location: job
            .location
            .or_else(|| fallback_location.map(ToString::to_string)),
        posted_date,
        description: job.description,
        raw: value,
    })
}

#[async_trait]
impl Collector for SerpApiCollector {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn collect(&self, filters: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!(source = SOURCE, "API key not configured; skipping");
            return Ok(Vec::new());
        };

        let body = get_json(&self.client, SOURCE, self.search_url(api_key, filters)).await?;
        let response: SearchResponse =
            serde_json::from_value(body).map_err(|e| CollectorError::Deserialize {
                context: "serpapi linkedin_jobs".to_string(),
                source: e,
            })?;

        let location = filters.location.as_deref();
        let postings: Vec<RawPosting> = response
            .jobs_results
            .into_iter()
            .filter_map(|job| to_posting(job, location))
            .collect();
        tracing::debug!(source = SOURCE, count = postings.len(), "collected postings");
        Ok(postings)
    }
}
