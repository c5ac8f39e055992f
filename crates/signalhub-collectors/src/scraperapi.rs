//! LinkedIn job search pages fetched through the ScraperAPI proxy.
//!
//! ScraperAPI returns the rendered HTML of the public search page; job cards
//! are pulled out with the same class hooks LinkedIn uses for its guest view.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use reqwest::{Client, Url};
use signalhub_core::{IngestFilters, RawPosting};

use crate::dates::parse_relative_date;
use crate::error::CollectorError;
use crate::http::{build_client, get_bytes, parse_base_url, HttpSettings};
use crate::Collector;

const DEFAULT_BASE_URL: &str = "https://api.scraperapi.com/";
const LINKEDIN_SEARCH_URL: &str = "https://www.linkedin.com/jobs/search";
pub const SOURCE: &str = "scraperapi";

static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").expect("valid card regex"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<[^>]+>").expect("valid tag regex"));
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)href\s*=\s*["']([^"']+)["']"#).expect("valid href regex")
});

pub struct ScraperApiCollector {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
}

impl ScraperApiCollector {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, settings: &HttpSettings) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, settings, DEFAULT_BASE_URL)
    }

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

    fn proxy_url(&self, api_key: &str, filters: &IngestFilters) -> Url {
        let keywords = filters.keywords.join(" ");
        let location = filters.location.as_deref().unwrap_or_default();
        let target = format!(
            "{LINKEDIN_SEARCH_URL}?keywords={}&location={}",
            utf8_percent_encode(&keywords, NON_ALPHANUMERIC),
            utf8_percent_encode(location, NON_ALPHANUMERIC),
        );

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", api_key)
            .append_pair("url", &target)
            .append_pair("render", "true");
        url
    }
}

/// Text content of the first element whose class list contains `class`.
fn element_text(html: &str, class: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)<([a-z0-9]+)[^>]*class\s*=\s*["'][^"']*\b{}\b[^"']*["'][^>]*>(.*?)</"#,
        regex::escape(class)
    );
    let re = Regex::new(&pattern).ok()?;
    let inner = re.captures(html)?.get(2)?.as_str();
    let text = clean_text(inner);
    (!text.is_empty()).then_some(text)
}

/// `href` of the first tag whose class list contains `class`.
fn element_href(html: &str, class: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)<a\b[^>]*class\s*=\s*["'][^"']*\b{}\b[^"']*["'][^>]*>"#,
        regex::escape(class)
    );
    let re = Regex::new(&pattern).ok()?;
    let tag = re.find(html)?.as_str();
    let href = HREF.captures(tag)?.get(1)?.as_str().trim();
    (!href.is_empty()).then(|| decode_entities(href))
}

fn clean_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

/// Extracts job cards from a rendered LinkedIn search page.
pub(crate) fn parse_job_cards(html: &str, now: DateTime<Utc>) -> Vec<RawPosting> {
    CARD.captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .filter_map(|card| {
            let title = element_text(card, "base-search-card__title")?;
            let company = element_text(card, "base-search-card__subtitle")?;
            let location = element_text(card, "job-search-card__location");
            let listed = element_text(card, "job-search-card__listdate");
            Some(RawPosting {
                source: SOURCE.to_string(),
                title,
                company_name: company,
                company_url: None,
                job_url: element_href(card, "base-card__full-link"),
                location,
                posted_date: listed.and_then(|text| parse_relative_date(&text, now)),
                description: None,
                raw: serde_json::Value::Null,
            })
        })
        .collect()
}

#[async_trait]
impl Collector for ScraperApiCollector {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn collect(&self, filters: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!(source = SOURCE, "API key not configured; skipping");
            return Ok(Vec::new());
        };

        let body = get_bytes(&self.client, SOURCE, self.proxy_url(api_key, filters)).await?;
        let html = String::from_utf8_lossy(&body);
        let postings = parse_job_cards(&html, Utc::now());
        tracing::debug!(source = SOURCE, count = postings.len(), "collected postings");
        Ok(postings)
    }
}
