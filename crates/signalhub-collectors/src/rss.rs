//! Job-board RSS/Atom feeds.
//!
//! Feeds are derived from the requested location: one Indeed search feed per
//! senior title. A request without a location has no feeds and yields nothing.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Url};
use signalhub_core::{IngestFilters, RawPosting};

use crate::error::CollectorError;
use crate::http::{build_client, get_bytes, parse_base_url, HttpSettings};
use crate::Collector;

const DEFAULT_FEED_BASE_URL: &str = "https://www.indeed.com/rss";
const FEED_QUERIES: [&str; 3] = ["VP", "Head of Engineering", "Director"];
pub const SOURCE: &str = "rss";

pub struct RssFeedCollector {
    client: Client,
    feed_base_url: Url,
}

impl RssFeedCollector {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, CollectorError> {
        Self::with_base_url(settings, DEFAULT_FEED_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`CollectorError::InvalidBaseUrl`] if `feed_base_url` does not parse.
    pub fn with_base_url(
        settings: &HttpSettings,
        feed_base_url: &str,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_client(settings)?,
            feed_base_url: parse_base_url(feed_base_url)?,
        })
    }

    /// Search feeds for `location`; empty when no location is given.
    #[must_use]
    pub fn feed_urls(&self, location: Option<&str>) -> Vec<Url> {
        let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) else {
            return Vec::new();
        };
        FEED_QUERIES
            .iter()
            .map(|query| {
                let mut url = self.feed_base_url.clone();
                url.query_pairs_mut()
                    .append_pair("q", query)
                    .append_pair("l", location);
                url
            })
            .collect()
    }

    async fn fetch_feed(
        &self,
        url: Url,
        filters: &IngestFilters,
    ) -> Result<Vec<RawPosting>, CollectorError> {
        let feed_url = url.to_string();
        let bytes = get_bytes(&self.client, SOURCE, url).await?;
        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| CollectorError::Feed {
            url: feed_url.clone(),
            reason: e.to_string(),
        })?;

        let cutoff = filters
            .days_back
            .and_then(|days| Utc::now().checked_sub_signed(Duration::days(i64::from(days))));

        Ok(feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone())?;
                let raw_title = entry.title.map(|t| t.content)?;
                let posted_date = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                if let (Some(cutoff), Some(posted)) = (cutoff, posted_date) {
                    if posted < cutoff {
                        return None;
                    }
                }

                let author = entry.authors.first().map(|a| a.name.trim().to_string());
                let (title, company, location) = split_title(&raw_title, author);
                Some(RawPosting {
                    source: SOURCE.to_string(),
                    title,
                    company_name: company,
                    company_url: None,
                    job_url: Some(link),
                    location: location.or_else(|| filters.location.clone()),
                    posted_date,
                    description: entry.summary.map(|s| s.content),
                    raw: serde_json::json!({ "feed": feed_url, "title": raw_title }),
                })
            })
            .collect())
    }
}

/// Indeed feed titles read `Title - Company - Location`. An explicit author
/// takes precedence over the company segment.
fn split_title(raw: &str, author: Option<String>) -> (String, String, Option<String>) {
    let parts: Vec<&str> = raw.split(" - ").map(str::trim).collect();
    let (title, company_segment, location) = match parts.as_slice() {
        [title, company, location, ..] => {
            (*title, Some(*company), Some((*location).to_string()))
        }
        [title, company] => (*title, Some(*company), None),
        _ => (raw.trim(), None, None),
    };
    let company = author
        .filter(|a| !a.is_empty())
        .or_else(|| company_segment.map(ToString::to_string))
        .unwrap_or_else(|| "Unknown".to_string());
    (title.to_string(), company, location)
}

#[async_trait]
impl Collector for RssFeedCollector {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn collect(&self, filters: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError> {
        let mut postings = Vec::new();
        for url in self.feed_urls(filters.location.as_deref()) {
            let feed_url = url.to_string();
            match self.fetch_feed(url, filters).await {
                Ok(mut items) => postings.append(&mut items),
                Err(e) => {
                    tracing::warn!(source = SOURCE, feed = %feed_url, error = %e, "feed collection failed");
                }
            }
        }
        Ok(postings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_location_means_no_feeds() {
        let collector = RssFeedCollector::new(&HttpSettings::default()).unwrap();
        assert!(collector.feed_urls(None).is_empty());
        assert!(collector.feed_urls(Some("  ")).is_empty());
    }

    #[test]
    fn derives_one_feed_per_senior_title() {
        let collector = RssFeedCollector::new(&HttpSettings::default()).unwrap();
        let urls: Vec<String> = collector
            .feed_urls(Some("São Paulo"))
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "https://www.indeed.com/rss?q=VP&l=S%C3%A3o+Paulo");
        assert_eq!(
            urls[1],
            "https://www.indeed.com/rss?q=Head+of+Engineering&l=S%C3%A3o+Paulo"
        );
    }

    #[test]
    fn splits_indeed_style_titles() {
        let (title, company, location) =
            split_title("VP of Sales - Acme - Rio de Janeiro, RJ", None);
        assert_eq!(title, "VP of Sales");
        assert_eq!(company, "Acme");
        assert_eq!(location.as_deref(), Some("Rio de Janeiro, RJ"));
    }

    #[test]
    fn author_overrides_company_and_unknown_is_fallback() {
        let (_, company, _) = split_title("Director - Acme", Some("Globex".to_string()));
        assert_eq!(company, "Globex");
        let (title, company, _) = split_title("Director", None);
        assert_eq!(title, "Director");
        assert_eq!(company, "Unknown");
    }
}
