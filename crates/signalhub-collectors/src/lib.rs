//! Collector adapters that turn external job and funding sources into raw
//! postings and funding events.

mod dates;
mod error;
mod funding;
mod http;
mod rss;
mod scraperapi;
mod serpapi;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use signalhub_core::{AppConfig, FundingFilters, IngestFilters, RawFundingEvent, RawPosting};

pub use dates::{parse_posted_date, parse_relative_date};
pub use error::CollectorError;
pub use funding::CrunchbaseCollector;
pub use http::HttpSettings;
pub use rss::RssFeedCollector;
pub use scraperapi::ScraperApiCollector;
pub use serpapi::SerpApiCollector;

/// Sources used when an ingestion request does not name any.
pub const DEFAULT_SOURCES: [&str; 3] = [serpapi::SOURCE, scraperapi::SOURCE, rss::SOURCE];

#[async_trait]
pub trait Collector: Send + Sync {
    /// Tag stored on every posting this collector produces.
    fn source(&self) -> &'static str;

    /// Fetches postings matching `filters`. An unconfigured collector returns
    /// an empty list rather than an error.
    async fn collect(&self, filters: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError>;
}

#[async_trait]
pub trait FundingCollector: Send + Sync {
    fn source(&self) -> &'static str;

    async fn collect_funding(
        &self,
        filters: &FundingFilters,
    ) -> Result<Vec<RawFundingEvent>, CollectorError>;
}

/// Job-posting collectors keyed by source tag, plus the funding collector.
#[derive(Clone)]
pub struct CollectorSet {
    collectors: BTreeMap<&'static str, Arc<dyn Collector>>,
    funding: Arc<dyn FundingCollector>,
}

impl CollectorSet {
    #[must_use]
    pub fn new(funding: Arc<dyn FundingCollector>) -> Self {
        Self {
            collectors: BTreeMap::new(),
            funding,
        }
    }

    /// Registers `collector` under its source tag, replacing any previous one.
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.insert(collector.source(), collector);
        self
    }

    /// Production collectors configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, CollectorError> {
        let settings = HttpSettings {
            timeout_secs: config.collector_timeout_secs,
            user_agent: config.user_agent.clone(),
        };
        let funding = CrunchbaseCollector::new(config.crunchbase_api_key.clone(), &settings)?;
        Ok(Self::new(Arc::new(funding))
            .with_collector(Arc::new(SerpApiCollector::new(
                config.serpapi_api_key.clone(),
                &settings,
            )?))
            .with_collector(Arc::new(ScraperApiCollector::new(
                config.scraperapi_key.clone(),
                &settings,
            )?))
            .with_collector(Arc::new(RssFeedCollector::new(&settings)?)))
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(source).cloned()
    }

    #[must_use]
    pub fn funding(&self) -> Arc<dyn FundingCollector> {
        Arc::clone(&self.funding)
    }

    /// Registered source tags in sorted order.
    pub fn sources(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.collectors.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Collector for Fixed {
        fn source(&self) -> &'static str {
            self.0
        }

        async fn collect(&self, _: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError> {
            Ok(Vec::new())
        }
    }

    struct NoFunding;

    #[async_trait]
    impl FundingCollector for NoFunding {
        fn source(&self) -> &'static str {
            "none"
        }

        async fn collect_funding(
            &self,
            _: &FundingFilters,
        ) -> Result<Vec<RawFundingEvent>, CollectorError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registers_collectors_by_source_tag() {
        let set = CollectorSet::new(Arc::new(NoFunding))
            .with_collector(Arc::new(Fixed("rss")))
            .with_collector(Arc::new(Fixed("serpapi")));

        assert!(set.get("rss").is_some());
        assert!(set.get("scraperapi").is_none());
        assert_eq!(set.sources().collect::<Vec<_>>(), vec!["rss", "serpapi"]);
    }
}
