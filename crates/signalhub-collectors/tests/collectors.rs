//! Integration tests for the collectors using wiremock HTTP mocks.

use signalhub_collectors::{
    Collector, CollectorError, CrunchbaseCollector, FundingCollector, HttpSettings,
    RssFeedCollector, ScraperApiCollector, SerpApiCollector,
};
use signalhub_core::{FundingFilters, IngestFilters};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> HttpSettings {
    HttpSettings {
        timeout_secs: 5,
        user_agent: "signalhub-test".to_string(),
    }
}

fn filters(location: Option<&str>) -> IngestFilters {
    IngestFilters {
        keywords: vec!["VP".to_string(), "Engineering".to_string()],
        location: location.map(ToString::to_string),
        days_back: None,
    }
}

#[tokio::test]
async fn serpapi_maps_job_results() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "jobs_results": [
            {
                "title": "VP of Engineering",
                "company_name": "Acme",
                "location": "São Paulo, Brazil",
                "link": "https://www.linkedin.com/jobs/view/1",
                "description": "Lead the team",
                "detected_extensions": { "posted_at": "3 days ago" }
            },
            { "title": "", "company_name": "Nameless" }
        ]
    });

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("engine", "linkedin_jobs"))
        .and(query_param("api_key", "serp-key"))
        .and(query_param("keywords", "VP Engineering"))
        .and(query_param("location", "Brazil"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let collector = SerpApiCollector::with_base_url(
        Some("serp-key".to_string()),
        &settings(),
        &format!("{}/search.json", server.uri()),
    )
    .expect("client construction should not fail");
    let postings = collector
        .collect(&filters(Some("Brazil")))
        .await
        .expect("should collect");

    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].source, "serpapi");
    assert_eq!(postings[0].company_name, "Acme");
    assert_eq!(
        postings[0].job_url.as_deref(),
        Some("https://www.linkedin.com/jobs/view/1")
    );
    assert!(postings[0].posted_date.is_some());
}

#[tokio::test]
async fn serpapi_without_key_returns_empty_without_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let collector = SerpApiCollector::with_base_url(None, &settings(), &server.uri())
        .expect("client construction should not fail");
    let postings = collector.collect(&filters(None)).await.expect("no error");

    assert!(postings.is_empty());
}

#[tokio::test]
async fn serpapi_server_error_is_retriable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let collector =
        SerpApiCollector::with_base_url(Some("k".to_string()), &settings(), &server.uri())
            .expect("client construction should not fail");
    let err = collector.collect(&filters(None)).await.unwrap_err();

    assert!(matches!(
        err,
        CollectorError::UnexpectedStatus { status: 502, .. }
    ));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn scraperapi_parses_rendered_cards() {
    let server = MockServer::start().await;
    let html = r#"
        <ul class="jobs-search__results-list">
          <li>
            <a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/9"></a>
            <h3 class="base-search-card__title">Head of Engineering</h3>
            <h4 class="base-search-card__subtitle">Globex</h4>
            <span class="job-search-card__location">Remote</span>
          </li>
        </ul>
    "#;

    Mock::given(method("GET"))
        .and(query_param("api_key", "scrape-key"))
        .and(query_param("render", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let collector = ScraperApiCollector::with_base_url(
        Some("scrape-key".to_string()),
        &settings(),
        &server.uri(),
    )
    .expect("client construction should not fail");
    let postings = collector
        .collect(&filters(Some("Remote")))
        .await
        .expect("should collect");

    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].source, "scraperapi");
    assert_eq!(postings[0].title, "Head of Engineering");
    assert_eq!(postings[0].company_name, "Globex");
}

#[tokio::test]
async fn rss_keeps_working_feeds_when_one_fails() {
    let server = MockServer::start().await;
    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>Indeed jobs</title>
            <link>https://www.indeed.com</link>
            <description>jobs</description>
            <item>
              <title>VP of Sales - Initech - Curitiba, PR</title>
              <link>https://www.indeed.com/viewjob?jk=abc</link>
              <description>Sell things</description>
              <pubDate>Mon, 02 Mar 2026 10:00:00 GMT</pubDate>
            </item>
          </channel>
        </rss>"#;

    Mock::given(method("GET"))
        .and(path("/rss"))
        .and(query_param("q", "VP"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(feed),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .and(query_param("q", "Head of Engineering"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .and(query_param("q", "Director"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
        .mount(&server)
        .await;

    let collector = RssFeedCollector::with_base_url(&settings(), &format!("{}/rss", server.uri()))
        .expect("client construction should not fail");
    let postings = collector
        .collect(&filters(Some("Brazil")))
        .await
        .expect("per-feed failures are not errors");

    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].title, "VP of Sales");
    assert_eq!(postings[0].company_name, "Initech");
    assert_eq!(postings[0].location.as_deref(), Some("Curitiba, PR"));
    assert_eq!(
        postings[0].job_url.as_deref(),
        Some("https://www.indeed.com/viewjob?jk=abc")
    );
}

#[tokio::test]
async fn crunchbase_filters_by_minimum_amount() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "entities": [
            { "properties": {
                "organization_name": "Big Raise",
                "money_raised": { "value": 20000000.0, "currency": "USD" },
                "investment_type": "series_b",
                "announced_on": "2026-03-01"
            }},
            { "properties": {
                "organization_name": "Small Raise",
                "money_raised": { "value": 250000.0, "currency": "USD" },
                "announced_on": "2026-03-02"
            }}
        ]
    });

    Mock::given(method("GET"))
        .and(path("/v4/funding-rounds"))
        .and(query_param("user_key", "cb-key"))
        .and(query_param("funding_type", "series_a,series_b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let collector = CrunchbaseCollector::with_base_url(
        Some("cb-key".to_string()),
        &settings(),
        &format!("{}/v4", server.uri()),
    )
    .expect("client construction should not fail");
    let events = collector
        .collect_funding(&FundingFilters {
            min_amount: Some(1_000_000.0),
            rounds: vec!["series_a".to_string(), "series_b".to_string()],
            days_back: Some(7),
        })
        .await
        .expect("should collect");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].company_name, "Big Raise");
    assert_eq!(events[0].source, "crunchbase");
    assert_eq!(events[0].round.as_deref(), Some("series_b"));
}
