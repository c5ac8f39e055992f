//! Partner client tests against wiremock.

use signalhub_core::{IngestFilters, PartnerCredentials, PartnerKind};
use signalhub_partners::{
    sign_payload, ClientSettings, IndeedClient, JobPostingData, JobPostingUpdate, LinkedInClient,
    PartnerClient, PartnerError, RetryPolicy,
};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> ClientSettings {
    ClientSettings {
        timeout_secs: 5,
        user_agent: "signalhub-test".to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 0,
        },
    }
}

fn filters() -> IngestFilters {
    IngestFilters {
        keywords: vec!["VP".to_string(), "Engineering".to_string()],
        location: Some("Brazil".to_string()),
        days_back: Some(7),
    }
}

fn linkedin(server: &MockServer, credentials: PartnerCredentials) -> LinkedInClient {
    LinkedInClient::with_base_urls(
        credentials,
        &settings(),
        &format!("{}/v2", server.uri()),
        &format!("{}/oauth/v2", server.uri()),
    )
    .expect("client construction should not fail")
}

fn indeed(server: &MockServer) -> IndeedClient {
    IndeedClient::with_base_url(
        PartnerCredentials {
            api_key: Some("indeed-key".to_string()),
            partner_id: Some("partner-7".to_string()),
            ..PartnerCredentials::default()
        },
        &settings(),
        &server.uri(),
    )
    .expect("client construction should not fail")
}

#[tokio::test]
async fn linkedin_search_maps_elements() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "elements": [{
            "id": 4401,
            "title": "VP of Engineering",
            "companyDetails": { "name": "Acme" },
            "formattedLocation": "São Paulo, Brazil",
            "jobPostingUrl": "https://www.linkedin.com/jobs/view/4401"
        }]
    });
    Mock::given(method("GET"))
        .and(path("/v2/jobSearch"))
        .and(header("Authorization", "Bearer token-1"))
        .and(query_param("keywords", "VP Engineering"))
        .and(query_param("count", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = linkedin(
        &server,
        PartnerCredentials {
            access_token: Some("token-1".to_string()),
            ..PartnerCredentials::default()
        },
    );
    let jobs = client.search_jobs(&filters()).await.expect("search");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].partner_job_id, "4401");
    assert_eq!(jobs[0].posting.source, "linkedin");
    assert_eq!(jobs[0].posting.company_name, "Acme");
}

#[tokio::test]
async fn linkedin_refreshes_token_once_after_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/jobSearch"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh",
            "refresh_token": "refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/jobSearch"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "elements": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = linkedin(
        &server,
        PartnerCredentials {
            access_token: Some("stale".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            ..PartnerCredentials::default()
        },
    );
    let jobs = client.search_jobs(&filters()).await.expect("search after refresh");
    assert!(jobs.is_empty());

    let refreshed = client
        .take_refreshed_credentials()
        .await
        .expect("refresh should be reported");
    assert_eq!(refreshed.access_token.as_deref(), Some("fresh"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-2"));
    assert!(client.take_refreshed_credentials().await.is_none());
}

#[tokio::test]
async fn linkedin_without_refresh_token_surfaces_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = linkedin(
        &server,
        PartnerCredentials {
            access_token: Some("stale".to_string()),
            ..PartnerCredentials::default()
        },
    );
    let err = client.delete_job("4401").await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn indeed_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/jobs/search"))
        .and(query_param("fromage", "7"))
        .and(header("X-Indeed-Partner-ID", "partner-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{ "jobkey": "k1", "jobtitle": "Head of Engineering", "company": "Globex" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let jobs = indeed(&server).search_jobs(&filters()).await.expect("third attempt succeeds");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].partner_job_id, "k1");
}

#[tokio::test]
async fn indeed_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let job = JobPostingData {
        title: "CTO".to_string(),
        company: "Acme".to_string(),
        location: None,
        description: None,
        url: None,
    };
    let err = indeed(&server).post_job(&job).await.unwrap_err();
    assert!(matches!(
        err,
        PartnerError::UnexpectedStatus { status: 500, .. }
    ));
}

#[tokio::test]
async fn indeed_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/jobs/k1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let update = JobPostingUpdate {
        title: Some("CTO".to_string()),
        ..JobPostingUpdate::default()
    };
    let err = indeed(&server).update_job("k1", &update).await.unwrap_err();
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn indeed_post_job_returns_partner_id_and_view_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/jobs"))
        .and(header("Authorization", "Bearer indeed-key"))
        .and(body_string_contains("\"jobType\":\"FULLTIME\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "jobId": "new-1" })))
        .mount(&server)
        .await;

    let job = JobPostingData {
        title: "VP Sales".to_string(),
        company: "Acme".to_string(),
        location: Some("Remote".to_string()),
        description: Some("Own revenue".to_string()),
        url: None,
    };
    let posted = indeed(&server).post_job(&job).await.expect("post");

    assert_eq!(posted.partner_job_id, "new-1");
    assert_eq!(posted.url, "https://www.indeed.com/viewjob?jk=new-1");
}

#[tokio::test]
async fn default_signature_check_uses_hmac_sha256() {
    let server = MockServer::start().await;
    let client = indeed(&server);
    let payload = br#"{"type":"job.status_changed","jobId":"k1","status":"closed"}"#;
    let signature = sign_payload(payload, "hook-secret");

    assert_eq!(client.kind(), PartnerKind::Indeed);
    assert!(client.verify_webhook_signature(payload, &signature, "hook-secret"));
    assert!(!client.verify_webhook_signature(payload, &signature, "other-secret"));
}
