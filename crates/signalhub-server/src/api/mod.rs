mod buckets;
mod icp;
mod ingest;
mod integrations;
mod partners;
mod queue;
mod signals;
mod webhooks;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use signalhub_collectors::CollectorSet;
use signalhub_core::{AppConfig, IcpConfig};
use signalhub_db::{BucketStore, SignalStore, Store};
use signalhub_partners::PartnerClientFactory;
use signalhub_pipeline::{
    BucketEngine, CandidateWorkflow, IngestSettings, Ingestor, IntegrationRegistry, JobQueue,
    PartnerSyncService, PipelineError, QueueSettings, WebhookError, WebhookHandler,
    WebhookSecrets,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

/// Settings for the secret-protected scheduled trigger.
#[derive(Clone)]
pub struct CronSettings {
    pub secret: Option<String>,
    pub default_location: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ingestor: Arc<Ingestor>,
    pub engine: Arc<BucketEngine>,
    pub workflow: Arc<CandidateWorkflow>,
    pub sync: Arc<PartnerSyncService>,
    pub integrations: Arc<IntegrationRegistry>,
    pub webhooks: Arc<WebhookHandler>,
    /// Used until an ICP configuration has been saved through the API.
    pub default_icp: Arc<IcpConfig>,
    pub cron: CronSettings,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        collectors: CollectorSet,
        factory: Arc<dyn PartnerClientFactory>,
        config: &AppConfig,
        default_icp: IcpConfig,
    ) -> Self {
        let queue = JobQueue::new(Arc::clone(&store), QueueSettings::from_config(config));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            collectors,
            queue.clone(),
            IngestSettings::from_config(config),
        );
        Self {
            engine: Arc::new(
                BucketEngine::new(Arc::clone(&store)).with_batch_size(config.classify_batch_size),
            ),
            workflow: Arc::new(CandidateWorkflow::new(Arc::clone(&store))),
            sync: Arc::new(PartnerSyncService::new(
                Arc::clone(&store),
                Arc::clone(&factory),
            )),
            integrations: Arc::new(IntegrationRegistry::new(Arc::clone(&store))),
            webhooks: Arc::new(WebhookHandler::new(
                Arc::clone(&store),
                factory,
                queue,
                WebhookSecrets::from_config(config),
            )),
            ingestor: Arc::new(ingestor),
            store,
            default_icp: Arc::new(default_icp),
            cron: CronSettings {
                secret: config.cron_secret.clone(),
                default_location: config.default_location.clone(),
            },
        }
    }

    pub fn queue(&self) -> &JobQueue {
        self.ingestor.queue()
    }

    /// The saved ICP configuration, or the startup default.
    pub async fn current_icp(&self) -> Result<IcpConfig, signalhub_db::DbError> {
        Ok(self
            .store
            .load_icp_config()
            .await?
            .unwrap_or_else(|| self.default_icp.as_ref().clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &signalhub_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::Validation(e) => ApiError::new(request_id, "validation_error", e.to_string()),
        PipelineError::InvalidIntegration(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        PipelineError::BucketNotFound(_) => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        PipelineError::Db(e) => map_db_error(request_id, e),
        other => {
            tracing::error!(error = %other, "request failed");
            ApiError::new(request_id, "internal_error", other.to_string())
        }
    }
}

pub(super) fn map_webhook_error(request_id: String, error: &WebhookError) -> ApiError {
    if error.is_authentication() {
        return ApiError::new(request_id, "unauthorized", error.to_string());
    }
    if error.is_client_error() {
        return ApiError::new(request_id, "validation_error", error.to_string());
    }
    match error {
        WebhookError::NoActiveIntegration(_) => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        WebhookError::Pipeline(e) => map_pipeline_error(request_id, e),
        WebhookError::Db(e) => map_db_error(request_id, e),
        other => {
            tracing::error!(error = %other, "webhook processing failed");
            ApiError::new(request_id, "internal_error", other.to_string())
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/ingest", post(ingest::ingest))
        .route(
            "/api/v1/partners/sync",
            get(partners::sync_status).post(partners::trigger_sync),
        )
        .route(
            "/api/v1/partners/integrations",
            get(integrations::list_integrations).post(integrations::register_integration),
        )
        .route(
            "/api/v1/buckets",
            get(buckets::list_buckets).post(buckets::process_buckets),
        )
        .route(
            "/api/v1/buckets/{bucket_id}/trigger",
            post(buckets::trigger_workflow),
        )
        .route(
            "/api/v1/buckets/{bucket_id}/candidates",
            get(buckets::list_candidates),
        )
        .route("/api/v1/signals", get(signals::list_signals))
        .route("/api/v1/queue/stats", get(queue::queue_stats))
        .route(
            "/api/v1/icp-config",
            get(icp::get_icp_config).put(icp::put_icp_config),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

/// Health, the cron trigger and webhooks authenticate themselves and sit
/// outside the bearer-token layer.
fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/cron/ingest",
            get(ingest::cron_ingest).post(ingest::cron_ingest),
        )
        .route(
            "/api/v1/webhooks/linkedin",
            get(webhooks::linkedin).post(webhooks::linkedin),
        )
        .route(
            "/api/v1/webhooks/indeed",
            get(webhooks::indeed).post(webhooks::indeed),
        )
        .route("/api/v1/webhooks/signals", post(webhooks::signals))
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    Router::new()
        .merge(public_router())
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use signalhub_collectors::{Collector, CollectorError, CollectorSet, FundingCollector};
    use signalhub_core::{
        build_app_config, AppConfig, FundingFilters, IcpConfig, IngestFilters, RawFundingEvent,
        RawPosting,
    };
    use signalhub_db::MemoryStore;
    use signalhub_partners::HttpPartnerClientFactory;
    use tower::ServiceExt;

    use super::{build_app, AppState};
    use crate::middleware::{AuthState, RateLimitState};

    pub struct OnePosting;

    #[async_trait]
    impl Collector for OnePosting {
        fn source(&self) -> &'static str {
            "serpapi"
        }

        async fn collect(&self, _: &IngestFilters) -> Result<Vec<RawPosting>, CollectorError> {
            Ok(vec![RawPosting {
                source: "serpapi".to_string(),
                title: "VP of Engineering".to_string(),
                company_name: "Acme".to_string(),
                company_url: None,
                job_url: Some("https://jobs.example/acme-vp".to_string()),
                location: Some("Brazil".to_string()),
                posted_date: None,
                description: None,
                raw: serde_json::Value::Null,
            }])
        }
    }

    pub struct NoFunding;

    #[async_trait]
    impl FundingCollector for NoFunding {
        fn source(&self) -> &'static str {
            "crunchbase"
        }

        async fn collect_funding(
            &self,
            _: &FundingFilters,
        ) -> Result<Vec<RawFundingEvent>, CollectorError> {
            Ok(Vec::new())
        }
    }

    pub fn test_config() -> AppConfig {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "postgres://localhost/signalhub_test"),
            ("CRON_SECRET", "cron-secret"),
            ("WEBHOOK_SECRET", "signal-secret"),
            ("LINKEDIN_WEBHOOK_SECRET", "linkedin-secret"),
        ]);
        build_app_config(|key| {
            vars.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        })
        .expect("test config")
    }

    pub fn test_state(store: Arc<MemoryStore>, config: &AppConfig) -> AppState {
        let collectors = CollectorSet::new(Arc::new(NoFunding)).with_collector(Arc::new(OnePosting));
        AppState::new(
            store,
            collectors,
            Arc::new(HttpPartnerClientFactory::default()),
            config,
            IcpConfig::default(),
        )
    }

    pub async fn send(
        state: AppState,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let app = build_app(state, AuthState::disabled(), RateLimitState::default());
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, json)
    }

    pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use signalhub_db::MemoryStore;
    use tower::ServiceExt;

    use super::test_support::{send, test_config, test_state};
    use super::*;

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn webhook_signature_errors_map_to_unauthorized() {
        let response =
            map_webhook_error("req-1".to_string(), &WebhookError::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_reports_ok_and_echoes_request_id() {
        let state = test_state(Arc::new(MemoryStore::new()), &test_config());
        let app = build_app(state, AuthState::disabled(), RateLimitState::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-request-id").map(|v| v.as_bytes()),
            Some(&b"req-42"[..])
        );
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        let state = test_state(Arc::new(MemoryStore::new()), &test_config());
        let app = build_app(
            state,
            AuthState::with_keys(["api-key".to_string()]),
            RateLimitState::default(),
        );

        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queue/stats")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queue/stats")
                    .header("authorization", "Bearer api-key")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_is_applied_per_peer_address() {
        use axum::extract::ConnectInfo;
        use std::net::SocketAddr;

        let state = test_state(Arc::new(MemoryStore::new()), &test_config());
        let app = build_app(
            state,
            AuthState::disabled(),
            RateLimitState::new(1, std::time::Duration::from_secs(60)),
        );
        let from = |peer: &str| {
            let mut request = Request::builder()
                .uri("/api/v1/queue/stats")
                .header("x-request-id", "req-7")
                .body(Body::empty())
                .expect("request");
            let addr: SocketAddr = peer.parse().expect("addr");
            request.extensions_mut().insert(ConnectInfo(addr));
            request
        };

        let first = app.clone().oneshot(from("10.0.0.1:5000")).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let limited = app.clone().oneshot(from("10.0.0.1:5001")).await.expect("response");
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            limited.headers().get("retry-after").map(|v| v.as_bytes()),
            Some(&b"60"[..])
        );
        let body = axum::body::to_bytes(limited.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["error"]["code"], "rate_limited");
        assert_eq!(body["meta"]["request_id"], "req-7");

        let other = app.oneshot(from("10.0.0.2:5000")).await.expect("response");
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_public() {
        let state = test_state(Arc::new(MemoryStore::new()), &test_config());
        let (status, body) = send(
            state,
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
    }
}
