//! Request ids, bearer-token auth and per-client rate limiting for the
//! protected API.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use signalhub_core::{AppConfig, Environment};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client windows are swept for expired entries once the map reaches this size.
const SWEEP_THRESHOLD: usize = 10_000;

/// Request id stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer tokens accepted by the protected API.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<[String]>,
    pub enabled: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("keys", &self.api_keys.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuthState {
    /// Auth settings from `config.api_keys`.
    ///
    /// With no keys configured, development runs unauthenticated and every
    /// other environment refuses to start.
    ///
    /// # Errors
    ///
    /// Returns an error when no keys are configured outside development.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if !config.api_keys.is_empty() {
            return Ok(Self::with_keys(config.api_keys.iter().cloned()));
        }
        if config.env == Environment::Development {
            tracing::warn!("no API keys configured; bearer auth disabled in development");
            return Ok(Self::disabled());
        }
        anyhow::bail!("SIGNALHUB_API_KEYS must list at least one bearer token in {}", config.env)
    }

    #[must_use]
    pub fn with_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            api_keys: keys.into_iter().collect(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::from(Vec::new()),
            enabled: false,
        }
    }

    /// Compares against every key so timing does not reveal which one matched.
    fn allows(&self, token: &str) -> bool {
        self.api_keys.iter().fold(false, |matched, key| {
            matched | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started_at: Instant,
    count: u32,
}

/// Fixed-window limiter with a separate budget per client address.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, ClientWindow>>>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_rate_limit,
            Duration::from_secs(config.api_rate_window_secs),
        )
    }

    /// Counts one request from `client`. Over budget, returns how long until
    /// the client's window resets.
    async fn admit(&self, client: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        if clients.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started_at) < window);
        }

        let entry = clients.entry(client).or_insert(ClientWindow {
            started_at: now,
            count: 0,
        });
        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return Err(self
                .window
                .saturating_sub(now.duration_since(entry.started_at)));
        }
        entry.count += 1;
        Ok(())
    }
}

/// The peer address recorded by the listener. Requests served without
/// connect info share one budget.
fn client_addr(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| {
            addr.ip()
        })
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Reuses the caller's `x-request-id` or mints a UUID, exposes it to
/// handlers as [`RequestId`] and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }
    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid bearer token",
        )
        .into_response(),
    }
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_addr(&req);
    match rate_limit.admit(client).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::debug!(%client, "api rate limit exceeded");
            let mut res =
                ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
                    .into_response();
            let secs = (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1);
            res.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
            res
        }
    }
}

/// Constant-time match of the request's bearer token against `secret`.
/// An unset or empty secret matches nothing.
pub fn bearer_matches(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    extract_bearer_token(headers.get(AUTHORIZATION))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(secret.as_bytes())))
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use signalhub_core::build_app_config;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> AppConfig {
        let mut map: HashMap<&str, &str> =
            HashMap::from([("DATABASE_URL", "postgres://localhost/signalhub_test")]);
        map.extend(vars.iter().copied());
        build_app_config(|key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        })
        .expect("config")
    }

    #[test]
    fn bearer_token_is_trimmed_and_must_use_the_bearer_scheme() {
        let header = HeaderValue::from_static("Bearer  test-token ");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
        let basic = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&basic)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn bearer_matches_requires_a_configured_secret() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer cron-1"));

        assert!(bearer_matches(&headers, Some("cron-1")));
        assert!(!bearer_matches(&headers, Some("cron-2")));
        assert!(!bearer_matches(&headers, None));
        assert!(!bearer_matches(&headers, Some("")));
        assert!(!bearer_matches(&HeaderMap::new(), Some("cron-1")));
    }

    #[test]
    fn auth_keys_come_from_config() {
        let auth = AuthState::from_config(&config_with(&[(
            "SIGNALHUB_API_KEYS",
            "key-a,key-b",
        )]))
        .expect("auth");
        assert!(auth.enabled);
        assert!(auth.allows("key-a"));
        assert!(auth.allows("key-b"));
        assert!(!auth.allows("key-c"));
        assert!(!auth.allows("key-"));
    }

    #[test]
    fn missing_keys_disable_auth_only_in_development() {
        let dev = AuthState::from_config(&config_with(&[])).expect("development");
        assert!(!dev.enabled);

        let prod = AuthState::from_config(&config_with(&[("SIGNALHUB_ENV", "production")]));
        assert!(prod.is_err());
    }

    #[tokio::test]
    async fn each_client_gets_its_own_budget() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.admit(first).await.is_ok());
        assert!(limiter.admit(first).await.is_ok());
        assert!(limiter.admit(first).await.is_err());
        assert!(limiter.admit(second).await.is_ok());
        assert!(limiter.admit(second).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_resets_when_the_window_elapses() {
        let limiter = RateLimitState::new(1, Duration::from_secs(60));
        let client: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.admit(client).await.is_ok());
        tokio::time::advance(Duration::from_secs(20)).await;
        let wait = limiter.admit(client).await.expect_err("over budget");
        assert_eq!(wait, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(limiter.admit(client).await.is_ok());
    }

    #[test]
    fn rate_limit_comes_from_config() {
        let limiter = RateLimitState::from_config(&config_with(&[
            ("SIGNALHUB_API_RATE_LIMIT", "30"),
            ("SIGNALHUB_API_RATE_WINDOW_SECS", "10"),
        ]));
        assert_eq!(limiter.max_requests, 30);
        assert_eq!(limiter.window, Duration::from_secs(10));
    }
}
