use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub icp_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub collector_timeout_secs: u64,
    pub user_agent: String,
    pub ingest_concurrency: usize,
    pub source_rate_limit: u32,
    pub source_rate_window_secs: u64,
    pub queue_concurrency: usize,
    pub queue_max_jobs_per_sec: u32,
    pub queue_max_attempts: u32,
    pub queue_backoff_base_ms: u64,
    pub classify_batch_size: i64,
    /// Bearer tokens accepted by the protected API. Empty disables auth in
    /// development and is rejected at startup everywhere else.
    pub api_keys: Vec<String>,
    /// Requests each client may make per window on the protected API.
    pub api_rate_limit: u32,
    pub api_rate_window_secs: u64,
    pub default_location: String,
    pub serpapi_api_key: Option<String>,
    pub scraperapi_key: Option<String>,
    pub crunchbase_api_key: Option<String>,
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub indeed_partner_id: Option<String>,
    pub linkedin_webhook_secret: Option<String>,
    pub indeed_webhook_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub cron_secret: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("icp_path", &self.icp_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("collector_timeout_secs", &self.collector_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("ingest_concurrency", &self.ingest_concurrency)
            .field("source_rate_limit", &self.source_rate_limit)
            .field("source_rate_window_secs", &self.source_rate_window_secs)
            .field("queue_concurrency", &self.queue_concurrency)
            .field("queue_max_jobs_per_sec", &self.queue_max_jobs_per_sec)
            .field("queue_max_attempts", &self.queue_max_attempts)
            .field("queue_backoff_base_ms", &self.queue_backoff_base_ms)
            .field("classify_batch_size", &self.classify_batch_size)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("api_rate_limit", &self.api_rate_limit)
            .field("api_rate_window_secs", &self.api_rate_window_secs)
            .field("default_location", &self.default_location)
            .field("serpapi_api_key", &redact(&self.serpapi_api_key))
            .field("scraperapi_key", &redact(&self.scraperapi_key))
            .field("crunchbase_api_key", &redact(&self.crunchbase_api_key))
            .field("linkedin_client_id", &self.linkedin_client_id)
            .field(
                "linkedin_client_secret",
                &redact(&self.linkedin_client_secret),
            )
            .field("indeed_partner_id", &self.indeed_partner_id)
            .field(
                "linkedin_webhook_secret",
                &redact(&self.linkedin_webhook_secret),
            )
            .field("indeed_webhook_secret", &redact(&self.indeed_webhook_secret))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("cron_secret", &redact(&self.cron_secret))
            .finish()
    }
}
