//! Fixed-window request budget shared by every worker through the counter store.

use std::sync::Arc;
use std::time::Duration;

use signalhub_db::{CounterStore, DbError, Store};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Counts one attempt against `key` and reports whether it fits the
    /// budget. The `limit`-th attempt in a window is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the counter store is unavailable.
    pub async fn check_limit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<bool, DbError> {
        let state = self.store.increment_counter(key, window).await?;
        Ok(state.count <= i64::from(limit))
    }

    /// Sleeps until an attempt against `key` is allowed.
    ///
    /// Backoff doubles from the initial delay up to the cap and never sleeps
    /// past the end of the current window.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the counter store is unavailable.
    pub async fn wait_for_limit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<(), DbError> {
        let mut backoff = self.initial_backoff;
        loop {
            let state = self.store.increment_counter(key, window).await?;
            if state.count <= i64::from(limit) {
                return Ok(());
            }
            let delay = backoff.min(state.resets_in.max(Duration::from_millis(1)));
            tracing::debug!(
                key,
                count = state.count,
                limit,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "rate limit reached; waiting"
            );
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_mul(2).min(self.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use signalhub_db::MemoryStore;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn fifth_call_allowed_sixth_denied() {
        let limiter = limiter();
        for _ in 0..5 {
            assert!(limiter.check_limit("serpapi:Brazil", 5, WINDOW).await.unwrap());
        }
        assert!(!limiter.check_limit("serpapi:Brazil", 5, WINDOW).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_returns_after_window() {
        let limiter = limiter();
        for _ in 0..6 {
            limiter.check_limit("rss:global", 5, WINDOW).await.unwrap();
        }
        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;
        assert!(limiter.check_limit("rss:global", 5, WINDOW).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = limiter();
        assert!(limiter.check_limit("a", 1, WINDOW).await.unwrap());
        assert!(!limiter.check_limit("a", 1, WINDOW).await.unwrap());
        assert!(limiter.check_limit("b", 1, WINDOW).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_limit_resumes_once_window_closes() {
        let limiter = limiter();
        assert!(limiter.check_limit("scraperapi:global", 1, WINDOW).await.unwrap());

        let started = tokio::time::Instant::now();
        limiter
            .wait_for_limit("scraperapi:global", 1, WINDOW)
            .await
            .unwrap();

        assert!(started.elapsed() >= WINDOW);
    }
}
