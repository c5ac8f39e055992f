//! Retry wrapper shared by every partner API call.
//!
//! A 401 triggers at most one credential refresh followed by an immediate
//! retry. Transient failures ([`PartnerError::is_retriable`]) are retried with
//! linear back-off (`backoff_base_ms × attempt`) until `max_attempts` calls
//! have been made. Anything else is returned straight away.

use std::future::Future;
use std::time::Duration;

use crate::error::PartnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    fn delay(self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Runs `operation` under `policy`.
///
/// `refresh` is called once, on the first 401. It resolves to `Ok(true)` when
/// new credentials are in place; `Ok(false)` or an error means the original
/// 401 is returned.
pub async fn with_partner_retry<T, F, Fut, R, RFut>(
    policy: RetryPolicy,
    mut refresh: R,
    mut operation: F,
) -> Result<T, PartnerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PartnerError>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = Result<bool, PartnerError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut refreshed = false;
    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_unauthorized() {
            if refreshed || attempt >= max_attempts {
                return Err(err);
            }
            refreshed = true;
            match refresh().await {
                Ok(true) => {
                    tracing::info!(attempt, "partner credentials refreshed; retrying");
                    continue;
                }
                Ok(false) => return Err(err),
                Err(refresh_err) => {
                    tracing::warn!(error = %refresh_err, "partner credential refresh failed");
                    return Err(err);
                }
            }
        }

        if !err.is_retriable() || attempt >= max_attempts {
            return Err(err);
        }
        let delay = policy.delay(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "partner call failed; retrying after back-off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use signalhub_core::PartnerKind;

    use super::*;

    const FAST: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff_base_ms: 0,
    };

    fn unavailable() -> PartnerError {
        PartnerError::UnexpectedStatus {
            partner: PartnerKind::Indeed,
            status: 503,
            path: "/api/v1/jobs".to_string(),
        }
    }

    fn unauthorized() -> PartnerError {
        PartnerError::Unauthorized {
            partner: PartnerKind::LinkedIn,
        }
    }

    async fn no_refresh() -> Result<bool, PartnerError> {
        Ok(false)
    }

    #[tokio::test]
    async fn transient_failures_exhaust_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = with_partner_retry(FAST, no_refresh, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = with_partner_retry(FAST, no_refresh, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(PartnerError::UnexpectedStatus {
                    partner: PartnerKind::Indeed,
                    status: 404,
                    path: "/api/v1/jobs/x".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_refreshes_once_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let refreshes = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let r = Arc::clone(&refreshes);
        let result = with_partner_retry(
            FAST,
            || {
                let r = Arc::clone(&r);
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            },
            || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(unauthorized())
                    } else {
                        Ok(7)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_unauthorized_is_not_refreshed_twice() {
        let calls = Arc::new(AtomicU32::new(0));
        let refreshes = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let r = Arc::clone(&refreshes);
        let result: Result<(), _> = with_partner_retry(
            FAST,
            || {
                let r = Arc::clone(&r);
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            },
            || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(unauthorized())
                }
            },
        )
        .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = with_partner_retry(FAST, no_refresh, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(unauthorized())
            }
        })
        .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(3));
    }
}
