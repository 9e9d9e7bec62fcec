//! Resilient request execution.
//!
//! [`execute`] runs an async operation under a hard per-attempt timeout and
//! retries failures with capped exponential backoff:
//!
//! ```text
//! delay(attempt) = min(base_delay * 2^attempt, max_delay)
//! ```
//!
//! With `max_retries = n` an always-failing operation runs `n + 1` times and
//! the last error is returned. There is no jitter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use ridelink_core::FailureCategory;
use ridelink_core::config::RetrySettings;

/// A failed request, as seen by the retry layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl RequestError {
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Offline(message) => FailureCategory::classify(true, None, message),
            Self::Timeout(_) => FailureCategory::Timeout,
            Self::Status { status, message } => {
                FailureCategory::classify(false, Some(*status), message)
            }
            Self::Transport(message) | Self::Decode(message) => {
                FailureCategory::classify(false, None, message)
            }
        }
    }

    /// Message safe to show the driver; depends only on the category.
    pub fn user_message(&self) -> &'static str {
        self.category().user_message()
    }

    /// Every status in `[400, 500)` is final, 429 included; everything else
    /// may be retried. Callers wanting to wait out rate limits pass their own
    /// predicate.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => !(400 <= *status && *status < 500),
            Self::Offline(_) | Self::Timeout(_) | Self::Transport(_) | Self::Decode(_) => true,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        if e.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if e.is_connect() {
            Self::Offline(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Custom retry decision: `(error, zero-based attempt) -> retry?`.
pub type RetryPredicate = Arc<dyn Fn(&RequestError, u32) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Hard limit for a single attempt.
    pub timeout: Duration,
    predicate: Option<RetryPredicate>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("timeout", &self.timeout)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub const fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            timeout: Duration::from_millis(settings.timeout_ms),
            predicate: None,
        }
    }

    /// Single attempt with the default timeout. For non-idempotent calls.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&RequestError, u32) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Delay after the given zero-based failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Whether a failure on `attempt` should be retried. The retry budget is
    /// checked before any predicate.
    pub fn should_retry(&self, error: &RequestError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(error, attempt),
            None => error.is_retryable(),
        }
    }
}

/// Run `operation` under `policy`. The future of a timed-out attempt is
/// dropped, abandoning its in-flight work.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::time::timeout(policy.timeout, operation())
            .await
            .unwrap_or(Err(RequestError::Timeout(policy.timeout)));

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !policy.should_retry(&error, attempt) {
            debug!(attempt, error = %error, category = %error.category(), "Request failed");
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            error = %error,
            "Retrying request"
        );
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(5),
            predicate: None,
        }
    }

    fn server_error() -> RequestError {
        RequestError::Status {
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(RetryPolicy::no_retry().max_retries, 0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn retryability_by_error_kind() {
        for status in [400, 401, 403, 404, 409, 422, 429, 499] {
            let e = RequestError::Status {
                status,
                message: String::new(),
            };
            assert!(!e.is_retryable(), "{status} should be final");
        }
        for status in [500, 502, 503, 504] {
            let e = RequestError::Status {
                status,
                message: String::new(),
            };
            assert!(e.is_retryable(), "{status} should be retried");
        }
        assert!(RequestError::Offline("x".into()).is_retryable());
        assert!(RequestError::Timeout(Duration::ZERO).is_retryable());
        assert!(RequestError::Transport("reset".into()).is_retryable());
        assert!(RequestError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn categories_and_messages() {
        assert_eq!(
            RequestError::Offline("dns".into()).category(),
            FailureCategory::Offline
        );
        assert_eq!(
            RequestError::Timeout(Duration::from_secs(30)).category(),
            FailureCategory::Timeout
        );
        let unauthorized = RequestError::Status {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(unauthorized.category(), FailureCategory::Unauthorized);
        assert_eq!(
            unauthorized.user_message(),
            FailureCategory::Unauthorized.user_message()
        );
        assert_eq!(server_error().category(), FailureCategory::ServerError);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_n_plus_one_times() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<(), _> = execute(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(server_error()) }
        })
        .await;

        assert_eq!(result, Err(server_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RequestError::Status {
                    status: 404,
                    message: "Not Found".into(),
                })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_gets_a_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RequestError::Status {
                    status: 429,
                    message: "Too Many Requests".into(),
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.category(), FailureCategory::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_response_is_retried() {
        let calls = AtomicU32::new(0);
        let result = execute(&fast_policy(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RequestError::Decode("expected value at line 1".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = execute(&fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RequestError::Offline("failed to fetch".into()))
                } else {
                    Ok("offer")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("offer"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_is_retried() {
        let calls = AtomicU32::new(0);
        let mut policy = fast_policy(1);
        policy.timeout = Duration::from_secs(2);

        let result = execute(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    std::future::pending::<()>().await;
                }
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_when_budget_exhausted() {
        let result: Result<(), _> = execute(&RetryPolicy::no_retry(), || async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RequestError::Timeout(Duration::from_secs(30))));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_is_consulted_with_attempt() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let policy = fast_policy(5).with_predicate(move |_, attempt| {
            recorded.lock().unwrap().push(attempt);
            attempt < 1
        });

        let result: Result<(), _> = execute(&policy, || async { Err(server_error()) }).await;
        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
