use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use super::ProviderError;

/// Outcome of one request attempt, as classified by the backend.
#[derive(Debug)]
pub enum AttemptError {
    /// The backend signalled a rate limit; worth retrying
    RateLimited(String),
    /// Anything else; returned to the caller immediately
    Fatal(ProviderError),
}

impl From<ProviderError> for AttemptError {
    fn from(e: ProviderError) -> Self {
        AttemptError::Fatal(e)
    }
}

/// Exponential backoff applied to rate-limited attempts only.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Unit of the backoff; the wait after failed attempt `n` is `base * (2^n + jitter)`
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts, base }
    }

    /// Wait before the next attempt, after `failed_attempt` (1-based) was rate limited.
    /// `jitter` is expected in `[0, 1)`.
    pub fn backoff(&self, failed_attempt: u32, jitter: f64) -> Duration {
        let exp = 2f64.powi(failed_attempt.min(16) as i32);
        self.base.mul_f64(exp + jitter.clamp(0.0, 1.0))
    }
}

/// Run `op` until it succeeds, fails hard, or the attempt budget is spent on rate limits.
/// No wait follows the last attempt.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, provider: &str, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::RateLimited(detail)) => {
                if attempt >= max_attempts {
                    error!(provider, attempts = attempt, "rate limit retries exhausted: {}", detail);
                    return Err(ProviderError::RateLimited { attempts: attempt });
                }
                let jitter: f64 = rand::thread_rng().gen();
                let wait = policy.backoff(attempt, jitter);
                warn!(
                    provider,
                    attempt,
                    max_attempts,
                    "rate limited, retrying in {:.1}s",
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, 0.0), Duration::from_secs(2));
        assert_eq!(policy.backoff(2, 0.0), Duration::from_secs(4));
        assert_eq!(policy.backoff(2, 0.5), Duration::from_millis(4500));
        // jitter is bounded to one unit
        assert_eq!(policy.backoff(1, 7.0), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn two_rate_limits_then_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = with_retry(&RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(AttemptError::RateLimited("429".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(8), "waited {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::RateLimited("RESOURCE_EXHAUSTED".to_string())) }
        })
        .await;

        match result {
            Err(ProviderError::RateLimited { attempts }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two waits only: nothing after the last attempt
        assert!(start.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AttemptError::Fatal(ProviderError::Http {
                    status: 401,
                    body: "bad key".to_string(),
                }))
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Http { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
