//! Proactive rate limiting and retry for Slack API calls.
//!
//! Slack buckets its Web API methods into tiers (Tier 2 ≈ 20 req/min,
//! Tier 3 ≈ 50 req/min). Every outbound call waits on the tier's token
//! bucket before firing, and retryable errors (429 with Retry-After) are
//! retried up to a small bound. The classification of "retryable" is
//! supplied by the caller so this module stays free of Slack specifics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ServerError;

/// Slack rate-limit tiers. `limiter()` returns the process-wide bucket
/// shared by every handler and every token variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Tier1,
    Tier2,
    /// Tier 2 with a small burst allowance; Slack grants this to search.
    Tier2Boost,
    Tier3,
    Tier4,
}

static TIER1: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::per_minute(1, 1)));
static TIER2: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::per_minute(20, 1)));
static TIER2_BOOST: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::per_minute(20, 3)));
static TIER3: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::per_minute(50, 1)));
static TIER4: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::per_minute(100, 1)));

impl Tier {
    pub fn limiter(&self) -> Arc<RateLimiter> {
        match self {
            Tier::Tier1 => TIER1.clone(),
            Tier::Tier2 => TIER2.clone(),
            Tier::Tier2Boost => TIER2_BOOST.clone(),
            Tier::Tier3 => TIER3.clone(),
            Tier::Tier4 => TIER4.clone(),
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket. `acquire` suspends until a token is available; dropping
/// the future (request cancellation) abandons the wait without consuming
/// a token.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
    unlimited: bool,
}

impl RateLimiter {
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self {
            rate_per_sec: f64::from(requests) / 60.0,
            burst: f64::from(burst.max(1)),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst.max(1)),
                last_refill: Instant::now(),
            }),
            unlimited: false,
        }
    }

    /// A no-op limiter for internal, non-API calls.
    pub fn unlimited() -> Self {
        Self {
            rate_per_sec: 0.0,
            burst: 1.0,
            bucket: Mutex::new(Bucket {
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
            unlimited: true,
        }
    }

    pub async fn acquire(&self) {
        if self.unlimited {
            return;
        }
        loop {
            let wait = {
                let mut b = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(b.last_refill).as_secs_f64();
                b.tokens = (b.tokens + elapsed * self.rate_per_sec).min(self.burst);
                b.last_refill = now;
                if b.tokens >= 1.0 {
                    b.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - b.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Call `op` with proactive rate limiting and bounded retry.
///
/// `classify` maps an error to `Some(backoff)` when it is retryable or
/// `None` when it must be surfaced immediately. After `max_retries`
/// additional attempts the last error is returned as-is.
pub async fn call_with_retry<T, F, Fut, C>(
    limiter: &RateLimiter,
    max_retries: u32,
    classify: C,
    mut op: F,
) -> Result<T, ServerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServerError>>,
    C: Fn(&ServerError) -> Option<Duration>,
{
    let mut attempt = 0;
    loop {
        limiter.acquire().await;

        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                let backoff = match classify(&err) {
                    Some(d) => d,
                    None => return Err(err),
                };
                if attempt == max_retries {
                    return Err(err);
                }
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// The standard classifier for Slack calls: 429s are retryable with the
/// server-provided Retry-After, everything else is not.
pub fn slack_retry_after(err: &ServerError) -> Option<Duration> {
    err.retry_after()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> ServerError {
        ServerError::RateLimited(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn success_calls_once() {
        let rl = RateLimiter::unlimited();
        let mut calls = 0;
        let result = call_with_retry(&rl, 2, slack_retry_after, || {
            calls += 1;
            async { Ok::<_, ServerError>("ok") }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn non_retryable_error_calls_once() {
        let rl = RateLimiter::unlimited();
        let mut calls = 0;
        let err = call_with_retry(&rl, 2, slack_retry_after, || {
            calls += 1;
            async { Err::<(), _>(ServerError::InvalidInput("nope".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::InvalidInput(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let rl = RateLimiter::unlimited();
        let mut calls = 0;
        let result = call_with_retry(&rl, 2, slack_retry_after, || {
            calls += 1;
            let n = calls;
            async move {
                if n <= 2 {
                    Err(rate_limited())
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls, 3, "initial call + 2 retries");
    }

    #[tokio::test]
    async fn exhausted_retries_returns_last_error() {
        let rl = RateLimiter::unlimited();
        let mut calls = 0;
        let err = call_with_retry(&rl, 2, slack_retry_after, || {
            calls += 1;
            async { Err::<(), _>(rate_limited()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::RateLimited(_)));
        assert_eq!(calls, 3, "initial call + 2 retries");
    }

    #[tokio::test]
    async fn zero_retries_makes_one_call() {
        let rl = RateLimiter::unlimited();
        let mut calls = 0;
        let _ = call_with_retry(&rl, 0, slack_retry_after, || {
            calls += 1;
            async { Err::<(), _>(rate_limited()) }
        })
        .await;
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn burst_token_passes_immediately() {
        let rl = RateLimiter::per_minute(1, 1);
        let start = std::time::Instant::now();
        rl.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_for_refill() {
        let rl = RateLimiter::per_minute(60, 1);
        rl.acquire().await;
        let start = Instant::now();
        rl.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn tier_limiters_are_shared() {
        let a = Tier::Tier3.limiter();
        let b = Tier::Tier3.limiter();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
