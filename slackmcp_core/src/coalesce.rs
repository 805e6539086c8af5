//! Single-flight coordination for cache refreshes.
//!
//! At most one refresh per store runs at any moment. Callers that arrive
//! while a refresh is in flight wait for its result instead of issuing a
//! second API call. A refresh that failed on a Slack rate limit arms a
//! cooldown window during which further attempts short-circuit to
//! `RefreshRateLimited` so a cache miss cannot stampede the API.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ServerError;

/// Stored refresh results must be cloneable to hand to every waiter.
#[derive(Debug, Clone)]
enum StoredResult {
    Ok,
    RateLimited,
    Failed(String),
}

impl StoredResult {
    fn from_error(err: &ServerError) -> StoredResult {
        match err {
            ServerError::RateLimited(_) | ServerError::RefreshRateLimited => {
                StoredResult::RateLimited
            }
            other => StoredResult::Failed(other.to_string()),
        }
    }

    fn into_result(self) -> Result<(), ServerError> {
        match self {
            StoredResult::Ok => Ok(()),
            StoredResult::RateLimited => Err(ServerError::RefreshRateLimited),
            StoredResult::Failed(msg) => Err(ServerError::Internal(msg)),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    last_finished: Option<Instant>,
    last_result: Option<StoredResult>,
    cooldown_until: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct Coalescer {
    state: Mutex<State>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` unless an equivalent run already satisfies this caller.
    ///
    /// The winner executes on a detached task so a cancelled caller does
    /// not abort a refresh other waiters (and future requests) benefit
    /// from. Waiters queue on the internal lock; any refresh that finished
    /// after a waiter arrived is returned to it as-is.
    pub async fn run<F, Fut>(&self, cooldown: Duration, op: F) -> Result<(), ServerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
    {
        let arrived = Instant::now();
        let mut st = self.state.lock().await;

        if let (Some(finished), Some(result)) = (st.last_finished, st.last_result.clone()) {
            if finished >= arrived {
                return result.into_result();
            }
        }

        if let Some(until) = st.cooldown_until {
            if Instant::now() < until {
                return Err(ServerError::RefreshRateLimited);
            }
        }

        let outcome = match tokio::spawn(op()).await {
            Ok(Ok(())) => StoredResult::Ok,
            Ok(Err(err)) => StoredResult::from_error(&err),
            Err(join_err) => StoredResult::Failed(format!("refresh task panicked: {}", join_err)),
        };

        st.last_finished = Some(Instant::now());
        st.last_result = Some(outcome.clone());
        st.cooldown_until = match outcome {
            StoredResult::RateLimited => Some(Instant::now() + cooldown),
            _ => None,
        };

        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let coalescer = Arc::new(Coalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = coalescer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                c.run(Duration::from_secs(30), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one refresh ran");
    }

    #[tokio::test]
    async fn sequential_callers_each_refresh() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            coalescer
                .run(Duration::from_secs(30), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limited_failure_arms_cooldown() {
        let coalescer = Coalescer::new();
        let err = coalescer
            .run(Duration::from_secs(30), || async {
                Err(ServerError::RateLimited(Duration::from_secs(5)))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::RefreshRateLimited));

        // The cooldown short-circuits before the closure runs.
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let err = coalescer
            .run(Duration::from_secs(30), move || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::RefreshRateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_propagate_to_waiters() {
        let coalescer = Arc::new(Coalescer::new());
        let c = coalescer.clone();
        let first = tokio::spawn(async move {
            c.run(Duration::from_secs(30), || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err(ServerError::Internal("boom".into()))
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = coalescer
            .run(Duration::from_secs(30), || async { Ok(()) })
            .await;
        assert!(first.await.unwrap().is_err());
        assert!(second.is_err(), "waiter observes the shared failure");
    }
}
