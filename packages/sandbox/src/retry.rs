// ABOUTME: Bounded fixed-interval polling used for container-state and readiness probes
// ABOUTME: Attempt cap and interval are parameters so tests can poll with millisecond spacing

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Fixed-interval retry with an attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `probe` until it reports ready or the attempt cap is reached.
    ///
    /// Returns the 1-based attempt on which the probe succeeded, or `None` once the
    /// budget is spent. There is no sleep after the final failed attempt.
    pub async fn poll_until<F, Fut>(&self, what: &str, mut probe: F) -> Option<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            if probe().await {
                return Some(attempt);
            }
            debug!(
                "Waiting for {} to be ready, attempt {}/{}",
                what, attempt, self.max_attempts
            );
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        None
    }

    /// Upper bound on wall-clock time spent sleeping between attempts
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(1))
    }
}
