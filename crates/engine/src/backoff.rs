//! Linear backoff shared by session retries, post-scroll settling, and
//! crawl navigation retries

use std::time::Duration;

use crate::config::RetryConfig;

/// `delay(attempt) = min(base * attempt, cap)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Fixed delay regardless of attempt number
    pub fn constant(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn from_retry(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.max(1)).min(self.cap)
    }

    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
