use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// One retry abstraction for every transient failure class: bounded
/// attempts, exponential backoff, and a jitter fraction so parallel
/// workers do not retry in lockstep.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the computed delay added or removed at random, in [0, 1].
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). Doubles per attempt,
    /// capped at `max_delay_ms`, then jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let capped = attempt.min(16) - 1;
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << capped)
            .min(self.max_delay_ms);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Duration::from_millis(exponential);
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        Duration::from_millis((exponential as f64 * factor) as u64)
    }

    /// Runs `operation` up to `max_attempts` times, sleeping between
    /// attempts. `is_retryable` decides whether an error is transient;
    /// permanent errors are returned immediately.
    pub async fn run<T, E, F, Fut, R>(&self, mut operation: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < attempts && is_retryable(&error) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
