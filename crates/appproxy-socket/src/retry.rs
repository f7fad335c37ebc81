//! Reconnection backoff.

use appproxy_core::{ProxyError, Result, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff applied when (re)establishing a connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Maximum connection attempts.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor.
    pub multiplier: f64,
    /// Whether to add up to 25% jitter.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32 - 1);
        let capped = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64);

        if self.jitter {
            let factor = 1.0 + rand::random::<f64>() * 0.25;
            Duration::from_millis((capped.as_millis() as f64 * factor) as u64)
        } else {
            capped
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retriable error,
    /// or the attempts are exhausted.
    pub async fn retry<F, Fut, T>(&self, target: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        target_addr = %target,
                        attempt,
                        error = %e,
                        "giving up on connection"
                    );
                    return Err(ProxyError::transport(format!(
                        "{target} unreachable after {attempt} attempts: {}",
                        e.message()
                    )));
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        target_addr = %target,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connection failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
