use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Bounded exponential backoff used by outbound HTTP clients.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u8,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_ms: 200,
            max_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based retry.
    pub fn delay(&self, retry: u8) -> Duration {
        calculate_backoff(retry, self.base_ms, self.max_ms)
    }

    pub fn should_retry(&self, retries_done: u8) -> bool {
        retries_done < self.max_retries
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}
