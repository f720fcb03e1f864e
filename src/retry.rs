use serde::{Deserialize, Serialize};

/// Backoff for resubmitting asynchronous jobs.
///
/// The first submission happens inline; later attempts run on the deferred dispatcher so the
/// caller's acknowledgement never waits for a backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retrying.
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(alias = "base_delay")]
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay after a failed attempt using exponential backoff.
    /// delay = base_delay_ms * backoff_multiplier^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        if delay.is_finite() && delay < u64::MAX as f64 {
            delay as u64
        } else {
            u64::MAX
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}
