//! Model-call retry policy. The async loop that applies it lives in
//! `parley-llm`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts including the first, so 3 means at most 3 model calls.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomised either way, 0.0..=1.0.
    pub jitter_factor: f64,
    /// Status codes treated as transient. Everything else fails at once.
    pub retryable_status_codes: Vec<u16>,
    /// Failures remembered between successes.
    pub error_history_limit: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            retryable_status_codes: vec![429, 500, 503],
            error_history_limit: 10,
        }
    }
}

impl RetryConfig {
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay before retry number `retry` (0 for the first retry).
    ///
    /// `unit` is a sample from `[0.0, 1.0)` and picks the jitter multiplier
    /// in `[1 - jitter, 1 + jitter]`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff_ms(&self, retry: u32, unit: f64) -> u64 {
        let doubled = self
            .base_delay_ms
            .checked_shl(retry)
            .filter(|d| d >> retry == self.base_delay_ms)
            .unwrap_or(u64::MAX);
        let capped = doubled.min(self.max_delay_ms) as f64;
        let spread = (unit.clamp(0.0, 1.0) * 2.0 - 1.0) * self.jitter_factor;
        (capped * (1.0 + spread)).round().max(0.0) as u64
    }
}
