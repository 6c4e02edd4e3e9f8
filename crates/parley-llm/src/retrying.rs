use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use parley_core::{GenerationConfig, Message, ModelClient, ModelError, ModelResponse, RetryConfig};

/// One failed model call, kept until the next success.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    /// 1-based attempt number within its call.
    pub attempt: u32,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

/// Wraps a [`ModelClient`] with allow-list retry.
///
/// - `max_retries` is the total attempt budget: 3 means at most 3 calls
/// - only status codes in `retryable_status_codes` are retried; everything
///   else, network errors included, fails immediately
/// - exponential backoff with jitter between attempts
/// - failures go into a bounded history that is cleared on success
pub struct RetryingClient {
    inner: Arc<dyn ModelClient>,
    config: RetryConfig,
    history: Mutex<VecDeque<ErrorRecord>>,
    total_retries: AtomicU64,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ModelClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            history: Mutex::new(VecDeque::new()),
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: Arc<dyn ModelClient>) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Failures since the last success, oldest first.
    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// One-line summary of the most recent failure.
    pub fn last_error_summary(&self) -> Option<String> {
        self.history
            .lock()
            .back()
            .map(|r| format!("{} (attempt {}): {}", r.kind, r.attempt, r.message))
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let unit: f64 = rand::thread_rng().gen();
        Duration::from_millis(self.config.backoff_ms(attempt, unit))
    }

    fn record_error(&self, attempt: u32, error: &ModelError) {
        let mut history = self.history.lock();
        history.push_back(ErrorRecord {
            at: Utc::now(),
            attempt,
            kind: error.error_kind(),
            status: error.status_code(),
            message: error.to_string(),
        });
        while history.len() > self.config.error_history_limit.max(1) {
            history.pop_front();
        }
    }

    /// Send with retry, calling `on_retry(next_attempt, error, delay)` before
    /// each backoff sleep.
    pub async fn send_with_retry<F>(
        &self,
        context: &[Message],
        generation: &GenerationConfig,
        mut on_retry: F,
    ) -> Result<ModelResponse, ModelError>
    where
        F: FnMut(u32, &ModelError, Duration) + Send,
    {
        let attempts = self.config.attempts();
        let mut attempt = 1;
        loop {
            match self.inner.send(context, generation).await {
                Ok(response) => {
                    if !self.history.lock().is_empty() {
                        info!(attempt, "model call recovered");
                    }
                    self.history.lock().clear();
                    return Ok(response);
                }
                Err(e) => {
                    self.record_error(attempt, &e);
                    if !e.is_retryable(&self.config.retryable_status_codes) {
                        warn!(attempt, kind = e.error_kind(), error = %e, "model call failed, not retryable");
                        return Err(e);
                    }
                    if attempt >= attempts {
                        warn!(attempts, error = %e, "model call failed, retries exhausted");
                        return Err(e);
                    }

                    let delay = self.retry_delay(attempt - 1);
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after error"
                    );
                    on_retry(attempt + 1, &e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(
        &self,
        context: &[Message],
        config: &GenerationConfig,
    ) -> Result<ModelResponse, ModelError> {
        self.send_with_retry(context, config, |_, _, _| {}).await
    }
}
