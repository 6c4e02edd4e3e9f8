use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use parley_core::{
    GenerationConfig, Message, ModelClient, ModelError, ModelResponse, Part, Usage,
};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Reply(ModelResponse),
    Error(ModelError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(ModelResponse::new(vec![Part::text(text)]))
    }

    pub fn parts(parts: Vec<Part>) -> Self {
        Self::Reply(ModelResponse::new(parts))
    }

    pub fn empty() -> Self {
        Self::Reply(ModelResponse::default())
    }

    pub fn status(status: u16) -> Self {
        Self::Error(ModelError::from_status(status, format!("mock status {status}")))
    }

    pub fn with_usage(self, total_tokens: u64) -> Self {
        match self {
            Self::Reply(r) => Self::Reply(r.with_usage(Usage {
                prompt_tokens: total_tokens / 2,
                candidate_tokens: total_tokens - total_tokens / 2,
                total_tokens,
            })),
            other => other,
        }
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock client that returns pre-programmed responses in sequence.
///
/// With [`MockModelClient::always`] the single response is repeated forever.
pub struct MockModelClient {
    responses: Vec<MockResponse>,
    repeat_last: bool,
    call_count: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockModelClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: MockResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every context this client was sent, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        context: &[Message],
        _config: &GenerationConfig,
    ) -> Result<ModelResponse, ModelError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(context.to_vec());

        let response = match self.responses.get(idx) {
            Some(r) => r.clone(),
            None if self.repeat_last && !self.responses.is_empty() => {
                self.responses[self.responses.len() - 1].clone()
            }
            None => {
                return Err(ModelError::InvalidResponse(format!(
                    "MockModelClient: no response configured for call {idx}"
                )))
            }
        };
        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively.
async fn resolve_response(response: MockResponse) -> Result<ModelResponse, ModelError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Reply(r) => return Ok(r),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
