use async_trait::async_trait;

use crate::messages::{Message, Usage};
use crate::parts::Part;
use crate::tools::ToolDescriptor;

/// Options sent with every model request.
#[derive(Clone, Debug, Default)]
pub struct GenerationConfig {
    pub system_instruction: Option<String>,
    pub tools: Vec<ToolDescriptor>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

/// What the model returned for one request.
#[derive(Clone, Debug, Default)]
pub struct ModelResponse {
    pub parts: Vec<Part>,
    pub usage: Option<Usage>,
}

impl ModelResponse {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts, usage: None }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// A response with no parts carries nothing the engine can act on.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Errors surfaced by a [`ModelClient`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Retryable iff the error carries a status code on the allow-list.
    pub fn is_retryable(&self, allow_list: &[u16]) -> bool {
        self.status_code().is_some_and(|s| allow_list.contains(&s))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Status { status: 429, .. } => "rate_limited",
            Self::Status { status: 401 | 403, .. } => "authentication_failed",
            Self::Status { status: 500..=599, .. } => "server_error",
            Self::Status { .. } => "status",
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// The remote generative model, treated as a black box.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        context: &[Message],
        config: &GenerationConfig,
    ) -> Result<ModelResponse, ModelError>;
}
