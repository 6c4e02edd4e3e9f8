use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use parley_core::{GenerationConfig, Message, ModelError, Part, PartKind, Role};
use parley_llm::RetryingClient;

use crate::orchestrator::ToolOrchestrator;
use crate::providers::{augmented_message, gather, ContextProvider};
use crate::status::{ChatStatus, Phase, StatusReport};
use crate::tool::SessionHandle;

/// Stored in place of a response that carried nothing usable.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "(the model returned no content)";

#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Model calls allowed within one user turn.
    pub max_iterations: u32,
    pub provider_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            provider_timeout: Duration::from_secs(5),
        }
    }
}

/// How a turn ended. `iterations` counts model calls made.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The model answered without proposing tool calls.
    Completed { iterations: u32 },
    /// The model returned nothing; a placeholder was stored.
    EmptyResponse { iterations: u32 },
    /// Tool calls were proposed but none ran (denied, cancelled, blocked).
    ToolsDeclined { iterations: u32 },
    /// Model call failed terminally; the user has to resume.
    Failed { error: ModelError, attempts: u32 },
    MaxIterations { iterations: u32 },
}

impl TurnOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Drives model calls and tool rounds for one session.
pub struct TurnLoop {
    session: SessionHandle,
    client: Arc<RetryingClient>,
    orchestrator: Arc<ToolOrchestrator>,
    providers: Vec<Arc<dyn ContextProvider>>,
    status: Arc<ChatStatus>,
    generation: GenerationConfig,
    config: TurnConfig,
}

impl TurnLoop {
    pub fn new(
        session: SessionHandle,
        client: Arc<RetryingClient>,
        orchestrator: Arc<ToolOrchestrator>,
        status: Arc<ChatStatus>,
        config: TurnConfig,
    ) -> Self {
        Self {
            session,
            client,
            orchestrator,
            providers: Vec::new(),
            status,
            generation: GenerationConfig::default(),
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Base generation options. The tool list is filled in per request.
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn status_report(&self) -> StatusReport {
        self.status.report(&self.session.context)
    }

    fn generation_config(&self) -> GenerationConfig {
        let preferences = self.orchestrator.preferences();
        let mut generation = self.generation.clone();
        generation.tools = self
            .orchestrator
            .registry()
            .descriptors()
            .into_iter()
            .filter(|d| !preferences.is_disabled(&d.name))
            .collect();
        generation
    }

    /// Record a user message and process the turn it opens.
    pub async fn submit(&self, text: &str, cancel: &CancellationToken) -> TurnOutcome {
        self.session.context.add(Message::user_text(text));
        self.process_turn(cancel).await
    }

    /// Call the model until it stops proposing tool calls that actually run.
    #[instrument(skip(self, cancel), fields(session_id = %self.session.session_id))]
    pub async fn process_turn(&self, cancel: &CancellationToken) -> TurnOutcome {
        self.status.clear_error();
        let mut iterations = 0u32;
        let outcome = loop {
            if iterations >= self.config.max_iterations {
                warn!(iterations, "turn stopped at iteration limit");
                break TurnOutcome::MaxIterations { iterations };
            }
            iterations += 1;

            self.status.set_phase(Phase::BuildingContext);
            let mut outbound = self.session.context.snapshot();
            let notes = gather(&self.providers, &self.session, self.config.provider_timeout, cancel).await;
            if let Some(augmented) = augmented_message(notes) {
                outbound.push(augmented);
            }

            self.status.set_phase(Phase::CallingModel);
            let generation = self.generation_config();
            let max_attempts = self.client.config().attempts();
            let mut attempts = 1u32;
            let status = Arc::clone(&self.status);
            let result = self
                .client
                .send_with_retry(&outbound, &generation, |attempt, _, _| {
                    attempts = attempt;
                    status.set_phase(Phase::Retrying {
                        attempt,
                        max_attempts,
                    });
                })
                .await;

            let response = match result {
                Ok(response) => response,
                Err(error) => {
                    let summary = self
                        .client
                        .last_error_summary()
                        .unwrap_or_else(|| error.to_string());
                    warn!(attempts, error = %error, "turn failed");
                    self.status.fail(summary);
                    return TurnOutcome::Failed { error, attempts };
                }
            };

            if !has_usable_content(&response.parts) {
                let mut placeholder = Message::model_text(EMPTY_RESPONSE_PLACEHOLDER);
                placeholder.usage = response.usage;
                self.session.context.add(placeholder);
                break TurnOutcome::EmptyResponse { iterations };
            }

            let mut message = Message::new(Role::Model, response.parts);
            message.usage = response.usage;
            self.orchestrator.assign_call_ids(&mut message);
            self.session.context.add(message.clone());

            if !message.has_tool_calls() {
                break TurnOutcome::Completed { iterations };
            }

            let round = self.orchestrator.handle(&message, &self.session).await;
            if round.executed == 0 {
                info!(proposed = round.outcomes.len(), "no tool call ran, ending turn");
                break TurnOutcome::ToolsDeclined { iterations };
            }
        };
        self.status.set_phase(Phase::Idle);
        info!(?outcome, "turn finished");
        outcome
    }
}

/// Anything other than blank text counts.
fn has_usable_content(parts: &[Part]) -> bool {
    parts.iter().any(|p| match &p.content {
        PartKind::Text { text, .. } => !text.trim().is_empty(),
        _ => true,
    })
}
