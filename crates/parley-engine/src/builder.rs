//! Wires a ready-to-run session from settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use parley_context::{ContextConfig, ContextStore, ResourceTracker};
use parley_core::{BehaviorLookup, Message, ModelClient, SessionId};
use parley_llm::RetryingClient;
use parley_settings::ParleySettings;
use parley_store::SessionStore;

use crate::confirm::Confirmation;
use crate::error::EngineError;
use crate::orchestrator::{OrchestratorConfig, ToolOrchestrator};
use crate::providers::ResourceStatusProvider;
use crate::registry::ToolRegistry;
use crate::status::ChatStatus;
use crate::tool::SessionHandle;
use crate::tools::builtin_registry;
use crate::turn::{TurnConfig, TurnLoop};

pub fn context_config(settings: &ParleySettings) -> ContextConfig {
    ContextConfig {
        turns_to_keep: settings.context.turns_to_keep,
        token_threshold: settings.context.token_threshold,
    }
}

pub fn orchestrator_config(settings: &ParleySettings) -> OrchestratorConfig {
    OrchestratorConfig {
        tool_timeout: Duration::from_millis(settings.tools.tool_timeout_ms),
        failure_threshold: u32::try_from(settings.tools.failure_threshold).unwrap_or(u32::MAX),
        failure_window: Duration::from_secs(settings.tools.failure_window_secs),
    }
}

pub fn turn_config(settings: &ParleySettings) -> TurnConfig {
    TurnConfig {
        max_iterations: u32::try_from(settings.tools.max_iterations).unwrap_or(u32::MAX),
        provider_timeout: Duration::from_millis(settings.providers.timeout_ms),
    }
}

/// Everything one running session needs, sharing a single status.
pub struct Engine {
    pub turn: TurnLoop,
    pub orchestrator: Arc<ToolOrchestrator>,
    pub client: Arc<RetryingClient>,
    pub status: Arc<ChatStatus>,
}

pub struct EngineBuilder {
    settings: ParleySettings,
    client: Arc<dyn ModelClient>,
    confirmation: Arc<dyn Confirmation>,
    registry: Option<ToolRegistry>,
    backup: Option<Arc<dyn SessionStore>>,
    session_id: SessionId,
    working_directory: Option<PathBuf>,
    history: Vec<Message>,
}

impl EngineBuilder {
    pub fn new(
        settings: ParleySettings,
        client: Arc<dyn ModelClient>,
        confirmation: Arc<dyn Confirmation>,
    ) -> Self {
        Self {
            settings,
            client,
            confirmation,
            registry: None,
            backup: None,
            session_id: SessionId::new(),
            working_directory: None,
            history: Vec::new(),
        }
    }

    /// Replace the built-in tools.
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Back up after every mutation when backups are enabled in settings.
    pub fn backup(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.backup = Some(store);
        self
    }

    /// Resume an existing session.
    pub fn resume(mut self, session_id: SessionId, history: Vec<Message>) -> Self {
        self.session_id = session_id;
        self.history = history;
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let registry = Arc::new(match self.registry {
            Some(registry) => registry,
            None => builtin_registry()?,
        });

        let mut context = ContextStore::new(
            context_config(&self.settings),
            Arc::clone(&registry) as Arc<dyn BehaviorLookup>,
        );
        if let Some(store) = self.backup.filter(|_| self.settings.context.backup_enabled) {
            context = context.with_backup(store, self.session_id.clone());
        }
        if !self.history.is_empty() {
            context.replace_all(self.history);
        }

        let mut session = SessionHandle::new(
            self.session_id,
            Arc::new(context),
            ResourceTracker::filesystem(),
        );
        if let Some(dir) = self.working_directory {
            session = session.with_working_directory(dir);
        }

        let status = Arc::new(ChatStatus::new());
        let client = Arc::new(RetryingClient::new(self.client, self.settings.retry.clone()));
        let orchestrator = Arc::new(ToolOrchestrator::new(
            registry,
            self.confirmation,
            Arc::clone(&status),
            orchestrator_config(&self.settings),
        ));
        let mut turn = TurnLoop::new(
            session,
            Arc::clone(&client),
            Arc::clone(&orchestrator),
            Arc::clone(&status),
            turn_config(&self.settings),
        );
        if self.settings.providers.resource_overview {
            turn = turn.with_provider(Arc::new(ResourceStatusProvider));
        }
        info!(session_id = %turn.session().session_id, tools = orchestrator.registry().count(), "engine ready");

        Ok(Engine {
            turn,
            orchestrator,
            client,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AutoApprove;
    use parley_llm::{MockModelClient, MockResponse};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn configs_follow_settings() {
        let mut settings = ParleySettings::default();
        settings.tools.tool_timeout_ms = 1500;
        settings.tools.max_iterations = 7;
        settings.providers.timeout_ms = 250;
        settings.context.turns_to_keep = 2;

        assert_eq!(orchestrator_config(&settings).tool_timeout, Duration::from_millis(1500));
        assert_eq!(turn_config(&settings).max_iterations, 7);
        assert_eq!(turn_config(&settings).provider_timeout, Duration::from_millis(250));
        assert_eq!(context_config(&settings).turns_to_keep, 2);
    }

    #[tokio::test]
    async fn resumed_session_keeps_history() {
        let mock = Arc::new(MockModelClient::new(vec![MockResponse::text("welcome back")]));
        let id = SessionId::new();
        let engine = EngineBuilder::new(ParleySettings::default(), mock.clone(), Arc::new(AutoApprove))
            .resume(id.clone(), vec![Message::user_text("earlier"), Message::model_text("reply")])
            .build()
            .unwrap();

        assert_eq!(engine.turn.session().session_id, id);
        assert_eq!(engine.turn.session().context.len(), 2);
        engine.turn.submit("again", &CancellationToken::new()).await;
        assert_eq!(mock.requests()[0].len(), 3);
        assert_eq!(engine.turn.session().context.len(), 4);
    }

    #[tokio::test]
    async fn backup_follows_setting() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(parley_store::FileSessionStore::new(dir.path()));
        let mut settings = ParleySettings::default();
        settings.context.backup_enabled = false;
        let mock = Arc::new(MockModelClient::new(vec![MockResponse::text("hi")]));
        let engine = EngineBuilder::new(settings, mock, Arc::new(AutoApprove))
            .backup(Arc::clone(&store))
            .build()
            .unwrap();
        engine.turn.submit("hello", &CancellationToken::new()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.list().unwrap().is_empty());
    }
}
