//! Observable chat status.

use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

use parley_context::ContextStore;

/// What the chat is doing right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    BuildingContext,
    CallingModel,
    Retrying { attempt: u32, max_attempts: u32 },
    AwaitingConfirmation,
    ExecutingTools,
    /// Terminal until the user resumes.
    Failed,
}

impl Phase {
    /// Idle chats accept injected job notifications.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::BuildingContext => f.write_str("building context"),
            Self::CallingModel => f.write_str("calling model"),
            Self::Retrying {
                attempt,
                max_attempts,
            } => write!(f, "retrying ({attempt}/{max_attempts})"),
            Self::AwaitingConfirmation => f.write_str("awaiting confirmation"),
            Self::ExecutingTools => f.write_str("executing tools"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    phase: Phase,
    last_error: Option<String>,
    executing_tool: Option<String>,
}

/// Shared by the turn loop, the orchestrator and the job runner.
#[derive(Debug, Default)]
pub struct ChatStatus {
    state: RwLock<State>,
}

impl ChatStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase().is_idle()
    }

    pub fn set_phase(&self, phase: Phase) {
        let mut state = self.state.write();
        state.phase = phase;
        if phase != Phase::ExecutingTools {
            state.executing_tool = None;
        }
    }

    pub fn set_executing_tool(&self, name: Option<&str>) {
        self.state.write().executing_tool = name.map(str::to_string);
    }

    /// Enter the terminal failed phase with a summary of the cause.
    pub fn fail(&self, summary: impl Into<String>) {
        let mut state = self.state.write();
        state.phase = Phase::Failed;
        state.executing_tool = None;
        state.last_error = Some(summary.into());
    }

    pub fn clear_error(&self) {
        self.state.write().last_error = None;
    }

    pub fn report(&self, context: &ContextStore) -> StatusReport {
        let state = self.state.read();
        StatusReport {
            current_phase: state.phase,
            last_error_summary: state.last_error.clone(),
            token_usage_ratio: context.token_usage_ratio(),
            executing_tool_name: state.executing_tool.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub current_phase: Phase,
    pub last_error_summary: Option<String>,
    /// Last reported total tokens over the configured threshold.
    pub token_usage_ratio: f64,
    pub executing_tool_name: Option<String>,
}

impl StatusReport {
    /// Percentage, or "N/A" when no usage has been reported.
    pub fn token_usage_display(&self) -> String {
        if self.token_usage_ratio > 0.0 {
            format!("{:.1}%", self.token_usage_ratio * 100.0)
        } else {
            "N/A".to_string()
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "phase:       {}", self.current_phase)?;
        writeln!(f, "token usage: {}", self.token_usage_display())?;
        if let Some(tool) = &self.executing_tool_name {
            writeln!(f, "executing:   {tool}")?;
        }
        if let Some(error) = &self.last_error_summary {
            writeln!(f, "last error:  {error}")?;
        }
        Ok(())
    }
}
