//! Per-call outcomes of one orchestration round.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::PartId;

/// A proposed tool call with its turn-local identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedCall {
    pub turn_local_id: String,
    pub name: String,
    pub args: Map<String, Value>,
    /// The ToolCall part this call was read from.
    pub source_part: PartId,
}

/// A user's answer for one proposed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Approve this call and every later call of the same tool.
    Always,
    Yes,
    No,
    /// Deny this call and disable the tool for the session.
    Never,
}

/// Final status of one proposed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCallStatus {
    Always,
    Yes,
    No,
    Never,
    Cancelled,
    Disabled,
    Error,
    Killed,
}

impl ToolCallStatus {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Always | Self::Yes)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Never => "NEVER",
            Self::Cancelled => "CANCELLED",
            Self::Disabled => "DISABLED",
            Self::Error => "ERROR",
            Self::Killed => "KILLED",
        }
    }
}

impl From<Decision> for ToolCallStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Always => Self::Always,
            Decision::Yes => Self::Yes,
            Decision::No => Self::No,
            Decision::Never => Self::Never,
        }
    }
}

/// Produced once per proposed call per turn, whether or not it executed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallOutcome {
    pub call: IdentifiedCall,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ToolCallOutcome {
    pub fn new(call: IdentifiedCall, status: ToolCallStatus) -> Self {
        Self {
            call,
            status,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}
