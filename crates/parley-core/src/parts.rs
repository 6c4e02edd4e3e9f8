//! Content parts.
//!
//! A [`Part`] is the atomic unit of message content. Every part carries a
//! [`PartId`] minted at construction; two parts with identical content are
//! still different parts. Cloning a part keeps its identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::PartId;

/// One atomic unit of message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub content: PartKind,
}

/// The payload of a [`Part`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartKind {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        thought: bool,
    },
    ToolCall {
        /// Model-supplied call id. Empty until the orchestrator assigns one.
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    ToolResult {
        id: String,
        name: String,
        #[serde(default)]
        payload: Map<String, Value>,
    },
    Blob {
        mime_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    ExecutableCode {
        language: String,
        code: String,
    },
    ExecutionResult {
        outcome: ExecutionOutcome,
        output: String,
    },
}

/// Result classification of an [`PartKind::ExecutionResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Ok,
    Failed,
    DeadlineExceeded,
}

impl Part {
    /// Wrap content in a new part with a freshly minted identity.
    pub fn new(content: PartKind) -> Self {
        Self {
            id: PartId::new(),
            content,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(PartKind::Text {
            text: text.into(),
            thought: false,
        })
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self::new(PartKind::Text {
            text: text.into(),
            thought: true,
        })
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::new(PartKind::ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        })
    }

    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self::new(PartKind::ToolResult {
            id: id.into(),
            name: name.into(),
            payload,
        })
    }

    pub fn blob(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(PartKind::Blob {
            mime_type: mime_type.into(),
            data,
        })
    }

    pub fn executable_code(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(PartKind::ExecutableCode {
            language: language.into(),
            code: code.into(),
        })
    }

    pub fn execution_result(outcome: ExecutionOutcome, output: impl Into<String>) -> Self {
        Self::new(PartKind::ExecutionResult {
            outcome,
            output: output.into(),
        })
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.content, PartKind::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.content, PartKind::ToolResult { .. })
    }

    /// Name of the tool this part belongs to, for calls and results.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.content {
            PartKind::ToolCall { name, .. } | PartKind::ToolResult { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Call id for calls and results.
    pub fn call_id(&self) -> Option<&str> {
        match &self.content {
            PartKind::ToolCall { id, .. } | PartKind::ToolResult { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Payload of a tool result.
    pub fn result_payload(&self) -> Option<&Map<String, Value>> {
        match &self.content {
            PartKind::ToolResult { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Plain text of a non-thought text part.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            PartKind::Text {
                text,
                thought: false,
            } => Some(text),
            _ => None,
        }
    }

    /// Short label for logs and CLI listings.
    pub fn kind_label(&self) -> &'static str {
        match self.content {
            PartKind::Text { thought: true, .. } => "thought",
            PartKind::Text { .. } => "text",
            PartKind::ToolCall { .. } => "tool_call",
            PartKind::ToolResult { .. } => "tool_result",
            PartKind::Blob { .. } => "blob",
            PartKind::ExecutableCode { .. } => "executable_code",
            PartKind::ExecutionResult { .. } => "execution_result",
        }
    }
}

/// Serde helper encoding blob bytes as base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
