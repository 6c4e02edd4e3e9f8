use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::resource::StatefulResource;

/// How a tool's calls and results age in the context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolBehavior {
    /// Kept until pruned explicitly.
    #[default]
    Standard,
    /// No lasting relevance; aged out after `turns_to_keep` user turns.
    Ephemeral,
    /// Mirrors an external resource; a newer result for the same resource
    /// supersedes every older one.
    StatefulReplace,
}

/// Resolves a tool name to its declared behavior.
pub trait BehaviorLookup: Send + Sync {
    fn behavior_of(&self, tool_name: &str) -> ToolBehavior;
}

impl BehaviorLookup for HashMap<String, ToolBehavior> {
    fn behavior_of(&self, tool_name: &str) -> ToolBehavior {
        self.get(tool_name).copied().unwrap_or_default()
    }
}

/// Primitive parameter types a tool can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn schema_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One declared tool parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// Explicit tool registration: what the model is told about a tool and how
/// the engine treats its calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// Human-readable description of the result payload shape.
    pub returns: String,
    pub behavior: ToolBehavior,
    pub requires_approval: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            returns: String::new(),
            behavior: ToolBehavior::Standard,
            requires_approval: true,
        }
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }

    pub fn behavior(mut self, behavior: ToolBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn requires_approval(mut self, requires: bool) -> Self {
        self.requires_approval = requires;
        self
    }

    /// JSON schema of the parameters, as advertised to the model.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({"type": p.kind.schema_name(), "description": p.description}),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A binary artifact a tool wants shown to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub name: Option<String>,
}

/// Successful output of a tool invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub payload: Map<String, Value>,
    pub attachments: Vec<Attachment>,
    /// Declared by stateful tools; written into the result payload.
    pub resource: Option<StatefulResource>,
}

impl ToolOutput {
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Single-field payload `{"output": value}`.
    pub fn output(value: impl Into<Value>) -> Self {
        let mut payload = Map::new();
        payload.insert("output".into(), value.into());
        Self::from_payload(payload)
    }

    pub fn with_resource(mut self, resource: StatefulResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("resource conflict: {0}")]
    Conflict(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        Self::ExecutionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_lookup_defaults_to_standard() {
        let mut map = HashMap::new();
        map.insert("read_file".to_string(), ToolBehavior::StatefulReplace);
        assert_eq!(map.behavior_of("read_file"), ToolBehavior::StatefulReplace);
        assert_eq!(map.behavior_of("unknown"), ToolBehavior::Standard);
    }

    #[test]
    fn parameters_schema_lists_required() {
        let desc = ToolDescriptor::new("read_file", "Read a file")
            .param(ParameterSpec::required("path", ParamType::String, "Absolute path"))
            .param(ParameterSpec::optional("limit", ParamType::Integer, "Max bytes"));
        let schema = desc.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], json!(["path"]));
    }

    #[test]
    fn descriptor_builder_defaults() {
        let desc = ToolDescriptor::new("echo", "Echo input");
        assert_eq!(desc.behavior, ToolBehavior::Standard);
        assert!(desc.requires_approval);
        let desc = desc.behavior(ToolBehavior::Ephemeral).requires_approval(false);
        assert_eq!(desc.behavior, ToolBehavior::Ephemeral);
        assert!(!desc.requires_approval);
    }

    #[test]
    fn output_helper() {
        let out = ToolOutput::output("done");
        assert_eq!(out.payload["output"], "done");
        assert!(out.resource.is_none());
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("missing path".into());
        assert_eq!(err.to_string(), "invalid arguments: missing path");
        let err = ToolError::Timeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60"));
    }
}
