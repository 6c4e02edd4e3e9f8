use async_trait::async_trait;
use serde_json::{json, Map, Value};

use parley_core::{ParamType, ParameterSpec, ToolBehavior, ToolDescriptor, ToolError, ToolOutput};

use crate::tool::{str_arg, Tool, ToolContext};

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

/// Reads a text file into context. Its result mirrors the file, so a newer
/// read of the same path supersedes older ones.
pub struct ReadFileTool {
    descriptor: ToolDescriptor,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("read_file", "Read a text file from the filesystem")
                .param(ParameterSpec::required(
                    "file_path",
                    ParamType::String,
                    "Path to the file, absolute or relative to the working directory",
                ))
                .param(ParameterSpec::optional(
                    "offset",
                    ParamType::Integer,
                    "Line number to start reading from (1-based)",
                ))
                .param(ParameterSpec::optional(
                    "limit",
                    ParamType::Integer,
                    "Maximum number of lines to read",
                ))
                .returns("{path, content, resource: {resourceId, lastModified, sizeBytes}}")
                .behavior(ToolBehavior::StatefulReplace)
                .requires_approval(false),
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let file_path = str_arg(&args, "file_path")?;
        let path = ctx.session.resolve_path(file_path);

        let resource = super::snapshot(&path).await?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read {}: {e}", path.display())))?;

        let offset = args
            .get("offset")
            .and_then(Value::as_u64)
            .map_or(1, |o| usize::try_from(o).unwrap_or(usize::MAX))
            .max(1);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let lines: Vec<&str> = content.lines().collect();
        let start = (offset - 1).min(lines.len());
        let end = start.saturating_add(limit).min(lines.len());

        let mut output = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            let truncated: String = line.chars().take(MAX_LINE_CHARS).collect();
            output.push_str(&format!("{:>6}\t{}\n", start + i + 1, truncated));
        }
        if output.is_empty() {
            output = "(empty file)".to_string();
        }

        let mut payload = Map::new();
        payload.insert("path".into(), json!(resource.resource_id));
        payload.insert("content".into(), json!(output));
        if end < lines.len() {
            payload.insert("truncated".into(), json!(true));
        }
        Ok(ToolOutput::from_payload(payload).with_resource(resource))
    }
}
