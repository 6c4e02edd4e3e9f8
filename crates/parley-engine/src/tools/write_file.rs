use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

use parley_core::{ParamType, ParameterSpec, ToolDescriptor, ToolError, ToolOutput};

use crate::tool::{str_arg, Tool, ToolContext};

/// Writes a file, refusing when the file changed since the version the model saw.
///
/// The expected version comes from `expectedLastModified`, or failing that
/// from the newest snapshot of the file held in context. A new file has no
/// expected version.
pub struct WriteFileTool {
    descriptor: ToolDescriptor,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("write_file", "Write content to a file")
                .param(ParameterSpec::required(
                    "file_path",
                    ParamType::String,
                    "Path to the file, absolute or relative to the working directory",
                ))
                .param(ParameterSpec::required("content", ParamType::String, "Full new content"))
                .param(ParameterSpec::optional(
                    "expectedLastModified",
                    ParamType::Integer,
                    "lastModified of the version you read; the write fails if the file changed since",
                ))
                .returns("{path, bytesWritten, lastModified}"),
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let file_path = str_arg(&args, "file_path")?;
        let content = str_arg(&args, "content")?;
        let path = ctx.session.resolve_path(file_path);
        let resource_id = path.to_string_lossy().into_owned();

        if tokio::fs::try_exists(&path).await? {
            let expected = match args.get("expectedLastModified") {
                Some(v) => Some(v.as_i64().ok_or_else(|| {
                    ToolError::InvalidArguments("expectedLastModified must be an integer".into())
                })?),
                None => ctx
                    .session
                    .context
                    .resources()
                    .into_iter()
                    .find(|r| r.resource_id == resource_id)
                    .map(|r| r.last_modified),
            };
            if let Some(expected) = expected {
                let current = super::snapshot(&path).await?;
                if current.last_modified != expected {
                    warn!(path = %resource_id, expected, found = current.last_modified, "write refused, file changed");
                    return Err(ToolError::Conflict(format!(
                        "{resource_id} changed on disk since it was read (expected lastModified {expected}, found {}); read it again before writing",
                        current.last_modified
                    )));
                }
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to write {resource_id}: {e}")))?;
        let written = super::snapshot(&path).await?;

        let mut payload = Map::new();
        payload.insert("path".into(), json!(resource_id));
        payload.insert("bytesWritten".into(), json!(content.len()));
        payload.insert("lastModified".into(), json!(written.last_modified));
        Ok(ToolOutput::from_payload(payload))
    }
}
