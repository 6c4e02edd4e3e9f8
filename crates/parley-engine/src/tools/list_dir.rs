use async_trait::async_trait;
use serde_json::{json, Map, Value};

use parley_core::{ParamType, ParameterSpec, ToolBehavior, ToolDescriptor, ToolError, ToolOutput};

use crate::tool::{Tool, ToolContext};

/// Lists a directory. Listings go stale quickly, so they age out of context.
pub struct ListDirTool {
    descriptor: ToolDescriptor,
}

impl ListDirTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("list_dir", "List the entries of a directory")
                .param(ParameterSpec::optional(
                    "path",
                    ParamType::String,
                    "Directory to list; defaults to the working directory",
                ))
                .returns("{path, entries: [name]} with directories suffixed by '/'")
                .behavior(ToolBehavior::Ephemeral)
                .requires_approval(false),
        }
    }
}

impl Default for ListDirTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let path = match args.get("path").and_then(Value::as_str) {
            Some(p) => ctx.session.resolve_path(p),
            None => ctx.session.working_directory.clone(),
        };
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to list {}: {e}", path.display())))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let mut payload = Map::new();
        payload.insert("path".into(), json!(path.to_string_lossy()));
        payload.insert("entries".into(), json!(entries));
        Ok(ToolOutput::from_payload(payload))
    }
}
