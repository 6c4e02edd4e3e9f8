//! Built-in file tools.

mod list_dir;
mod read_file;
mod write_file;

use std::path::Path;
use std::sync::Arc;

use parley_context::tracker::file_meta;
use parley_core::{StatefulResource, ToolError};

pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

use crate::error::EngineError;
use crate::registry::ToolRegistry;

/// Registry holding every built-in tool.
pub fn builtin_registry() -> Result<ToolRegistry, EngineError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new()))?;
    registry.register(Arc::new(WriteFileTool::new()))?;
    registry.register(Arc::new(ListDirTool::new()))?;
    Ok(registry)
}

/// Resource snapshot of a file as it is on disk now.
async fn snapshot(path: &Path) -> Result<StatefulResource, ToolError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("failed to stat {}: {e}", path.display())))?;
    let live = file_meta(&meta).map_err(ToolError::ExecutionFailed)?;
    Ok(StatefulResource::new(
        path.to_string_lossy(),
        live.last_modified,
        live.size_bytes,
    ))
}


#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{BehaviorLookup, ToolBehavior};

    #[test]
    fn builtins_declare_behaviors() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.names(), vec!["list_dir", "read_file", "write_file"]);
        assert_eq!(registry.behavior_of("read_file"), ToolBehavior::StatefulReplace);
        assert_eq!(registry.behavior_of("list_dir"), ToolBehavior::Ephemeral);
        assert_eq!(registry.behavior_of("write_file"), ToolBehavior::Standard);
        assert!(registry.requires_approval("write_file"));
        assert!(!registry.requires_approval("read_file"));
    }
}
