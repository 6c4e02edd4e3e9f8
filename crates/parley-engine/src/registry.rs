use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{BehaviorLookup, ToolBehavior, ToolDescriptor};

use crate::error::EngineError;
use crate::tool::Tool;

/// Registry of invocable tools, built once at startup.
///
/// Also answers behavior lookups for the context store, so pruning and
/// orchestration always agree on how a tool's parts age.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its descriptor name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), EngineError> {
        let name = tool.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(EngineError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| t.descriptor())
    }

    /// Whether calls to this tool go through confirmation. Unknown tools do.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.descriptor(name).map_or(true, |d| d.requires_approval)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptors advertised to the model, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor().clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorLookup for ToolRegistry {
    fn behavior_of(&self, tool_name: &str) -> ToolBehavior {
        self.descriptor(tool_name)
            .map(|d| d.behavior)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoTool;

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("read_file"))).unwrap();

        assert!(registry.contains("read_file"));
        assert!(!registry.contains("write_file"));
        assert_eq!(registry.count(), 1);
        assert!(registry.get("read_file").is_some());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("grep"))).unwrap();
        let err = registry.register(Arc::new(EchoTool::new("grep"))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTool(name) if name == "grep"));
    }

    #[test]
    fn names_and_descriptors_sorted() {
        let mut registry = ToolRegistry::new();
        for name in ["grep", "bash", "read_file"] {
            registry.register(Arc::new(EchoTool::new(name))).unwrap();
        }
        assert_eq!(registry.names(), vec!["bash", "grep", "read_file"]);
        let defs = registry.descriptors();
        assert_eq!(defs[0].name, "bash");
        assert_eq!(defs[2].name, "read_file");
    }

    #[test]
    fn behavior_lookup() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(
                EchoTool::new("ls").with_behavior(ToolBehavior::Ephemeral),
            ))
            .unwrap();
        assert_eq!(registry.behavior_of("ls"), ToolBehavior::Ephemeral);
        assert_eq!(registry.behavior_of("missing"), ToolBehavior::Standard);
    }

    #[test]
    fn approval_requirements() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new("ls").auto_approved()))
            .unwrap();
        registry.register(Arc::new(EchoTool::new("rm"))).unwrap();
        assert!(!registry.requires_approval("ls"));
        assert!(registry.requires_approval("rm"));
        assert!(registry.requires_approval("missing"));
    }
}
