//! Scripted tools and fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use parley_context::{ContextConfig, ContextStore, ResourceTracker};
use parley_core::{SessionId, ToolBehavior, ToolDescriptor, ToolError, ToolOutput};

use crate::registry::ToolRegistry;
use crate::tool::{SessionHandle, Tool, ToolContext};

pub enum Script {
    Echo,
    Fail(&'static str),
    Panic,
    Sleep(Duration),
}

/// Tool whose behavior is scripted; counts invocations.
pub struct EchoTool {
    descriptor: ToolDescriptor,
    script: Script,
    pub calls: Arc<AtomicUsize>,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: ToolDescriptor::new(name, "test tool"),
            script: Script::Echo,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_behavior(mut self, behavior: ToolBehavior) -> Self {
        self.descriptor = self.descriptor.behavior(behavior);
        self
    }

    pub fn auto_approved(mut self) -> Self {
        self.descriptor = self.descriptor.requires_approval(false);
        self
    }

    pub fn scripted(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        args: Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Echo => Ok(ToolOutput::from_payload(args)),
            Script::Fail(reason) => Err(ToolError::ExecutionFailed((*reason).to_string())),
            Script::Panic => panic!("tool blew up"),
            Script::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(ToolOutput::output("slept"))
            }
        }
    }
}

pub fn session(registry: &Arc<ToolRegistry>) -> SessionHandle {
    let context = Arc::new(ContextStore::new(
        ContextConfig::default(),
        Arc::clone(registry) as Arc<dyn parley_core::BehaviorLookup>,
    ));
    SessionHandle::new(SessionId::new(), context, ResourceTracker::filesystem())
}
