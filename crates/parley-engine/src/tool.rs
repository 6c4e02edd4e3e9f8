//! The invocable side of a tool and what it receives per call.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use parley_context::{ContextStore, ResourceTracker};
use parley_core::{SessionId, ToolDescriptor, ToolError, ToolOutput};

/// Explicit handle to the active session, passed to every tool invocation
/// and context provider.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub context: Arc<ContextStore>,
    pub tracker: ResourceTracker,
    pub working_directory: PathBuf,
}

impl SessionHandle {
    pub fn new(session_id: SessionId, context: Arc<ContextStore>, tracker: ResourceTracker) -> Self {
        Self {
            session_id,
            context,
            tracker,
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Resolve a tool-supplied path against the working directory.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = std::path::Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }
}

pub struct ToolContext {
    pub session: SessionHandle,
    /// Turn-local id of the call being executed.
    pub call_id: String,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn invoke(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Required string argument.
pub fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{name} is required")))
}

/// How a guarded invocation ended.
#[derive(Debug)]
pub enum Invocation {
    Completed(ToolOutput),
    Failed(ToolError),
    Panicked(String),
    TimedOut(Duration),
}

/// Invoke a tool under a timeout, converting panics into values.
pub async fn invoke_guarded(
    tool: &dyn Tool,
    args: Map<String, Value>,
    ctx: &ToolContext,
    timeout: Duration,
) -> Invocation {
    let name = tool.descriptor().name.as_str();
    let guarded = AssertUnwindSafe(tool.invoke(args, ctx)).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(Ok(output))) => Invocation::Completed(output),
        Ok(Ok(Err(e))) => Invocation::Failed(e),
        Ok(Err(panic)) => {
            let message = panic_message(&panic);
            error!(tool = name, call_id = %ctx.call_id, panic = %message, "tool panicked");
            Invocation::Panicked(message)
        }
        Err(_) => {
            warn!(tool = name, call_id = %ctx.call_id, timeout_ms = timeout.as_millis() as u64, "tool timed out");
            Invocation::TimedOut(timeout)
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    }
}
