//! Background execution of tool calls flagged `"async": true`.
//!
//! Jobs are never cancelled once started. When one finishes, a notification
//! is injected into the context only if the chat is idle; otherwise it is
//! dropped with a warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use parley_core::{IdentifiedCall, JobId, Message, Part};

use crate::failure::FailureTracker;
use crate::status::ChatStatus;
use crate::tool::{invoke_guarded, Invocation, SessionHandle, Tool, ToolContext};

/// Argument key requesting background execution.
pub const ASYNC_ARG: &str = "async";

/// Whether the call asked to run in the background.
pub fn wants_async(args: &Map<String, Value>) -> bool {
    args.get(ASYNC_ARG).and_then(Value::as_bool).unwrap_or(false)
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: JobId,
    pub tool_name: String,
    pub call_id: String,
    pub started_at: DateTime<Utc>,
}

pub struct JobRunner {
    status: Arc<ChatStatus>,
    failures: Arc<FailureTracker>,
    timeout: Duration,
    active: Arc<Mutex<HashMap<JobId, JobInfo>>>,
    tasks: TaskTracker,
}

impl JobRunner {
    pub fn new(status: Arc<ChatStatus>, failures: Arc<FailureTracker>, timeout: Duration) -> Self {
        Self {
            status,
            failures,
            timeout,
            active: Arc::new(Mutex::new(HashMap::new())),
            tasks: TaskTracker::new(),
        }
    }

    pub fn active(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.active.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    /// Start a job and return its id immediately.
    pub fn spawn(
        &self,
        tool: Arc<dyn Tool>,
        call: &IdentifiedCall,
        mut args: Map<String, Value>,
        session: SessionHandle,
    ) -> JobId {
        args.remove(ASYNC_ARG);
        let job_id = JobId::new();
        let info = JobInfo {
            job_id: job_id.clone(),
            tool_name: call.name.clone(),
            call_id: call.turn_local_id.clone(),
            started_at: Utc::now(),
        };
        self.active.lock().insert(job_id.clone(), info.clone());
        info!(job_id = %job_id, tool = %info.tool_name, "background job started");

        let status = Arc::clone(&self.status);
        let failures = Arc::clone(&self.failures);
        let active = Arc::clone(&self.active);
        let timeout = self.timeout;
        self.tasks.spawn(async move {
            let ctx = ToolContext {
                session: session.clone(),
                call_id: info.call_id.clone(),
                cancel: CancellationToken::new(),
            };
            let invocation = invoke_guarded(tool.as_ref(), args.clone(), &ctx, timeout).await;
            active.lock().remove(&info.job_id);
            match &invocation {
                Invocation::Completed(_) => failures.record_success(&info.tool_name, &args),
                _ => failures.record_failure(&info.tool_name, &args),
            }

            let line = notification(&info, &invocation);
            // Best effort: a turn starting between this check and the add
            // still sees the notification.
            if status.is_idle() {
                session.context.add(Message::feedback(vec![Part::text(line)]));
                info!(job_id = %info.job_id, "background job finished, notification injected");
            } else {
                warn!(job_id = %info.job_id, "background job finished while chat busy, notification dropped");
            }
        });
        job_id
    }

    /// Wait for every job started so far.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

fn notification(info: &JobInfo, invocation: &Invocation) -> String {
    let head = format!(
        "Background job {} ({} [{}])",
        info.job_id, info.tool_name, info.call_id
    );
    match invocation {
        Invocation::Completed(output) => {
            let payload = serde_json::to_string(&output.payload).unwrap_or_default();
            format!("{head} finished: {payload}")
        }
        Invocation::Failed(e) => format!("{head} failed: {e}"),
        Invocation::Panicked(message) => format!("{head} crashed: {message}"),
        Invocation::TimedOut(d) => format!("{head} was killed after {}ms", d.as_millis()),
    }
}
