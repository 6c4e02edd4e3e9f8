//! Per-turn tool call pipeline: identify, gate, execute, assemble.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use parley_core::{
    Attachment, Decision, IdentifiedCall, Message, Part, PartKind, Role, ToolCallOutcome,
    ToolCallStatus,
};

use crate::confirm::{ApprovalPreferences, Confirmation};
use crate::failure::FailureTracker;
use crate::jobs::{wants_async, JobRunner, ASYNC_ARG};
use crate::registry::ToolRegistry;
use crate::status::{ChatStatus, Phase};
use crate::tool::{invoke_guarded, Invocation, SessionHandle, ToolContext};

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub tool_timeout: Duration,
    pub failure_threshold: u32,
    pub failure_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(120),
            failure_threshold: 3,
            failure_window: Duration::from_secs(300),
        }
    }
}

/// What one orchestration round produced.
#[derive(Clone, Debug, Default)]
pub struct RoundOutcome {
    /// One per proposed call, in proposal order.
    pub outcomes: Vec<ToolCallOutcome>,
    /// Calls that actually ran (or were started in the background).
    pub executed: usize,
    pub comment: Option<String>,
}

/// A ToolResult ready to be assembled, with its side artifacts.
struct CallResult {
    call: IdentifiedCall,
    part: Part,
    attachments: Vec<Attachment>,
    /// False when the call was refused before reaching the tool.
    ran: bool,
}

pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    confirmation: Arc<dyn Confirmation>,
    preferences: ApprovalPreferences,
    failures: Arc<FailureTracker>,
    jobs: JobRunner,
    status: Arc<ChatStatus>,
    tool_timeout: Duration,
    next_call: AtomicU64,
}

impl ToolOrchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        confirmation: Arc<dyn Confirmation>,
        status: Arc<ChatStatus>,
        config: OrchestratorConfig,
    ) -> Self {
        let failures = Arc::new(FailureTracker::new(config.failure_threshold, config.failure_window));
        Self {
            registry,
            confirmation,
            preferences: ApprovalPreferences::new(),
            jobs: JobRunner::new(Arc::clone(&status), Arc::clone(&failures), config.tool_timeout),
            failures,
            status,
            tool_timeout: config.tool_timeout,
            next_call: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn preferences(&self) -> &ApprovalPreferences {
        &self.preferences
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    fn allocate_call_id(&self) -> String {
        format!("call_{}", self.next_call.fetch_add(1, Ordering::Relaxed))
    }

    /// Fill in missing ToolCall ids so every call can be linked by id.
    /// Returns how many ids were assigned.
    pub fn assign_call_ids(&self, message: &mut Message) -> usize {
        let mut assigned = 0;
        for part in &mut message.parts {
            if let PartKind::ToolCall { id, .. } = &mut part.content {
                if id.trim().is_empty() {
                    *id = self.allocate_call_id();
                    assigned += 1;
                }
            }
        }
        assigned
    }

    /// Turn-local identity for every proposed call, preferring model ids.
    pub fn identify(&self, message: &Message) -> Vec<IdentifiedCall> {
        message
            .parts
            .iter()
            .filter_map(|part| match &part.content {
                PartKind::ToolCall { id, name, args } => Some(IdentifiedCall {
                    turn_local_id: if id.trim().is_empty() {
                        self.allocate_call_id()
                    } else {
                        id.clone()
                    },
                    name: name.clone(),
                    args: args.clone(),
                    source_part: part.id.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn auto_approved(&self, tool: &str) -> bool {
        self.preferences.is_always(tool) || !self.registry.requires_approval(tool)
    }

    /// Decide every call. Unknown and disabled tools are settled without
    /// prompting; the rest go to autopilot or to the confirmation collaborator.
    pub async fn gate(
        &self,
        calls: &[IdentifiedCall],
        session: &SessionHandle,
    ) -> (Vec<ToolCallOutcome>, Option<String>) {
        let mut settled: Vec<Option<ToolCallOutcome>> = calls
            .iter()
            .map(|call| {
                if !self.registry.contains(&call.name) {
                    Some(
                        ToolCallOutcome::new(call.clone(), ToolCallStatus::Error)
                            .with_feedback(format!("unknown tool {}", call.name)),
                    )
                } else if self.preferences.is_disabled(&call.name) {
                    Some(
                        ToolCallOutcome::new(call.clone(), ToolCallStatus::Disabled)
                            .with_feedback("tool disabled for this session"),
                    )
                } else {
                    None
                }
            })
            .collect();

        let pending: Vec<IdentifiedCall> = calls
            .iter()
            .zip(&settled)
            .filter(|(_, s)| s.is_none())
            .map(|(c, _)| c.clone())
            .collect();

        let mut comment = None;
        if !pending.is_empty() {
            if pending.iter().all(|c| self.auto_approved(&c.name)) {
                debug!(calls = pending.len(), "autopilot: all calls pre-approved");
                for (slot, call) in settled.iter_mut().zip(calls) {
                    if slot.is_none() {
                        *slot = Some(ToolCallOutcome::new(call.clone(), ToolCallStatus::Always));
                    }
                }
            } else {
                self.status.set_phase(Phase::AwaitingConfirmation);
                let response = self.confirmation.prompt(&pending, session).await;
                comment = response.comment.filter(|c| !c.trim().is_empty());
                for (slot, call) in settled.iter_mut().zip(calls) {
                    if slot.is_some() {
                        continue;
                    }
                    let status = if response.cancelled {
                        ToolCallStatus::Cancelled
                    } else {
                        let decision = response
                            .decisions
                            .get(&call.turn_local_id)
                            .copied()
                            .unwrap_or(Decision::No);
                        self.preferences.remember(&call.name, decision);
                        decision.into()
                    };
                    *slot = Some(ToolCallOutcome::new(call.clone(), status));
                }
                if response.cancelled {
                    info!(calls = pending.len(), "confirmation cancelled");
                }
            }
        }

        (settled.into_iter().flatten().collect(), comment)
    }

    async fn execute_one(
        &self,
        outcome: &mut ToolCallOutcome,
        session: &SessionHandle,
    ) -> Option<CallResult> {
        let call = outcome.call.clone();
        let tool = self.registry.get(&call.name)?;
        let mut args = call.args.clone();
        let background = wants_async(&args);
        args.remove(ASYNC_ARG);

        if self.failures.is_blocked(&call.name, &args) {
            warn!(tool = %call.name, call_id = %call.turn_local_id, "call blocked after repeated failures");
            let reason = format!(
                "blocked: this exact call failed {} times recently; change the arguments or approach",
                self.failures.threshold()
            );
            outcome.status = ToolCallStatus::Error;
            outcome.feedback = Some(reason.clone());
            let mut blocked = call_result(call, error_payload(&reason), Vec::new());
            blocked.ran = false;
            return Some(blocked);
        }

        if background {
            let job_id = self.jobs.spawn(tool, &call, args, session.clone());
            let mut payload = Map::new();
            payload.insert("status".into(), json!("job_started"));
            payload.insert("jobId".into(), json!(job_id.as_str()));
            outcome.feedback = Some(format!("started as background job {job_id}"));
            return Some(call_result(call, payload, Vec::new()));
        }

        self.status.set_executing_tool(Some(&call.name));
        let ctx = ToolContext {
            session: session.clone(),
            call_id: call.turn_local_id.clone(),
            cancel: CancellationToken::new(),
        };
        let invocation = invoke_guarded(tool.as_ref(), args.clone(), &ctx, self.tool_timeout).await;
        self.status.set_executing_tool(None);

        match invocation {
            Invocation::Completed(output) => {
                self.failures.record_success(&call.name, &args);
                let mut payload = output.payload;
                if let Some(resource) = &output.resource {
                    resource.write_into(&mut payload);
                }
                Some(call_result(call, payload, output.attachments))
            }
            Invocation::Failed(e) => {
                self.failures.record_failure(&call.name, &args);
                let reason = e.to_string();
                outcome.status = ToolCallStatus::Error;
                outcome.feedback = Some(reason.clone());
                Some(call_result(call, error_payload(&reason), Vec::new()))
            }
            Invocation::Panicked(message) => {
                self.failures.record_failure(&call.name, &args);
                let reason = format!("tool crashed: {message}");
                outcome.status = ToolCallStatus::Error;
                outcome.feedback = Some(reason.clone());
                Some(call_result(call, error_payload(&reason), Vec::new()))
            }
            Invocation::TimedOut(limit) => {
                self.failures.record_failure(&call.name, &args);
                let reason = format!("killed after {}ms", limit.as_millis());
                outcome.status = ToolCallStatus::Killed;
                outcome.feedback = Some(reason.clone());
                Some(call_result(call, error_payload(&reason), Vec::new()))
            }
        }
    }

    /// Run every proposed call of a model message and append the results
    /// and feedback to the session context.
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub async fn handle(&self, message: &Message, session: &SessionHandle) -> RoundOutcome {
        let calls = self.identify(message);
        if calls.is_empty() {
            return RoundOutcome::default();
        }
        let (mut outcomes, comment) = self.gate(&calls, session).await;

        self.status.set_phase(Phase::ExecutingTools);
        let mut results = Vec::new();
        let mut executed = 0;
        for outcome in &mut outcomes {
            if !outcome.status.is_approved() {
                continue;
            }
            if let Some(result) = self.execute_one(outcome, session).await {
                if result.ran {
                    executed += 1;
                }
                results.push(result);
            }
        }

        let (tool_message, feedback) = assemble(results, &outcomes, comment.as_deref());
        if let Some(tool_message) = tool_message {
            session.context.add(tool_message);
        }
        session.context.add(feedback);

        info!(
            proposed = outcomes.len(),
            executed,
            "tool round finished"
        );
        RoundOutcome {
            outcomes,
            executed,
            comment,
        }
    }
}

fn call_result(call: IdentifiedCall, payload: Map<String, Value>, attachments: Vec<Attachment>) -> CallResult {
    let part = Part::tool_result(call.turn_local_id.clone(), call.name.clone(), payload);
    CallResult {
        call,
        part,
        attachments,
        ran: true,
    }
}

fn error_payload(reason: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("error".into(), json!(reason));
    payload
}

/// Feedback line for one outcome, citing its turn-local id.
pub fn feedback_line(outcome: &ToolCallOutcome) -> String {
    let verdict = match outcome.status {
        ToolCallStatus::Always | ToolCallStatus::Yes => "approved and executed",
        ToolCallStatus::No => "denied by the user",
        ToolCallStatus::Never => "denied by the user; tool disabled for this session",
        ToolCallStatus::Cancelled => "cancelled by the user",
        ToolCallStatus::Disabled => "not run; tool is disabled",
        ToolCallStatus::Error => "failed",
        ToolCallStatus::Killed => "killed",
    };
    let mut line = format!(
        "[{}] {} {}: {}",
        outcome.call.turn_local_id,
        outcome.call.name,
        outcome.status.as_str(),
        verdict
    );
    if let Some(feedback) = &outcome.feedback {
        line.push_str(" (");
        line.push_str(feedback);
        line.push(')');
    }
    line
}

/// Build the tool-role result message and the feedback message.
///
/// Each ToolResult is linked to its ToolCall in the tool message's map, and
/// each attachment blob to its ToolResult in the feedback message's map.
fn assemble(
    results: Vec<CallResult>,
    outcomes: &[ToolCallOutcome],
    comment: Option<&str>,
) -> (Option<Message>, Message) {
    let mut lines: Vec<String> = outcomes.iter().map(feedback_line).collect();
    if let Some(comment) = comment {
        lines.push(format!("User comment: {comment}"));
    }
    let mut feedback = Message::feedback(vec![Part::text(lines.join("\n"))]);

    if results.is_empty() {
        return (None, feedback);
    }

    let mut tool_message = Message::new(Role::Tool, Vec::with_capacity(results.len()));
    for result in results {
        let result_id = result.part.id.clone();
        tool_message.parts.push(result.part);
        tool_message.link_dependency(&result.call.source_part, &result_id);

        for attachment in result.attachments {
            let blob = Part::blob(attachment.mime_type, attachment.data);
            feedback.link_dependency(&result_id, &blob.id);
            feedback.parts.push(blob);
        }
    }
    (Some(tool_message), feedback)
}
