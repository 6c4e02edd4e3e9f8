//! The confirmation collaborator and per-session approval preferences.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use parley_core::{Decision, IdentifiedCall};

use crate::tool::SessionHandle;

/// A user's answer for a batch of proposed calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfirmationResponse {
    /// Keyed by turn-local call id. A call without an entry is denied.
    pub decisions: HashMap<String, Decision>,
    pub comment: Option<String>,
    /// The dialog was dismissed: every call in the batch is cancelled.
    pub cancelled: bool,
}

impl ConfirmationResponse {
    pub fn decide(mut self, call_id: impl Into<String>, decision: Decision) -> Self {
        self.decisions.insert(call_id.into(), decision);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    /// Same decision for every call in the batch.
    pub fn all(calls: &[IdentifiedCall], decision: Decision) -> Self {
        Self {
            decisions: calls
                .iter()
                .map(|c| (c.turn_local_id.clone(), decision))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn prompt(&self, calls: &[IdentifiedCall], session: &SessionHandle)
        -> ConfirmationResponse;
}

/// Approves every call once.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoApprove;

#[async_trait]
impl Confirmation for AutoApprove {
    async fn prompt(&self, calls: &[IdentifiedCall], _session: &SessionHandle) -> ConfirmationResponse {
        ConfirmationResponse::all(calls, Decision::Yes)
    }
}

/// Replays queued responses and records every prompt it receives.
/// Once the queue is empty it denies everything.
#[derive(Default)]
pub struct ScriptedConfirmation {
    responses: Mutex<VecDeque<ConfirmationResponse>>,
    prompts: Mutex<Vec<Vec<IdentifiedCall>>>,
}

impl ScriptedConfirmation {
    pub fn new(responses: Vec<ConfirmationResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Vec<IdentifiedCall>> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Confirmation for ScriptedConfirmation {
    async fn prompt(&self, calls: &[IdentifiedCall], _session: &SessionHandle) -> ConfirmationResponse {
        self.prompts.lock().push(calls.to_vec());
        self.responses.lock().pop_front().unwrap_or_default()
    }
}

/// Decisions that outlive a single prompt: `ALWAYS` and `NEVER` answers.
#[derive(Debug, Default)]
pub struct ApprovalPreferences {
    always: RwLock<HashSet<String>>,
    disabled: RwLock<HashSet<String>>,
}

impl ApprovalPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_always(&self, tool: &str) {
        self.always.write().insert(tool.to_string());
    }

    pub fn disable(&self, tool: &str) {
        self.always.write().remove(tool);
        self.disabled.write().insert(tool.to_string());
    }

    pub fn is_always(&self, tool: &str) -> bool {
        self.always.read().contains(tool)
    }

    pub fn is_disabled(&self, tool: &str) -> bool {
        self.disabled.read().contains(tool)
    }

    /// Record the lasting part of a decision.
    pub fn remember(&self, tool: &str, decision: Decision) {
        match decision {
            Decision::Always => self.allow_always(tool),
            Decision::Never => self.disable(tool),
            Decision::Yes | Decision::No => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::PartId;
    use serde_json::Map;

    fn call(id: &str) -> IdentifiedCall {
        IdentifiedCall {
            turn_local_id: id.into(),
            name: "rm".into(),
            args: Map::new(),
            source_part: PartId::new(),
        }
    }

    #[test]
    fn preferences_remember_lasting_decisions() {
        let prefs = ApprovalPreferences::new();
        prefs.remember("ls", Decision::Always);
        prefs.remember("cat", Decision::Yes);
        assert!(prefs.is_always("ls"));
        assert!(!prefs.is_always("cat"));

        prefs.remember("ls", Decision::Never);
        assert!(!prefs.is_always("ls"));
        assert!(prefs.is_disabled("ls"));
    }

    #[test]
    fn response_builders() {
        let calls = vec![call("call_1"), call("call_2")];
        let all = ConfirmationResponse::all(&calls, Decision::No);
        assert_eq!(all.decisions.len(), 2);
        assert!(!all.cancelled);

        let one = ConfirmationResponse::default()
            .decide("call_1", Decision::Yes)
            .with_comment("only the first");
        assert_eq!(one.decisions.get("call_1"), Some(&Decision::Yes));
        assert_eq!(one.comment.as_deref(), Some("only the first"));
        assert!(ConfirmationResponse::cancelled().cancelled);
    }
}
