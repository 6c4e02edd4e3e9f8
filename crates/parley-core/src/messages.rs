use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PartId;
use crate::parts::{Part, PartKind};

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// Token usage reported by the model for one response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub candidate_tokens: u64,
    pub total_tokens: u64,
}

/// Dependency edges recorded by a message: `part -> parts that must be pruned with it`.
///
/// Keys and values may name parts living in any message of the context.
pub type Dependencies = BTreeMap<PartId, Vec<PartId>>;

/// One entry of the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic id assigned by the context store on insertion.
    pub sequence_id: i64,
    pub role: Role,
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
    /// Milliseconds since the previous message, derived by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// User-role message synthesised by the engine rather than typed by the user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_feedback: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    dependencies: Dependencies,
}

impl Message {
    /// Create a message with an empty dependency map.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            sequence_id: 0,
            role,
            parts,
            created_at: Utc::now(),
            elapsed_ms: None,
            usage: None,
            is_feedback: false,
            dependencies: Dependencies::new(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// A user-role message produced by the engine (feedback, notifications).
    pub fn feedback(parts: Vec<Part>) -> Self {
        let mut msg = Self::new(Role::User, parts);
        msg.is_feedback = true;
        msg
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Whether this message opens a user turn (typed by the user, not synthesised).
    pub fn is_user_turn(&self) -> bool {
        self.role == Role::User && !self.is_feedback
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Record that `a` and `b` must be pruned together.
    ///
    /// Adds both directed edges `a -> b` and `b -> a`; repeated links are no-ops.
    pub fn link_dependency(&mut self, a: &PartId, b: &PartId) {
        for (from, to) in [(a, b), (b, a)] {
            let deps = self.dependencies.entry(from.clone()).or_default();
            if !deps.contains(to) {
                deps.push(to.clone());
            }
        }
    }

    /// Drop every part whose id is in `removed`. Returns `true` if any part was dropped.
    pub fn retain_parts(&mut self, removed: &HashSet<PartId>) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| !removed.contains(&p.id));
        self.parts.len() != before
    }

    /// Drop dependency entries keyed by a removed part and filter removed parts
    /// out of every dependent list. Entries left empty are dropped.
    /// Returns `true` if the map changed.
    pub fn retain_dependencies(&mut self, removed: &HashSet<PartId>) -> bool {
        let mut changed = false;
        self.dependencies.retain(|key, deps| {
            if removed.contains(key) {
                changed = true;
                return false;
            }
            let before = deps.len();
            deps.retain(|d| !removed.contains(d));
            changed |= deps.len() != before;
            !deps.is_empty()
        });
        changed
    }

    /// Whether any dependency edge of this message touches a part in `ids`.
    pub fn references_any(&self, ids: &HashSet<PartId>) -> bool {
        self.dependencies
            .iter()
            .any(|(k, deps)| ids.contains(k) || deps.iter().any(|d| ids.contains(d)))
    }

    pub fn contains_part(&self, id: &PartId) -> bool {
        self.parts.iter().any(|p| &p.id == id)
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_tool_call())
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_tool_result())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(Part::is_tool_call)
    }

    /// Concatenated non-thought text.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match &p.content {
                PartKind::Text {
                    text,
                    thought: false,
                } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
