//! Dependency-graph pruning over a message list.
//!
//! Everything here is a pure function over `Vec<Message>`; the
//! [`ContextStore`](crate::ContextStore) runs them under its lock and swaps
//! the result in only when something changed.
//!
//! Dependency edges are stored directed but treated as symmetric: removing
//! either end of an edge removes the other.

use std::collections::{HashMap, HashSet};

use parley_core::{BehaviorLookup, Message, Part, PartId, PartKind, ToolBehavior};

use crate::tracker::{stateful_parts, stateful_resource};

/// What a prune removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_parts: usize,
    pub removed_messages: usize,
    /// Messages whose dependency map was rewritten.
    pub rewritten_maps: usize,
}

impl PruneReport {
    pub fn changed(&self) -> bool {
        self.removed_parts > 0 || self.removed_messages > 0 || self.rewritten_maps > 0
    }
}

/// Transitive closure of `seeds` over every dependency map in `messages`.
///
/// Runs until the set stops growing; call→result→attachment chains can be
/// arbitrarily deep.
pub fn closure(messages: &[Message], seeds: impl IntoIterator<Item = PartId>) -> HashSet<PartId> {
    let mut set: HashSet<PartId> = seeds.into_iter().collect();
    loop {
        let before = set.len();
        for message in messages {
            for (key, dependents) in message.dependencies() {
                if set.contains(key) || dependents.iter().any(|d| set.contains(d)) {
                    set.insert(key.clone());
                    set.extend(dependents.iter().cloned());
                }
            }
        }
        if set.len() == before {
            return set;
        }
    }
}

/// Remove every part in `removed`, delete emptied messages and scrub
/// dependency maps of every message that referenced a removed part.
pub fn apply(messages: &mut Vec<Message>, removed: &HashSet<PartId>) -> PruneReport {
    let mut report = PruneReport::default();
    if removed.is_empty() {
        return report;
    }
    for message in messages.iter_mut() {
        let before = message.parts.len();
        if message.retain_parts(removed) {
            report.removed_parts += before - message.parts.len();
        }
        if message.retain_dependencies(removed) {
            report.rewritten_maps += 1;
        }
    }
    let before = messages.len();
    messages.retain(|m| !m.parts.is_empty());
    report.removed_messages = before - messages.len();
    report
}

/// Closure plus apply. Returns the report and the closed set.
pub fn prune_by_reference(
    messages: &mut Vec<Message>,
    seeds: impl IntoIterator<Item = PartId>,
) -> (PruneReport, HashSet<PartId>) {
    let set = closure(messages, seeds);
    let report = apply(messages, &set);
    (report, set)
}

/// Calls that have a linked result somewhere in the context.
fn answered_calls(messages: &[Message]) -> HashSet<PartId> {
    let index: HashMap<&PartId, &Part> = messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .map(|p| (&p.id, p))
        .collect();
    let is = |id: &PartId, f: fn(&Part) -> bool| index.get(id).is_some_and(|p| f(p));

    let mut answered = HashSet::new();
    for message in messages {
        for (key, dependents) in message.dependencies() {
            for dep in dependents {
                if is(key, Part::is_tool_call) && is(dep, Part::is_tool_result) {
                    answered.insert(key.clone());
                } else if is(key, Part::is_tool_result) && is(dep, Part::is_tool_call) {
                    answered.insert(dep.clone());
                }
            }
        }
    }
    answered
}

/// Index of the `turns_to_keep`-th user turn counted from the end.
pub fn aging_cutoff(messages: &[Message], turns_to_keep: usize) -> Option<usize> {
    messages
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, m)| m.is_user_turn())
        .nth(turns_to_keep.max(1) - 1)
        .map(|(i, _)| i)
}

/// Parts before the aging cutoff that should not linger: ephemeral tool
/// traffic, calls that never got a result, and stateful results whose
/// snapshot could not be parsed.
pub fn ephemeral_candidates(
    messages: &[Message],
    turns_to_keep: usize,
    behaviors: &dyn BehaviorLookup,
) -> Vec<PartId> {
    let Some(cutoff) = aging_cutoff(messages, turns_to_keep) else {
        return Vec::new();
    };
    let answered = answered_calls(messages);

    messages[..cutoff]
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter(|part| {
            let Some(name) = part.tool_name() else {
                return false;
            };
            let behavior = behaviors.behavior_of(name);
            match &part.content {
                _ if behavior == ToolBehavior::Ephemeral => true,
                PartKind::ToolCall { .. } => !answered.contains(&part.id),
                PartKind::ToolResult { .. } => {
                    behavior == ToolBehavior::StatefulReplace
                        && stateful_resource(part, behaviors).is_none()
                }
                _ => false,
            }
        })
        .map(|part| part.id.clone())
        .collect()
}

/// Older stateful results superseded by the results in `newest`.
///
/// Only resource ids carried by `newest` are considered. For each, every
/// occurrence in `messages` except the last one is returned.
pub fn superseded_by(
    messages: &[Message],
    newest: &Message,
    behaviors: &dyn BehaviorLookup,
) -> Vec<PartId> {
    let incoming: HashSet<String> = newest
        .parts
        .iter()
        .filter_map(|p| stateful_resource(p, behaviors))
        .map(|r| r.resource_id)
        .collect();
    if incoming.is_empty() {
        return Vec::new();
    }

    let mut last: HashMap<String, &PartId> = HashMap::new();
    let mut all: Vec<(&PartId, String)> = Vec::new();
    for (id, resource) in stateful_parts(messages, behaviors) {
        if incoming.contains(&resource.resource_id) {
            last.insert(resource.resource_id.clone(), id);
            all.push((id, resource.resource_id));
        }
    }
    all.into_iter()
        .filter(|(id, rid)| last.get(rid).is_some_and(|keep| keep != id))
        .map(|(id, _)| id.clone())
        .collect()
}
