//! The ordered message list: single source of truth for a session.
//!
//! Every structural mutation goes through one coarse lock. Listeners are
//! notified after the lock is released, and a backup of the new state is
//! scheduled on the blocking pool when a backup target is configured.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use parley_core::{BehaviorLookup, Message, PartId, SessionId, Usage};
use parley_store::SessionStore;

use crate::error::ContextError;
use crate::events::ContextEvent;
use crate::prune::{self, PruneReport};
use crate::tracker::{self, ResourceRow, ResourceTracker};

const EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub turns_to_keep: usize,
    /// Zero disables the usage ratio.
    pub token_threshold: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            turns_to_keep: 5,
            token_threshold: 200_000,
        }
    }
}

struct Inner {
    messages: Vec<Message>,
    next_sequence: i64,
    last_usage: Option<Usage>,
    /// Bumped for every backup snapshot taken.
    generation: u64,
}

impl Inner {
    /// Recompute derived fields from the list in one pass.
    fn rebuild(&mut self) {
        let mut prev: Option<chrono::DateTime<chrono::Utc>> = None;
        let mut last_usage = None;
        let mut max_seq = 0;
        for message in &mut self.messages {
            message.elapsed_ms = prev.map(|p| (message.created_at - p).num_milliseconds());
            prev = Some(message.created_at);
            if message.usage.is_some() {
                last_usage = message.usage;
            }
            max_seq = max_seq.max(message.sequence_id);
        }
        self.last_usage = last_usage;
        // Sequence ids stay monotonic even when the newest message is pruned.
        self.next_sequence = self.next_sequence.max(max_seq + 1);
    }
}

struct Backup {
    store: Arc<dyn SessionStore>,
    session_id: SessionId,
    /// Generation of the newest snapshot written so far.
    written: Arc<Mutex<u64>>,
}

pub struct ContextStore {
    inner: Mutex<Inner>,
    behaviors: Arc<dyn BehaviorLookup>,
    config: ContextConfig,
    events: broadcast::Sender<ContextEvent>,
    backup: Option<Backup>,
}

impl ContextStore {
    pub fn new(config: ContextConfig, behaviors: Arc<dyn BehaviorLookup>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                messages: Vec::new(),
                next_sequence: 1,
                last_usage: None,
                generation: 0,
            }),
            behaviors,
            config,
            events,
            backup: None,
        }
    }

    /// Back up the message list after every mutation.
    pub fn with_backup(mut self, store: Arc<dyn SessionStore>, session_id: SessionId) -> Self {
        self.backup = Some(Backup {
            store,
            session_id,
            written: Arc::new(Mutex::new(0)),
        });
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn behaviors(&self) -> &dyn BehaviorLookup {
        self.behaviors.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    /// Append a message. Returns its sequence id, or `None` when the message
    /// has no parts and was dropped.
    ///
    /// Older results for any stateful resource the message carries are pruned
    /// before anyone can observe both versions; a user turn also runs
    /// ephemeral aging.
    pub fn add(&self, mut message: Message) -> Option<i64> {
        if message.parts.is_empty() {
            debug!(role = ?message.role, "dropping message with no parts");
            return None;
        }
        let mut events = Vec::new();
        let (sequence_id, snapshot) = {
            let mut inner = self.inner.lock();
            let sequence_id = inner.next_sequence;
            inner.next_sequence += 1;
            message.sequence_id = sequence_id;
            message.elapsed_ms = inner
                .messages
                .last()
                .map(|prev| (message.created_at - prev.created_at).num_milliseconds());
            if message.usage.is_some() {
                inner.last_usage = message.usage;
            }
            let is_user_turn = message.is_user_turn();
            inner.messages.push(message);
            let superseded = inner
                .messages
                .last()
                .map(|newest| prune::superseded_by(&inner.messages, newest, self.behaviors.as_ref()))
                .unwrap_or_default();
            events.push(ContextEvent::Added { sequence_id });

            if !superseded.is_empty() {
                if let Some(event) = self.prune_locked(&mut inner, superseded, "stateful_replace") {
                    events.push(event);
                }
            }
            if is_user_turn {
                let candidates = prune::ephemeral_candidates(
                    &inner.messages,
                    self.config.turns_to_keep,
                    self.behaviors.as_ref(),
                );
                if let Some(event) = self.prune_locked(&mut inner, candidates, "ephemeral_aging") {
                    events.push(event);
                }
            }
            (sequence_id, self.backup_snapshot(&mut inner))
        };
        self.publish(events, snapshot);
        Some(sequence_id)
    }

    /// Immutable copy of the message list.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// Bulk replace, used on session load and by external editors.
    pub fn replace_all(&self, mut messages: Vec<Message>) {
        let before = messages.len();
        messages.retain(|m| !m.parts.is_empty());
        if messages.len() < before {
            debug!(dropped = before - messages.len(), "dropping messages with no parts");
        }
        let (count, snapshot) = {
            let mut inner = self.inner.lock();
            inner.messages = messages;
            inner.rebuild();
            (inner.messages.len(), self.backup_snapshot(&mut inner))
        };
        self.publish(vec![ContextEvent::Replaced { count }], snapshot);
    }

    pub fn clear(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.messages.clear();
            inner.rebuild();
            self.backup_snapshot(&mut inner)
        };
        self.publish(vec![ContextEvent::Cleared], snapshot);
    }

    /// Last reported total tokens over the configured threshold; 0 when unset.
    pub fn token_usage_ratio(&self) -> f64 {
        if self.config.token_threshold == 0 {
            return 0.0;
        }
        let total = self.inner.lock().last_usage.map_or(0, |u| u.total_tokens);
        total as f64 / self.config.token_threshold as f64
    }

    pub fn last_usage(&self) -> Option<Usage> {
        self.inner.lock().last_usage
    }

    // ── pruning ─────────────────────────────────────────────────────

    /// Ids of every part of the given messages. Unknown ids are skipped.
    pub fn part_ids_of(&self, sequence_ids: &[i64]) -> Vec<PartId> {
        let inner = self.inner.lock();
        inner
            .messages
            .iter()
            .filter(|m| sequence_ids.contains(&m.sequence_id))
            .flat_map(|m| m.parts.iter().map(|p| p.id.clone()))
            .collect()
    }

    /// Ids of the indexed parts of one message, validated against the
    /// current context.
    pub fn resolve_parts(
        &self,
        sequence_id: i64,
        indices: &[usize],
    ) -> Result<Vec<PartId>, ContextError> {
        let inner = self.inner.lock();
        let message = inner
            .messages
            .iter()
            .find(|m| m.sequence_id == sequence_id)
            .ok_or(ContextError::MessageNotFound(sequence_id))?;
        indices
            .iter()
            .map(|&index| {
                message
                    .parts
                    .get(index)
                    .map(|p| p.id.clone())
                    .ok_or(ContextError::PartIndexOutOfRange {
                        sequence_id,
                        index,
                        len: message.parts.len(),
                    })
            })
            .collect()
    }

    /// Prune every part of the given messages and whatever depends on them.
    pub fn prune_messages(&self, sequence_ids: &[i64]) -> PruneReport {
        let seeds = self.part_ids_of(sequence_ids);
        self.prune_by_reference(seeds, "messages")
    }

    /// Prune the indexed parts of one message and whatever depends on them.
    pub fn prune_parts(
        &self,
        sequence_id: i64,
        indices: &[usize],
    ) -> Result<PruneReport, ContextError> {
        let seeds = self.resolve_parts(sequence_id, indices)?;
        Ok(self.prune_by_reference(seeds, "parts"))
    }

    /// Prune `seeds` and their dependency closure. No-op (and no
    /// notification) when nothing changes.
    pub fn prune_by_reference(&self, seeds: Vec<PartId>, reason: &str) -> PruneReport {
        let (event, snapshot) = {
            let mut inner = self.inner.lock();
            let event = self.prune_locked(&mut inner, seeds, reason);
            let snapshot = match event {
                Some(_) => self.backup_snapshot(&mut inner),
                None => None,
            };
            (event, snapshot)
        };
        let report = match &event {
            Some(ContextEvent::Pruned { report, .. }) => *report,
            _ => PruneReport::default(),
        };
        if let Some(event) = event {
            self.publish(vec![event], snapshot);
        }
        report
    }

    /// Age out ephemeral tool traffic older than `turns_to_keep` user turns.
    pub fn prune_ephemeral_tool_calls(&self) -> PruneReport {
        let candidates = {
            let inner = self.inner.lock();
            prune::ephemeral_candidates(
                &inner.messages,
                self.config.turns_to_keep,
                self.behaviors.as_ref(),
            )
        };
        self.prune_by_reference(candidates, "ephemeral_aging")
    }

    fn prune_locked(&self, inner: &mut Inner, seeds: Vec<PartId>, reason: &str) -> Option<ContextEvent> {
        if seeds.is_empty() {
            return None;
        }
        let mut messages = inner.messages.clone();
        let (report, removed): (PruneReport, HashSet<PartId>) =
            prune::prune_by_reference(&mut messages, seeds);
        if !report.changed() {
            debug!(reason, "prune was a no-op");
            return None;
        }
        inner.messages = messages;
        inner.rebuild();
        debug!(
            reason,
            closure = removed.len(),
            removed_parts = report.removed_parts,
            removed_messages = report.removed_messages,
            "pruned context"
        );
        Some(ContextEvent::Pruned {
            reason: reason.to_string(),
            report,
        })
    }

    // ── resources ───────────────────────────────────────────────────

    pub fn resource_overview(&self, tracker: &ResourceTracker) -> Vec<ResourceRow> {
        tracker.overview(&self.snapshot(), self.behaviors.as_ref())
    }

    pub fn resource_status(&self, tracker: &ResourceTracker, resource_id: &str) -> parley_core::ResourceStatus {
        tracker.status_of(&self.snapshot(), self.behaviors.as_ref(), resource_id)
    }

    pub fn resources(&self) -> Vec<parley_core::StatefulResource> {
        tracker::latest_resources(&self.inner.lock().messages, self.behaviors.as_ref())
    }

    // ── notification ────────────────────────────────────────────────

    /// Copy of the list for the backup target, tagged with a generation so
    /// an older snapshot never overwrites a newer one.
    fn backup_snapshot(&self, inner: &mut Inner) -> Option<(u64, Vec<Message>)> {
        self.backup.as_ref()?;
        inner.generation += 1;
        Some((inner.generation, inner.messages.clone()))
    }

    fn publish(&self, events: Vec<ContextEvent>, snapshot: Option<(u64, Vec<Message>)>) {
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
        if let Some((generation, messages)) = snapshot {
            self.schedule_backup(generation, messages);
        }
    }

    fn schedule_backup(&self, generation: u64, messages: Vec<Message>) {
        let Some(backup) = &self.backup else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, skipping backup");
            return;
        };
        let store = backup.store.clone();
        let session_id = backup.session_id.clone();
        let written = backup.written.clone();
        drop(handle.spawn_blocking(move || {
            let mut written = written.lock();
            if *written > generation {
                return;
            }
            match store.save(&session_id, &messages) {
                Ok(()) => *written = generation,
                Err(e) => warn!(session_id = %session_id, error = %e, "session backup failed"),
            }
        }));
    }
}
