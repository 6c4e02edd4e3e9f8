//! Just-in-time content appended to an outbound request, never persisted.
//!
//! Providers run concurrently under one deadline. A provider that errors or
//! panics becomes an inline note; it never takes its siblings down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{Message, Part, ResourceStatus};

use crate::error::EngineError;
use crate::tool::{panic_message, SessionHandle};

#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means nothing to add this turn.
    async fn provide(&self, session: &SessionHandle) -> Result<Option<String>, EngineError>;
}

/// Run every provider and collect their notes in provider order.
///
/// Stops waiting at `timeout` or when `cancel` fires; unfinished providers
/// are aborted and reported as such.
pub async fn gather(
    providers: &[Arc<dyn ContextProvider>],
    session: &SessionHandle,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Vec<String> {
    let mut notes: Vec<Option<String>> = vec![None; providers.len()];
    let mut pending: Vec<bool> = vec![true; providers.len()];
    let mut set = JoinSet::new();
    for (index, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let session = session.clone();
        set.spawn(async move {
            let result = AssertUnwindSafe(provider.provide(&session)).catch_unwind().await;
            (index, result)
        });
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut interrupted = None;
    while !set.is_empty() {
        tokio::select! {
            joined = set.join_next() => match joined {
                Some(Ok((index, outcome))) => {
                    pending[index] = false;
                    let name = providers[index].name();
                    notes[index] = match outcome {
                        Ok(Ok(note)) => note.filter(|n| !n.trim().is_empty()),
                        Ok(Err(e)) => {
                            warn!(provider = name, error = %e, "context provider failed");
                            Some(format!("[{name} unavailable: {e}]"))
                        }
                        Err(panic) => {
                            warn!(provider = name, panic = %panic_message(&panic), "context provider panicked");
                            Some(format!("[{name} unavailable: crashed]"))
                        }
                    };
                }
                Some(Err(join_error)) => {
                    warn!(error = %join_error, "context provider task failed");
                }
                None => break,
            },
            () = &mut deadline => {
                interrupted = Some("timed out");
                break;
            }
            () = cancel.cancelled() => {
                interrupted = Some("cancelled");
                break;
            }
        }
    }
    set.abort_all();

    for (index, still_pending) in pending.iter().enumerate() {
        if *still_pending {
            let reason = interrupted.unwrap_or("failed");
            debug!(provider = providers[index].name(), reason, "context provider produced no note");
            notes[index] = Some(format!("[{} unavailable: {reason}]", providers[index].name()));
        }
    }
    notes.into_iter().flatten().collect()
}

/// The augmented message for one request, if any provider had something to say.
pub fn augmented_message(notes: Vec<String>) -> Option<Message> {
    if notes.is_empty() {
        return None;
    }
    Some(Message::feedback(notes.into_iter().map(Part::text).collect()))
}

/// Renders the resource overview so the model sees changed or deleted files.
pub struct ResourceStatusProvider;

#[async_trait]
impl ContextProvider for ResourceStatusProvider {
    fn name(&self) -> &str {
        "resource_status"
    }

    async fn provide(&self, session: &SessionHandle) -> Result<Option<String>, EngineError> {
        let context = Arc::clone(&session.context);
        let tracker = session.tracker.clone();
        // Probing touches the filesystem.
        let rows = tokio::task::spawn_blocking(move || context.resource_overview(&tracker))
            .await
            .map_err(|e| EngineError::Provider {
                name: "resource_status".into(),
                reason: e.to_string(),
            })?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("Resources in context:");
        for row in rows {
            out.push_str(&format!(
                "\n- {} [{}]",
                row.resource.resource_id,
                row.status.as_str()
            ));
            if matches!(row.status, ResourceStatus::Stale | ResourceStatus::Deleted) {
                out.push_str(" (re-read before relying on it)");
            }
        }
        Ok(Some(out))
    }
}
