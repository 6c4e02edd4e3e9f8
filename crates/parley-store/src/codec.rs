//! Byte codec for a session's message list.
//!
//! The envelope carries a format version so older files fail loudly instead
//! of loading half a context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::{Message, SessionId};

use crate::error::StoreError;

pub const FORMAT_VERSION: u32 = 1;

/// Everything persisted for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub format_version: u32,
    pub session_id: SessionId,
    pub saved_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl SessionSnapshot {
    pub fn new(session_id: SessionId, messages: Vec<Message>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            session_id,
            saved_at: Utc::now(),
            messages,
        }
    }
}

pub fn encode(snapshot: &SessionSnapshot) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec_pretty(snapshot)?)
}

pub fn decode(bytes: &[u8]) -> Result<SessionSnapshot, StoreError> {
    let snapshot: SessionSnapshot = serde_json::from_slice(bytes)?;
    if snapshot.format_version != FORMAT_VERSION {
        return Err(StoreError::Version {
            found: snapshot.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ExecutionOutcome, Part, Role, Usage};
    use serde_json::json;

    fn rich_context() -> Vec<Message> {
        let mut user = Message::user_text("read a.txt");
        user.sequence_id = 1;

        let call = Part::tool_call(
            "call_1",
            "read_file",
            json!({"path": "/tmp/a.txt"}).as_object().cloned().unwrap(),
        );
        let mut model = Message::new(Role::Model, vec![Part::thought("plan"), call.clone()])
            .with_usage(Usage {
                prompt_tokens: 10,
                candidate_tokens: 4,
                total_tokens: 14,
            });
        model.sequence_id = 2;
        model.elapsed_ms = Some(120);

        let result = Part::tool_result(
            "call_1",
            "read_file",
            json!({"content": "hi", "resource": {"resourceId": "/tmp/a.txt", "lastModified": 5, "sizeBytes": 2}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let mut tool = Message::new(Role::Tool, vec![result.clone()]);
        tool.sequence_id = 3;
        tool.link_dependency(&call.id, &result.id);

        let blob = Part::blob("image/png", vec![0, 159, 146, 150]);
        let mut feedback = Message::feedback(vec![
            Part::text("read_file: YES"),
            blob.clone(),
            Part::executable_code("python", "print(1)"),
            Part::execution_result(ExecutionOutcome::Ok, "1"),
        ]);
        feedback.sequence_id = 4;
        feedback.link_dependency(&result.id, &blob.id);

        vec![user, model, tool, feedback]
    }

    #[test]
    fn round_trip_preserves_everything() {
        let snapshot = SessionSnapshot::new(SessionId::new(), rich_context());
        let decoded = decode(&encode(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.messages[2].dependencies().len(), 2);
        assert!(decoded.messages[3].is_feedback);
    }

    #[test]
    fn rejects_future_version() {
        let mut snapshot = SessionSnapshot::new(SessionId::new(), vec![]);
        snapshot.format_version = 99;
        let bytes = serde_json::to_vec(&snapshot).unwrap();
        assert!(matches!(
            decode(&bytes),
            Err(StoreError::Version { found: 99, .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode(b"not json"),
            Err(StoreError::Serialization(_))
        ));
    }
}
