//! SQLite-backed session store: one row per message, payload as JSON.

use chrono::Utc;
use rusqlite::params;
use tracing::instrument;

use parley_core::{Message, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::SessionStore;

pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn role_label(message: &Message) -> &'static str {
    match message.role {
        parley_core::Role::User => "user",
        parley_core::Role::Model => "model",
        parley_core::Role::Tool => "tool",
    }
}

impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, messages), fields(session_id = %id, count = messages.len()))]
    fn save(&self, id: &SessionId, messages: &[Message]) -> Result<(), StoreError> {
        let rows = messages
            .iter()
            .map(|m| Ok((m.sequence_id, role_label(m), serde_json::to_string(m)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        self.db.write(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, message_count, saved_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET message_count = ?2, saved_at = ?3",
                params![id.as_str(), rows.len() as i64, Utc::now().to_rfc3339()],
            )?;
            tx.execute("DELETE FROM messages WHERE session_id = ?1", [id.as_str()])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO messages (session_id, position, sequence_id, role, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (position, (sequence_id, role, payload)) in rows.iter().enumerate() {
                    stmt.execute(params![
                        id.as_str(),
                        position as i64,
                        sequence_id,
                        role,
                        payload
                    ])?;
                }
            }
            Ok(())
        })
    }

    fn load(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        self.db.read(|conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }

            let mut stmt = conn.prepare(
                "SELECT payload FROM messages WHERE session_id = ?1 ORDER BY position",
            )?;
            let payloads = stmt
                .query_map([id.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            payloads
                .iter()
                .map(|p| serde_json::from_str(p).map_err(StoreError::from))
                .collect()
        })
    }

    fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids.into_iter().map(SessionId::from_raw).collect())
        })
    }

    fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.db.write(|tx| {
            tx.execute("DELETE FROM messages WHERE session_id = ?1", [id.as_str()])?;
            let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", [id.as_str()])?;
            if removed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}
