//! # parley-store
//!
//! Pluggable persistence for a session's message list. Every store satisfies
//! the same contract: `load(save(messages)) == messages`, including part
//! identities, dependency maps and usage metadata.

#![deny(unsafe_code)]

pub mod codec;
pub mod database;
pub mod error;
pub mod file;
pub mod schema;
pub mod sqlite;

pub use codec::{decode, encode, SessionSnapshot, FORMAT_VERSION};
pub use database::Database;
pub use error::StoreError;
pub use file::FileSessionStore;
pub use sqlite::SqliteSessionStore;

use parley_core::{Message, SessionId};

/// Blocking persistence backend. Callers on an async runtime should go
/// through `spawn_blocking`.
pub trait SessionStore: Send + Sync {
    fn save(&self, id: &SessionId, messages: &[Message]) -> Result<(), StoreError>;
    fn load(&self, id: &SessionId) -> Result<Vec<Message>, StoreError>;
    fn list(&self) -> Result<Vec<SessionId>, StoreError>;
    fn delete(&self, id: &SessionId) -> Result<(), StoreError>;
}
