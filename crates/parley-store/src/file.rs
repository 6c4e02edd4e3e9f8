//! One JSON file per session under a directory.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use parley_core::{Message, SessionId};

use crate::codec::{self, SessionSnapshot};
use crate::error::StoreError;
use crate::SessionStore;

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Read a snapshot from an arbitrary path.
    pub fn read_path(path: &Path) -> Result<SessionSnapshot, StoreError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
            _ => StoreError::Io(format!("read {}: {e}", path.display())),
        })?;
        codec::decode(&bytes)
    }

    /// Write a snapshot to an arbitrary path via a temp file and rename, so a
    /// crash mid-write never leaves a truncated session behind.
    pub fn write_path(path: &Path, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }
        let bytes = codec::encode(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    #[instrument(skip(self, messages), fields(session_id = %id, count = messages.len()))]
    fn save(&self, id: &SessionId, messages: &[Message]) -> Result<(), StoreError> {
        let snapshot = SessionSnapshot::new(id.clone(), messages.to_vec());
        Self::write_path(&self.path_for(id), &snapshot)?;
        debug!("session saved");
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        Ok(Self::read_path(&self.path_for(id))?.messages)
    }

    fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(SessionId::from_raw(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
