//! Persistence boundary for finished ride sessions.

use crate::recording::types::RideSession;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while persisting a session.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives each finalized session exactly once.
pub trait SessionSink: Send {
    fn save(&mut self, session: &RideSession) -> Result<(), SinkError>;
}

/// Writes each session as pretty-printed JSON to `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Read a previously saved session back.
    pub fn load(&self, id: Uuid) -> Result<RideSession, SinkError> {
        let content = std::fs::read_to_string(self.path_for(id))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every readable session in the directory, oldest first. Files that
    /// fail to parse are skipped.
    pub fn load_all(&self) -> Result<Vec<RideSession>, SinkError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(SinkError::from)
                .and_then(|content| Ok(serde_json::from_str::<RideSession>(&content)?));
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }
}

impl SessionSink for JsonFileSink {
    fn save(&mut self, session: &RideSession) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(session.id);
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, content)?;
        tracing::info!("Saved ride {} to {}", session.id, path.display());
        Ok(())
    }
}

/// Keeps sessions in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sessions: Arc<Mutex<Vec<RideSession>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions saved so far.
    pub fn sessions(&self) -> Vec<RideSession> {
        match self.sessions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionSink for MemorySink {
    fn save(&mut self, session: &RideSession) -> Result<(), SinkError> {
        match self.sessions.lock() {
            Ok(mut guard) => guard.push(session.clone()),
            Err(poisoned) => poisoned.into_inner().push(session.clone()),
        }
        Ok(())
    }
}
