// Conversation persistence: one JSON file per session
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::session::store::{validate_session_id, ConversationStore};
use crate::types::{ConversationTurn, Role};

/// On-disk session document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl SessionData {
    fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            topic: None,
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }
}

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_turns: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,
}

impl From<&SessionData> for SessionSummary {
    fn from(session: &SessionData) -> Self {
        let count = |role: Role| session.turns.iter().filter(|t| t.role == role).count();
        Self {
            session_id: session.session_id.clone(),
            topic: session.topic.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            total_turns: session.turns.len(),
            user_turns: count(Role::User),
            assistant_turns: count(Role::Assistant),
        }
    }
}

/// File-backed conversation store
///
/// Appends rewrite the session file through a temp file and rename, so a
/// reader never sees a half-written turn.
pub struct FileConversationStore {
    storage_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    /// Create store, making the storage directory if needed
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir)
                .context("Failed to create session storage directory")?;
        }

        Ok(Self {
            storage_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Fresh random session id
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Load a full session document, `None` when it does not exist
    pub fn load_session(&self, session_id: &str) -> Result<Option<SessionData>> {
        validate_session_id(session_id)?;
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).context("Failed to read session file")?;
        let session: SessionData =
            serde_json::from_str(&json).context("Failed to deserialize session")?;
        Ok(Some(session))
    }

    /// Set a human-readable topic on a session
    pub fn set_topic(&self, session_id: &str, topic: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Session write lock poisoned"))?;
        let mut session = self
            .load_session(session_id)?
            .unwrap_or_else(|| SessionData::new(session_id));
        session.topic = Some(topic.to_string());
        session.updated_at = Utc::now();
        self.write_session(&session)
    }

    /// All sessions, most recently updated first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();

        for entry in fs::read_dir(&self.storage_dir)? {
            let path = entry?.path();
            let Some(session_id) = session_id_from_path(&path) else {
                continue;
            };
            match self.load_session(&session_id) {
                Ok(Some(session)) => summaries.push(SessionSummary::from(&session)),
                Ok(None) => {}
                Err(e) => warn!(session_id = %session_id, "Failed to load session: {:#}", e),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete a session; returns whether a file was removed
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).context("Failed to delete session file")?;
        Ok(true)
    }

    /// Get storage directory
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.storage_dir.join(format!("session_{}.json", session_id))
    }

    fn write_session(&self, session: &SessionData) -> Result<()> {
        let path = self.session_path(&session.session_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(&tmp, json).context("Failed to write session file")?;
        fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl ConversationStore for FileConversationStore {
    fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Session write lock poisoned"))?;

        let mut session = self
            .load_session(session_id)?
            .unwrap_or_else(|| SessionData::new(session_id));
        session.turns.push(turn);
        session.updated_at = Utc::now();
        self.write_session(&session)
    }

    fn read(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .load_session(session_id)?
            .map(|session| session.turns)
            .unwrap_or_default())
    }
}

fn session_id_from_path(path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    let id = filename.strip_prefix("session_")?.strip_suffix(".json")?;
    Some(id.to_string())
}
