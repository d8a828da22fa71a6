//! Conversation store contract and the in-memory implementation
//!
//! The engine only reads sessions. Appending the user turn and the reply
//! is the caller's job once an answer has been produced.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::ConversationTurn;

/// Durable, append-only conversation transcripts
pub trait ConversationStore: Send + Sync {
    /// Append one turn to a session, creating the session if needed
    fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()>;

    /// Full session history, oldest first; empty for unknown sessions
    fn read(&self, session_id: &str) -> Result<Vec<ConversationTurn>>;
}

/// Session ids are used as file names, so keep them to a safe alphabet
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty()
        || !session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("Invalid session id: {:?}", session_id);
    }
    Ok(())
}

/// Process-local store, mainly for embedding and tests
#[derive(Default)]
pub struct MemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn append(&self, session_id: &str, turn: ConversationTurn) -> Result<()> {
        validate_session_id(session_id)?;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("Conversation store lock poisoned"))?;
        sessions.entry(session_id.to_string()).or_default().push(turn);
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        validate_session_id(session_id)?;
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow::anyhow!("Conversation store lock poisoned"))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_in_order() {
        let store = MemoryConversationStore::new();
        store.append("s1", ConversationTurn::user("hello")).unwrap();
        store.append("s1", ConversationTurn::assistant("hi there")).unwrap();

        let turns = store.read("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].content, "hi there");
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let store = MemoryConversationStore::new();
        assert!(store.read("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("abc-123_X").is_ok());
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id("").is_err());
    }
}
