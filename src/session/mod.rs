// Conversation storage
//
// The engine reads a bounded suffix of a session; callers append the
// user turn and the model's reply after a successful answer.
//
// Components:
// - ConversationStore: append/read contract
// - MemoryConversationStore: process-local store
// - FileConversationStore: JSON-per-session persistence with listing

pub mod persistence;
pub mod store;

// Re-export key types
pub use persistence::{FileConversationStore, SessionData, SessionSummary};
pub use store::{validate_session_id, ConversationStore, MemoryConversationStore};
