//! Type definitions module
//!
//! Documents, retrieval results, and conversation turns shared by the
//! cache, the assembler, and the engine.

pub mod conversation;
pub mod document;

// Re-export commonly used types
pub use conversation::{ConversationTurn, Role};
pub use document::{Document, Filters, Metadata, MetadataValue, RetrievedItem, SearchHit};
