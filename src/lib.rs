//! contextbuddy - Context Retrieval & Assembly Engine
//!
//! Retrieves relevant documents from an embedding index, caches the
//! results, and assembles them with a bounded conversation window into a
//! prompt that fits a hard size budget before calling a language model.
//!
//! # Architecture
//!
//! - **cache**: TTL + LRU retrieval cache with an injectable clock
//! - **context**: pure, deterministic budgeted prompt assembly
//! - **rag**: the `answer` pipeline with degradation and one model retry
//! - **index / models / session**: collaborator traits and their adapters

pub mod errors;
pub mod types;

// Core engine
pub mod cache;
pub mod context;
pub mod rag;

// Collaborators
pub mod index;
pub mod models;
pub mod session;

// Command-line surface
pub mod cli;

// Re-export commonly used types
pub use cache::{CacheKey, RetrievalCache};
pub use context::{Budgets, ContextAssembler, TruncationWarning};
pub use errors::{EngineError, Result};
pub use rag::{Answer, AnswerRequest, ContextEngine, EngineSettings, StreamingAnswer};
