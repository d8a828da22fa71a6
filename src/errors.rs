//! Error types for contextbuddy
//!
//! One enum covers every way an `answer` call can fail. Collaborator
//! adapters speak `anyhow` internally and are converted at the engine seam.

use thiserror::Error;

use crate::context::TruncationWarning;

/// Main error type for the retrieval and assembly engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected before any cache or index access
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Preamble plus query alone exceed the total budget
    #[error(
        "Query of {query_chars} chars needs a {required_chars} char prompt (preamble + query), \
         over the budget of {budget} chars"
    )]
    UnrepresentableInput {
        query_chars: usize,
        required_chars: usize,
        budget: usize,
    },

    /// Model still overflowed after the reduced-budget retry
    #[error("Could not fit context into the model window after retry")]
    ContextDoesNotFit { warnings: Vec<TruncationWarning> },

    /// Model unreachable or failing after the one allowed retry
    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    /// A blocking stage exceeded its deadline
    #[error("{stage} timed out after {duration_ms}ms")]
    Timeout { stage: String, duration_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversation or index storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True when an upstream collaborator (model, network) caused the failure
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            EngineError::ModelUnavailable(_) | EngineError::Timeout { .. } | EngineError::Http(_)
        )
    }

    /// True for rejections caused by the caller's input rather than upstream state
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedInput(_) | EngineError::UnrepresentableInput { .. }
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Storage(format!("{:#}", err))
    }
}
