//! Language model client module
//!
//! The engine only needs `complete(prompt, max_output)` and its streamed
//! twin; overflow is a distinct condition so the engine can retry with a
//! smaller prompt.

pub mod client;
pub mod stream;

use async_trait::async_trait;
use futures_util::stream::{self as futures_stream, BoxStream, StreamExt};
use thiserror::Error;

pub use client::{OllamaModel, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use stream::LineDecoder;

/// Failures reported by a language model client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Prompt exceeds the client's input window
    #[error("Prompt of {prompt_chars} chars exceeds the model input limit of {limit} chars")]
    Overflow { prompt_chars: usize, limit: usize },

    /// The request did not finish in time
    #[error("Model request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Server unreachable or returned an error
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Response text delivered piece by piece
pub type TokenStream = BoxStream<'static, Result<String, ModelError>>;

/// A text completion backend with a fixed maximum input size
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`, generating at most `max_output` tokens
    async fn complete(&self, prompt: &str, max_output: usize) -> Result<String, ModelError>;

    /// Stream the completion of `prompt`.
    ///
    /// Errors known before any text is produced (overflow, refused
    /// connection) are returned directly; later failures arrive as stream
    /// items. The default wraps `complete` as a single piece.
    async fn complete_stream(
        &self,
        prompt: &str,
        max_output: usize,
    ) -> Result<TokenStream, ModelError> {
        let text = self.complete(prompt, max_output).await?;
        Ok(futures_stream::once(async move { Ok(text) }).boxed())
    }
}
