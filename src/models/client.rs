//! Ollama completion client
//!
//! `POST /api/generate`, either as one JSON body or as a stream of
//! newline-delimited JSON objects. The input window is enforced locally
//! before sending, and server errors that mention the context window are
//! reported as overflow too.

use async_trait::async_trait;
use futures_util::stream::{self as futures_stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::char_len;
use crate::errors::{EngineError, Result};
use crate::models::{LanguageModel, LineDecoder, ModelError, TokenStream};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default request timeout (60 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default input window in characters
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// Ollama completion client
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: Client,
    base_url: String,
    model: String,
    max_input_chars: usize,
    timeout: Duration,
}

impl OllamaModel {
    /// Create client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, DEFAULT_MAX_INPUT_CHARS, REQUEST_TIMEOUT)
    }

    /// Create client with custom configuration
    pub fn with_config(
        base_url: &str,
        model: &str,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_input_chars,
            timeout,
        })
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(2)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Check the input window, send the request and reject error statuses
    async fn send(
        &self,
        prompt: &str,
        max_output: usize,
        stream: bool,
    ) -> std::result::Result<Response, ModelError> {
        let prompt_chars = char_len(prompt);
        if prompt_chars > self.max_input_chars {
            return Err(ModelError::Overflow {
                prompt_chars,
                limit: self.max_input_chars,
            });
        }

        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: GenerateOptions {
                num_predict: max_output,
            },
        };
        debug!(model = %self.model, prompt_chars, stream, "sending completion request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(%status, "completion request failed");
            return Err(server_error(
                format!("HTTP {}: {}", status, error_text),
                prompt_chars,
                self.max_input_chars,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str, max_output: usize) -> std::result::Result<String, ModelError> {
        let response = self.send(prompt, max_output, false).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        match body.error {
            Some(error) => Err(server_error(error, char_len(prompt), self.max_input_chars)),
            None => Ok(body.response),
        }
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        max_output: usize,
    ) -> std::result::Result<TokenStream, ModelError> {
        let response = self.send(prompt, max_output, true).await?;

        let prompt_chars = char_len(prompt);
        let limit = self.max_input_chars;
        let timeout = self.timeout;
        let mut decoder = LineDecoder::new();

        // Ollama terminates every object with a newline, including the final `done` one
        let tokens = response
            .bytes_stream()
            .map(move |chunk| -> Vec<std::result::Result<String, ModelError>> {
                match chunk {
                    Ok(bytes) => match decoder.push(&bytes) {
                        Ok(lines) => lines
                            .iter()
                            .filter_map(|line| parse_stream_line(line, prompt_chars, limit).transpose())
                            .collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Err(e) => vec![Err(transport_error(e, timeout))],
                }
            })
            .flat_map(futures_stream::iter)
            .boxed();

        Ok(tokens)
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        ModelError::Unavailable(format!("Failed to send request: {}", err))
    }
}

/// Classify an error reported by the server
fn server_error(message: String, prompt_chars: usize, limit: usize) -> ModelError {
    if mentions_context_window(&message) {
        ModelError::Overflow {
            prompt_chars,
            limit,
        }
    } else {
        ModelError::Unavailable(message)
    }
}

/// One streamed object: its text piece, or `None` for empty and `done` markers
fn parse_stream_line(
    line: &str,
    prompt_chars: usize,
    limit: usize,
) -> std::result::Result<Option<String>, ModelError> {
    let chunk: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| ModelError::Unavailable(format!("Malformed stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(server_error(error, prompt_chars, limit));
    }
    if chunk.response.is_empty() {
        return Ok(None);
    }
    Ok(Some(chunk.response))
}

fn mentions_context_window(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context length")
        || lower.contains("context window")
        || lower.contains("too many tokens")
        || lower.contains("exceeds the context")
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
}

/// Ollama generate response, also the shape of each streamed object
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}
