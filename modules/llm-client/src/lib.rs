//! Chat-completions client for OpenAI-compatible endpoints.
//!
//! The pipeline talks to one black-box classifier over HTTP; everything
//! it needs is a system + user prompt in, text or JSON out. The
//! [`LlmClient`] trait is the seam tests fake.

mod openai;
mod types;

pub use openai::OpenAiClient;
pub use types::{ChatRequest, ChatResponse, ResponseFormat, WireMessage};

use async_trait::async_trait;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty completion (finish_reason: {finish_reason})")]
    Empty { finish_reason: String },

    #[error("Response parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion: system + user prompt, assistant text back.
    async fn chat(&self, system: &str, user: &str) -> Result<String>;

    /// JSON-mode completion: the model is constrained to emit one JSON
    /// object, returned parsed.
    async fn chat_json(&self, system: &str, user: &str) -> Result<serde_json::Value>;
}
