//! Generative AI capabilities used by ingestion and the experiment assistant.
//!
//! Each capability is a trait so the pipeline and runtime can be driven by
//! test doubles. [`GeminiClient`] implements all of them.

mod config;
mod gemini;
pub mod prompts;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use config::GeminiConfig;
pub use gemini::GeminiClient;

/// Error from an AI service call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured.
    #[error("GEMINI_API_KEY is not set")]
    NotConfigured,
    /// Failed to reach the service.
    #[error("connection error: {0}")]
    Connection(String),
    /// Service returned an error.
    #[error("API error: {0}")]
    Api(String),
    /// Response could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),
    /// Service answered without any text.
    #[error("empty response from model")]
    EmptyResponse,
}

/// Best-effort text extraction from a document or image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, content: &[u8], mime_type: &str) -> Result<String, LlmError>;
}

/// JSON generation constrained by a response schema.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError>;
}

/// Speech to text.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError>;
}

/// Free-form conversational reply.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, LlmError>;
}
