//! Google Gemini `generateContent` client.
//!
//! Binary inputs are sent inline as base64. Structured output uses
//! `responseMimeType: application/json` with a `responseSchema`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::prompts::{EXTRACTION_PROMPT, TRANSCRIPTION_PROMPT};
use super::{
    ChatResponder, GeminiConfig, LlmError, SpeechTranscriber, StructuredGenerator, TextExtractor,
};

/// Shared Gemini client; one `reqwest::Client` per process.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    #[serde(rename = "responseSchema")]
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

fn inline(content: &[u8], mime_type: &str) -> GeminiPart {
    GeminiPart::InlineData {
        inline_data: GeminiInlineData {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(content),
        },
    }
}

fn text(text: impl Into<String>) -> GeminiPart {
    GeminiPart::Text { text: text.into() }
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Call `generateContent` and return the concatenated text of the first candidate.
    async fn generate(&self, model: &str, request: &GeminiRequest) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_ref().ok_or(LlmError::NotConfigured)?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        );

        debug!("Gemini request to {}", url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("HTTP {}: {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(LlmError::Api(error.message));
        }
        if !status.is_success() {
            return Err(LlmError::Api(format!("HTTP {}", status)));
        }

        let text: String = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for GeminiClient {
    async fn extract_text(&self, content: &[u8], mime_type: &str) -> Result<String, LlmError> {
        info!(
            "Extracting text from {} bytes ({}) with {}",
            content.len(),
            mime_type,
            self.config.extraction_model
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![inline(content, mime_type), text(EXTRACTION_PROMPT)],
            }],
            generation_config: None,
        };
        self.generate(&self.config.extraction_model, &request).await
    }
}

#[async_trait]
impl StructuredGenerator for GeminiClient {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![text(prompt)],
            }],
            generation_config: Some(GeminiGenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema.clone(),
            }),
        };
        let raw = self.generate(&self.config.model, &request).await?;
        serde_json::from_str(&raw).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SpeechTranscriber for GeminiClient {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![text(TRANSCRIPTION_PROMPT), inline(audio, mime_type)],
            }],
            generation_config: None,
        };
        let transcript = self.generate(&self.config.model, &request).await?;
        Ok(transcript.trim().to_string())
    }
}

#[async_trait]
impl ChatResponder for GeminiClient {
    async fn reply(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![text(prompt)],
            }],
            generation_config: None,
        };
        let reply = self.generate(&self.config.model, &request).await?;
        Ok(reply.trim().to_string())
    }
}
