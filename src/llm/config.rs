//! Gemini client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Gemini REST client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base, up to and including the version segment
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key; calls fail with `NotConfigured` without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model for parsing, transcription and chat
    #[serde(default = "default_model")]
    pub model: String,
    /// Model for document text extraction
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_extraction_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl GeminiConfig {
    /// Base default without env overrides.
    pub fn base_default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            extraction_model: default_extraction_model(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_env(&|key| std::env::var(key).ok());
        self
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Supported env vars:
    /// - `GEMINI_API_KEY` (ignored when blank)
    /// - `GEMINI_ENDPOINT`
    /// - `GEMINI_MODEL`
    /// - `GEMINI_EXTRACTION_MODEL`
    /// - `GEMINI_TIMEOUT_SECS`
    pub fn apply_env<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("GEMINI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(val);
        }
        if let Some(val) = lookup("GEMINI_ENDPOINT") {
            self.endpoint = val;
        }
        if let Some(val) = lookup("GEMINI_MODEL") {
            self.model = val;
        }
        if let Some(val) = lookup("GEMINI_EXTRACTION_MODEL") {
            self.extraction_model = val;
        }
        if let Some(n) = lookup("GEMINI_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = n;
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
