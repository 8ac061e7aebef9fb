//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::llm::{ChatResponder, LlmError, SpeechTranscriber, StructuredGenerator, TextExtractor};
use crate::repository::DbContext;
use crate::storage::{generate_object_key, ObjectInfo, ObjectStore, StorageError};

/// Fresh SQLite database with the schema applied.
pub async fn test_db() -> (DbContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DbContext::from_sqlite_path(&dir.path().join("copilot.db"));
    ctx.init_schema().await.unwrap();
    (ctx, dir)
}

/// Scripted AI service with per-capability call counters.
#[derive(Default)]
pub struct MockAi {
    pub extracted_text: String,
    pub protocol: Value,
    pub steps: Value,
    pub transcript: String,
    pub reply: String,
    pub fail_extract: bool,
    pub fail_transcribe: bool,
    pub fail_reply: bool,
    pub extract_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
    pub extraction_mime_types: Mutex<Vec<String>>,
    pub reply_prompts: Mutex<Vec<String>>,
}

/// AI double describing a three-step protocol, steps listed out of order.
pub fn three_step_ai() -> MockAi {
    MockAi {
        extracted_text: "PCR\n1. Mix\n2. Cycle\n3. Hold".to_string(),
        protocol: json!({"protocol_name": "PCR", "description": "Amplify a target"}),
        steps: json!([
            {"step_number": 3, "step_name": "Hold", "instruction": "Hold at 4C"},
            {"step_number": 1, "step_name": "Mix", "instruction": "Mix master mix", "expected_duration_minutes": 10},
            {"step_number": 2, "step_name": "Cycle", "instruction": "Run 30 cycles", "expected_duration_minutes": 90}
        ]),
        transcript: "What temperature for annealing?".to_string(),
        reply: "Use 55 degrees.".to_string(),
        ..Default::default()
    }
}

fn service_down() -> LlmError {
    LlmError::Connection("service unavailable".to_string())
}

#[async_trait]
impl TextExtractor for MockAi {
    async fn extract_text(&self, _content: &[u8], mime_type: &str) -> Result<String, LlmError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.extraction_mime_types
            .lock()
            .unwrap()
            .push(mime_type.to_string());
        if self.fail_extract {
            return Err(service_down());
        }
        Ok(self.extracted_text.clone())
    }
}

#[async_trait]
impl StructuredGenerator for MockAi {
    async fn generate_json(&self, _prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if schema["type"] == "ARRAY" {
            Ok(self.steps.clone())
        } else {
            Ok(self.protocol.clone())
        }
    }
}

#[async_trait]
impl SpeechTranscriber for MockAi {
    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String, LlmError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcribe {
            return Err(service_down());
        }
        Ok(self.transcript.clone())
    }
}

#[async_trait]
impl ChatResponder for MockAi {
    async fn reply(&self, prompt: &str) -> Result<String, LlmError> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        self.reply_prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_reply {
            return Err(service_down());
        }
        Ok(self.reply.clone())
    }
}

/// In-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    fail_put: bool,
    pub put_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail_put: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "protocols"
    }

    fn locator_for(&self, key: &str) -> String {
        format!("http://localhost:9000/protocols/{}", key)
    }

    async fn put(
        &self,
        content: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            return Err(StorageError::Upload("bucket unreachable".to_string()));
        }
        let key = generate_object_key(extension);
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), (content_type.to_string(), content.to_vec()));
        Ok(self.locator_for(&key))
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key_from_locator(locator)?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let key = self.key_from_locator(locator)?;
        Ok(self.objects.lock().unwrap().remove(key).is_some())
    }

    async fn stat(&self, locator: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let key = self.key_from_locator(locator)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(content_type, bytes)| ObjectInfo {
                object_name: key.to_string(),
                size: bytes.len() as u64,
                content_type: Some(content_type.clone()),
                last_modified: None,
                etag: None,
            }))
    }
}
