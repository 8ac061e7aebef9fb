//! Structured parsing of extracted protocol text.
//!
//! The model fills in names, descriptions and steps; identifiers and
//! timestamps are always assigned here.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::llm::prompts::{protocol_prompt, steps_prompt};
use crate::llm::{LlmError, StructuredGenerator};
use crate::models::{Protocol, ProtocolStep};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("unexpected JSON shape: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("step_number must be a positive integer, got {0}")]
    InvalidStepNumber(i64),
    #[error("expected_duration_minutes out of range: {0}")]
    InvalidDuration(i64),
}

/// Response schema for the protocol summary.
pub fn protocol_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "protocol_name": {"type": "STRING"},
            "description": {"type": "STRING"}
        },
        "required": ["protocol_name", "description"]
    })
}

/// Response schema for the step list.
pub fn steps_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "step_number": {"type": "INTEGER"},
                "step_name": {"type": "STRING"},
                "instruction": {"type": "STRING"},
                "expected_duration_minutes": {"type": "INTEGER"}
            },
            "required": ["step_number", "step_name", "instruction"]
        }
    })
}

#[derive(Debug, Deserialize)]
struct ParsedProtocol {
    protocol_name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParsedStep {
    step_number: i64,
    step_name: String,
    instruction: String,
    #[serde(default)]
    expected_duration_minutes: Option<i64>,
}

/// Ask the model for the protocol summary and merge it with the caller's ids.
pub async fn parse_protocol(
    generator: &dyn StructuredGenerator,
    text: &str,
    document_id: Uuid,
    protocol_id: Uuid,
) -> Result<Protocol, ParseError> {
    let prompt = protocol_prompt(&document_id.to_string(), &protocol_id.to_string(), text);
    let value = generator.generate_json(&prompt, &protocol_schema()).await?;
    let parsed: ParsedProtocol = serde_json::from_value(value)?;
    debug!("Parsed protocol '{}'", parsed.protocol_name);

    let now = Utc::now();
    Ok(Protocol {
        protocol_id,
        document_id,
        protocol_name: parsed.protocol_name,
        description: parsed.description,
        created_by_user_id: None,
        created_at: now,
        updated_at: now,
    })
}

/// Ask the model for the step list. Every step gets a fresh id.
///
/// Steps come back in the model's order; numbering is not re-validated
/// beyond requiring positive step numbers.
pub async fn parse_steps(
    generator: &dyn StructuredGenerator,
    text: &str,
    protocol_id: Uuid,
) -> Result<Vec<ProtocolStep>, ParseError> {
    let prompt = steps_prompt(&protocol_id.to_string(), text);
    let value = generator.generate_json(&prompt, &steps_schema()).await?;
    let parsed: Vec<ParsedStep> = serde_json::from_value(value)?;
    debug!("Parsed {} protocol steps", parsed.len());

    let now = Utc::now();
    parsed
        .into_iter()
        .map(|step| {
            let step_number = i32::try_from(step.step_number)
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(ParseError::InvalidStepNumber(step.step_number))?;
            let expected_duration_minutes = step
                .expected_duration_minutes
                .map(|d| i32::try_from(d).map_err(|_| ParseError::InvalidDuration(d)))
                .transpose()?;
            Ok(ProtocolStep {
                protocol_step_id: Uuid::new_v4(),
                protocol_id,
                step_number,
                step_name: step.step_name,
                instruction: step.instruction,
                expected_duration_minutes,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned value and remembers the prompt.
    struct Canned {
        value: Value,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(value: Value) -> Self {
            Self {
                value,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StructuredGenerator for Canned {
        async fn generate_json(&self, prompt: &str, _schema: &Value) -> Result<Value, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.value.clone())
        }
    }

    #[tokio::test]
    async fn test_protocol_merges_caller_ids() {
        let generator = Canned::new(json!({
            "protocol_name": "Bradford assay",
            "description": "Quantify protein",
            "protocol_id": "ignored-by-parser"
        }));
        let document_id = Uuid::new_v4();
        let protocol_id = Uuid::new_v4();

        let protocol = parse_protocol(&generator, "text", document_id, protocol_id)
            .await
            .unwrap();
        assert_eq!(protocol.protocol_id, protocol_id);
        assert_eq!(protocol.document_id, document_id);
        assert_eq!(protocol.protocol_name, "Bradford assay");
        assert_eq!(protocol.description.as_deref(), Some("Quantify protein"));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains(&protocol_id.to_string()));
    }

    #[tokio::test]
    async fn test_steps_get_fresh_ids_and_optional_duration() {
        let generator = Canned::new(json!([
            {"step_number": 2, "step_name": "Spin", "instruction": "Spin 5 min", "expected_duration_minutes": 5},
            {"step_number": 1, "step_name": "Mix", "instruction": "Mix gently"}
        ]));
        let protocol_id = Uuid::new_v4();

        let steps = parse_steps(&generator, "text", protocol_id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, 2);
        assert_eq!(steps[0].expected_duration_minutes, Some(5));
        assert_eq!(steps[1].expected_duration_minutes, None);
        assert!(steps.iter().all(|s| s.protocol_id == protocol_id));
        assert_ne!(steps[0].protocol_step_id, steps[1].protocol_step_id);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains(&format!("protocol_id: {}", protocol_id)));
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        let generator = Canned::new(json!({"description": "no name"}));
        let err = parse_protocol(&generator, "t", Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(err, Err(ParseError::Malformed(_))));

        let generator = Canned::new(json!({"step_number": 1}));
        let err = parse_steps(&generator, "t", Uuid::new_v4()).await;
        assert!(matches!(err, Err(ParseError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_non_positive_step_number_rejected() {
        let generator = Canned::new(json!([
            {"step_number": 0, "step_name": "Prep", "instruction": "Prepare bench"}
        ]));
        let err = parse_steps(&generator, "t", Uuid::new_v4()).await;
        assert!(matches!(err, Err(ParseError::InvalidStepNumber(0))));
    }
}
