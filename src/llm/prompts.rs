//! Prompts sent to the model.

/// Sent alongside the uploaded document.
pub const EXTRACTION_PROMPT: &str = "Extract all text from this document. Preserve line breaks, formatting, and structure if possible. If this is a scientific protocol, focus on extracting the step-by-step instructions, materials, and procedures.";

pub const TRANSCRIPTION_PROMPT: &str = "Transcribe the following audio:";

/// Assistant framing for a voice turn. Uses `{transcript}`.
pub const ASSISTANT_PROMPT: &str = r#"You are an experiment assistant guiding a scientist step-by-step through a protocol.

The user said: "{transcript}"

Please provide a helpful response to guide them with their experiment. Keep it conversational and brief."#;

/// Protocol summary request. Uses `{document_id}`, `{protocol_id}` and `{text}`.
pub const PROTOCOL_PROMPT: &str = r#"Given the following protocol text, produce JSON matching the schema for the protocol.
The description should be a concise summary of what is accomplished in the experiment.
Use the following pre-assigned IDs:
document_id: {document_id}
protocol_id: {protocol_id}
Text:
{text}"#;

/// Step list request. Uses `{protocol_id}` and `{text}`.
pub const STEPS_PROMPT: &str = r#"Given the following protocol text, produce JSON matching the schema for each step of the protocol.
There will often be a step with sub steps; in that case treat every step as its own step number.
If there is a time range given vs an exact time, select the upper bound of the time range.
The steps belong to the protocol with the pre-assigned ID:
protocol_id: {protocol_id}
Text:
{text}"#;

pub fn assistant_prompt(transcript: &str) -> String {
    ASSISTANT_PROMPT.replace("{transcript}", transcript)
}

pub fn protocol_prompt(document_id: &str, protocol_id: &str, text: &str) -> String {
    PROTOCOL_PROMPT
        .replace("{document_id}", document_id)
        .replace("{protocol_id}", protocol_id)
        .replace("{text}", text)
}

pub fn steps_prompt(protocol_id: &str, text: &str) -> String {
    STEPS_PROMPT
        .replace("{protocol_id}", protocol_id)
        .replace("{text}", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_prompt_carries_ids_and_text() {
        let prompt = protocol_prompt("doc-1", "proto-9", "1. Thaw cells");
        assert!(prompt.contains("document_id: doc-1"));
        assert!(prompt.contains("protocol_id: proto-9"));
        assert!(prompt.ends_with("1. Thaw cells"));
    }

    #[test]
    fn test_steps_prompt_states_numbering_and_duration_policy() {
        let prompt = steps_prompt("proto-9", "1. Spin");
        assert!(prompt.contains("treat every step as its own step number"));
        assert!(prompt.contains("upper bound of the time range"));
        assert!(prompt.contains("protocol_id: proto-9"));
        assert!(prompt.ends_with("1. Spin"));
    }

    #[test]
    fn test_assistant_prompt_quotes_transcript() {
        assert!(assistant_prompt("what is next").contains("The user said: \"what is next\""));
    }
}
