//! Experiment runs and the voice assistant.
//!
//! Transcription and chat are best-effort: their failures are replaced by
//! fixed copy instead of failing the turn.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::prompts::assistant_prompt;
use crate::llm::{ChatResponder, SpeechTranscriber};
use crate::models::{
    Experiment, ExperimentConversation, ExperimentStep, MessageType, SenderRole,
};
use crate::repository::{DieselError, ExperimentRepository, ProtocolRepository};

/// Transcript used when speech could not be transcribed.
pub const FALLBACK_TRANSCRIPT: &str = "I couldn't understand what you said.";
/// Transcript returned when the turn could not be processed at all.
pub const ERROR_TRANSCRIPT: &str = "Error occurred";
pub const ERROR_REPLY: &str = "I'm sorry, I encountered an error. Please try again.";

/// Reply used when the assistant could not answer.
pub fn echo_reply(transcript: &str) -> String {
    format!(
        "I heard you say: '{}'. How can I help you with your experiment?",
        transcript
    )
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Protocol not found: {0}")]
    ProtocolNotFound(Uuid),
    #[error("Protocol step not found: {0}")]
    ProtocolStepNotFound(Uuid),
    #[error("Experiment not found: {0}")]
    NotFound(Uuid),
    #[error("Experiment step not found: {0}")]
    StepNotFound(Uuid),
    #[error("end_time {end} is before start_time {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

/// Result of one voice turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTurn {
    pub transcript: String,
    pub reply: String,
}

impl VoiceTurn {
    fn error() -> Self {
        Self {
            transcript: ERROR_TRANSCRIPT.to_string(),
            reply: ERROR_REPLY.to_string(),
        }
    }
}

/// Owns experiment lifecycle and conversation.
#[derive(Clone)]
pub struct ExperimentRuntime {
    protocols: ProtocolRepository,
    experiments: ExperimentRepository,
    transcriber: Arc<dyn SpeechTranscriber>,
    responder: Arc<dyn ChatResponder>,
}

impl ExperimentRuntime {
    pub fn new(
        protocols: ProtocolRepository,
        experiments: ExperimentRepository,
        transcriber: Arc<dyn SpeechTranscriber>,
        responder: Arc<dyn ChatResponder>,
    ) -> Self {
        Self {
            protocols,
            experiments,
            transcriber,
            responder,
        }
    }

    /// Start a run of an existing protocol.
    pub async fn start(
        &self,
        protocol_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Experiment, ExperimentError> {
        if self.protocols.get_protocol(&protocol_id).await?.is_none() {
            return Err(ExperimentError::ProtocolNotFound(protocol_id));
        }
        let experiment = self
            .experiments
            .upsert_experiment(&Experiment::start(protocol_id, user_id))
            .await?;
        info!(
            "Started experiment {} for protocol {}",
            experiment.experiment_id, protocol_id
        );
        Ok(experiment)
    }

    /// Complete a run at `end_time`, or now.
    ///
    /// Stopping an already completed run overwrites its end time.
    pub async fn stop(
        &self,
        experiment_id: Uuid,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Experiment, ExperimentError> {
        let mut experiment = self.get(experiment_id).await?;
        let end = end_time.unwrap_or_else(Utc::now);
        if let Some(start) = experiment.start_time {
            if end < start {
                return Err(ExperimentError::EndBeforeStart { start, end });
            }
        }
        experiment.complete(end);
        let experiment = self.experiments.upsert_experiment(&experiment).await?;
        info!("Stopped experiment {}", experiment_id);
        Ok(experiment)
    }

    pub async fn get(&self, experiment_id: Uuid) -> Result<Experiment, ExperimentError> {
        self.experiments
            .get_experiment(&experiment_id)
            .await?
            .ok_or(ExperimentError::NotFound(experiment_id))
    }

    pub async fn by_protocol(&self, protocol_id: Uuid) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.experiments.experiments_by_protocol(&protocol_id).await?)
    }

    pub async fn by_user(&self, user_id: Uuid) -> Result<Vec<Experiment>, ExperimentError> {
        Ok(self.experiments.experiments_by_user(&user_id).await?)
    }

    /// Begin executing a protocol step within a run.
    pub async fn start_step(
        &self,
        experiment_id: Uuid,
        protocol_step_id: Uuid,
    ) -> Result<ExperimentStep, ExperimentError> {
        self.get(experiment_id).await?;
        if self.protocols.get_step(&protocol_step_id).await?.is_none() {
            return Err(ExperimentError::ProtocolStepNotFound(protocol_step_id));
        }
        let step = self
            .experiments
            .upsert_step(&ExperimentStep::start(experiment_id, protocol_step_id))
            .await?;
        Ok(step)
    }

    pub async fn complete_step(
        &self,
        experiment_step_id: Uuid,
    ) -> Result<ExperimentStep, ExperimentError> {
        let mut step = self
            .experiments
            .get_step(&experiment_step_id)
            .await?
            .ok_or(ExperimentError::StepNotFound(experiment_step_id))?;
        step.complete();
        Ok(self.experiments.upsert_step(&step).await?)
    }

    pub async fn steps(&self, experiment_id: Uuid) -> Result<Vec<ExperimentStep>, ExperimentError> {
        self.get(experiment_id).await?;
        Ok(self.experiments.steps_by_experiment(&experiment_id).await?)
    }

    pub async fn conversation(
        &self,
        experiment_id: Uuid,
    ) -> Result<Vec<ExperimentConversation>, ExperimentError> {
        self.get(experiment_id).await?;
        Ok(self.experiments.messages_by_experiment(&experiment_id).await?)
    }

    /// Transcribe an utterance and answer it. Never fails.
    ///
    /// With an `experiment_id` naming a stored run, both sides of the turn are
    /// appended to its conversation.
    pub async fn voice_turn(
        &self,
        audio: &[u8],
        mime_type: &str,
        experiment_id: Option<Uuid>,
    ) -> VoiceTurn {
        if audio.is_empty() {
            warn!("Voice turn received empty audio");
            return VoiceTurn::error();
        }

        let (transcript, transcribed) = match self.transcriber.transcribe(audio, mime_type).await
        {
            Ok(t) => (t, true),
            Err(e) => {
                warn!("Error in transcription: {}; using fallback transcript", e);
                (FALLBACK_TRANSCRIPT.to_string(), false)
            }
        };

        let reply = match self.responder.reply(&assistant_prompt(&transcript)).await {
            Ok(r) => r,
            Err(e) if transcribed => {
                warn!("Error in conversation: {}; echoing transcript", e);
                echo_reply(&transcript)
            }
            Err(e) => {
                warn!("Error in conversation after failed transcription: {}", e);
                return VoiceTurn::error();
            }
        };

        if let Some(experiment_id) = experiment_id {
            self.record_turn(experiment_id, &transcript, &reply).await;
        }

        VoiceTurn { transcript, reply }
    }

    async fn record_turn(&self, experiment_id: Uuid, transcript: &str, reply: &str) {
        match self.experiments.get_experiment(&experiment_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Voice turn for unknown experiment {}", experiment_id);
                return;
            }
            Err(e) => {
                warn!("Could not load experiment {}: {}", experiment_id, e);
                return;
            }
        }

        let question = ExperimentConversation::new(
            experiment_id,
            None,
            SenderRole::User,
            MessageType::Question,
            transcript.to_string(),
        );
        let mut response = ExperimentConversation::new(
            experiment_id,
            None,
            SenderRole::Agent,
            MessageType::Response,
            reply.to_string(),
        );
        // Keep the reply strictly after the question.
        if response.created_at <= question.created_at {
            response.created_at = question.created_at + chrono::Duration::microseconds(1);
        }

        for message in [question, response] {
            if let Err(e) = self.experiments.append_message(&message).await {
                warn!(
                    "Failed to record conversation for experiment {}: {}",
                    experiment_id, e
                );
            }
        }
    }
}
