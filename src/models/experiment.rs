//! Experiment run models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an experiment run. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    InProgress,
    Completed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Execution state of a single protocol step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    User,
    Agent,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Instruction,
    Observation,
    Question,
    Response,
    Summary,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::Observation => "observation",
            Self::Question => "question",
            Self::Response => "response",
            Self::Summary => "summary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "instruction" => Some(Self::Instruction),
            "observation" => Some(Self::Observation),
            "question" => Some(Self::Question),
            "response" => Some(Self::Response),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

/// One run of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: Uuid,
    pub protocol_id: Uuid,
    pub user_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Begin a new run now.
    pub fn start(protocol_id: Uuid, user_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            experiment_id: Uuid::new_v4(),
            protocol_id,
            user_id,
            start_time: Some(now),
            end_time: None,
            status: ExperimentStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    /// Finish the run at `end_time`.
    pub fn complete(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.status = ExperimentStatus::Completed;
        self.updated_at = Utc::now();
    }
}

/// Execution instance of a protocol step inside an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStep {
    pub experiment_step_id: Uuid,
    pub experiment_id: Uuid,
    pub protocol_step_id: Uuid,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExperimentStep {
    pub fn start(experiment_id: Uuid, protocol_step_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            experiment_step_id: Uuid::new_v4(),
            experiment_id,
            protocol_step_id,
            actual_start_time: Some(now),
            actual_end_time: None,
            status: StepStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self) {
        let now = Utc::now();
        self.actual_end_time = Some(now);
        self.status = StepStatus::Completed;
        self.updated_at = now;
    }
}

/// Append-only conversation message attached to an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConversation {
    pub message_id: Uuid,
    pub experiment_id: Uuid,
    pub experiment_step_id: Option<Uuid>,
    pub sender_role: SenderRole,
    pub message_type: MessageType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ExperimentConversation {
    pub fn new(
        experiment_id: Uuid,
        experiment_step_id: Option<Uuid>,
        sender_role: SenderRole,
        message_type: MessageType,
        content: String,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            experiment_id,
            experiment_step_id,
            sender_role,
            message_type,
            content,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [ExperimentStatus::InProgress, ExperimentStatus::Completed] {
            assert_eq!(ExperimentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SenderRole::from_str("agent"), Some(SenderRole::Agent));
        assert_eq!(MessageType::from_str("summary"), Some(MessageType::Summary));
        assert_eq!(StepStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_experiment_lifecycle() {
        let mut exp = Experiment::start(Uuid::new_v4(), None);
        assert_eq!(exp.status, ExperimentStatus::InProgress);
        assert!(exp.start_time.is_some());
        assert!(exp.end_time.is_none());

        let end = Utc::now();
        exp.complete(end);
        assert_eq!(exp.status, ExperimentStatus::Completed);
        assert_eq!(exp.end_time, Some(end));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExperimentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
