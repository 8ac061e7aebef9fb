//! Domain models for protocols, their source documents and experiment runs.

mod experiment;
mod protocol;

pub use experiment::{
    Experiment, ExperimentConversation, ExperimentStatus, ExperimentStep, MessageType, SenderRole,
    StepStatus,
};
pub use protocol::{
    DocumentFormat, IngestionStatus, Protocol, ProtocolDocument, ProtocolPreview, ProtocolStep,
    UnsupportedExtension,
};
