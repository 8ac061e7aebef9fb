//! Service layer for ingestion and experiment runs.
//!
//! Services take their collaborators as trait objects and are shared by the
//! HTTP server and the CLI.

pub mod experiment;
pub mod ingest;
pub mod parse;

pub use experiment::{ExperimentError, ExperimentRuntime, VoiceTurn};
pub use ingest::{IngestError, IngestFailure, IngestPipeline};
pub use parse::ParseError;
