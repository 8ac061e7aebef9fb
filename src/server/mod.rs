//! HTTP API for protocol ingestion and experiment runs.
//!
//! Routes live under `/api`. With the filesystem object store the server
//! also serves the bucket so stored locators resolve.

mod error;
mod handlers;
mod routes;

pub use error::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{Settings, StorageBackend};
use crate::llm::{ChatResponder, GeminiClient, SpeechTranscriber, StructuredGenerator, TextExtractor};
use crate::repository::DbContext;
use crate::services::{ExperimentRuntime, IngestPipeline};
use crate::storage::ObjectStore;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub db: DbContext,
    pub store: Arc<dyn ObjectStore>,
    pub pipeline: IngestPipeline,
    pub runtime: ExperimentRuntime,
}

impl AppState {
    /// Wire services from their collaborators.
    pub fn from_parts(
        db: DbContext,
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn StructuredGenerator>,
        transcriber: Arc<dyn SpeechTranscriber>,
        responder: Arc<dyn ChatResponder>,
    ) -> Self {
        let pipeline = IngestPipeline::new(db.protocols(), store.clone(), extractor, generator);
        let runtime = ExperimentRuntime::new(
            db.protocols(),
            db.experiments(),
            transcriber,
            responder,
        );
        Self {
            db,
            store,
            pipeline,
            runtime,
        }
    }

    /// Build state from settings, backing every AI capability with Gemini.
    ///
    /// The schema is expected to exist already.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db = settings.create_db_context()?;

        let store = settings.create_object_store().await?;

        if !settings.gemini.is_configured() {
            tracing::warn!("GEMINI_API_KEY is not set; AI-backed endpoints will fail");
        }
        let gemini = Arc::new(GeminiClient::new(settings.gemini.clone())?);

        Ok(Self::from_parts(
            db,
            store,
            gemini.clone(),
            gemini.clone(),
            gemini.clone(),
            gemini,
        ))
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let state = AppState::new(settings).await?;
    let app = create_router(state, settings.storage_backend == StorageBackend::Local);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
