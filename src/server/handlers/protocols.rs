//! Protocol endpoints, including upload and ingestion.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use tracing::info;

use super::super::error::{parse_id, ApiError};
use super::super::AppState;
use crate::models::{DocumentFormat, Protocol, ProtocolPreview, ProtocolStep};

pub async fn list_protocols(State(state): State<AppState>) -> Result<Json<Vec<Protocol>>, ApiError> {
    Ok(Json(state.db.protocols().list_protocols().await?))
}

pub async fn get_protocol(
    State(state): State<AppState>,
    Path(protocol_id): Path<String>,
) -> Result<Json<Protocol>, ApiError> {
    let id = parse_id(&protocol_id, "protocol")?;
    state
        .db
        .protocols()
        .get_protocol(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Protocol not found".to_string()))
}

pub async fn get_protocol_steps(
    State(state): State<AppState>,
    Path(protocol_id): Path<String>,
) -> Result<Json<Vec<ProtocolStep>>, ApiError> {
    let id = parse_id(&protocol_id, "protocol")?;
    Ok(Json(state.db.protocols().steps_by_protocol(&id).await?))
}

/// Protocol, its steps and the locator of the source file.
pub async fn get_protocol_complete(
    State(state): State<AppState>,
    Path(protocol_id): Path<String>,
) -> Result<Json<ProtocolPreview>, ApiError> {
    let id = parse_id(&protocol_id, "protocol")?;
    let repo = state.db.protocols();
    let protocol = repo
        .get_protocol(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Protocol not found".to_string()))?;
    let document = repo
        .get_document(&protocol.document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Protocol document not found".to_string()))?;
    let steps = repo.steps_by_protocol(&id).await?;

    Ok(Json(ProtocolPreview::new(protocol, steps, document.object_url)))
}

/// Accept a multipart `file` and run it through ingestion.
pub async fn upload_protocol(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProtocolPreview>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(ApiError::BadRequest("No file provided".to_string())),
        };
        let format = DocumentFormat::from_filename(&filename)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
        info!("Received upload {} ({} bytes)", filename, content.len());

        let preview = state
            .pipeline
            .ingest(&content, &filename, format.extension())
            .await?;
        return Ok(Json(preview));
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}
