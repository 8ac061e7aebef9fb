//! Uploaded document endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use super::super::error::{parse_id, ApiError};
use super::super::AppState;
use crate::models::{Protocol, ProtocolDocument};

pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProtocolDocument>>, ApiError> {
    Ok(Json(state.db.protocols().list_documents().await?))
}

async fn load_document(state: &AppState, raw_id: &str) -> Result<ProtocolDocument, ApiError> {
    let id = parse_id(raw_id, "document")?;
    state
        .db
        .protocols()
        .get_document(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<ProtocolDocument>, ApiError> {
    Ok(Json(load_document(&state, &document_id).await?))
}

pub async fn document_protocols(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<Vec<Protocol>>, ApiError> {
    let document = load_document(&state, &document_id).await?;
    Ok(Json(
        state
            .db
            .protocols()
            .protocols_by_document(&document.document_id)
            .await?,
    ))
}

/// Stream the stored file back with its recorded content type.
pub async fn document_file(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let document = load_document(&state, &document_id).await?;
    let info = state.store.stat(&document.object_url).await?;
    let content = state.store.get(&document.object_url).await?;

    let content_type = document
        .mime_type
        .or_else(|| info.and_then(|i| i.content_type))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "inline; filename=\"{}\"",
        document.document_name.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

/// Delete the document, its protocols and steps, and the stored file.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let document = load_document(&state, &document_id).await?;

    match state.store.delete(&document.object_url).await {
        Ok(true) => {}
        Ok(false) => warn!("Stored file for document {} was already gone", document.document_id),
        Err(e) => warn!("Could not delete stored file for {}: {}", document.document_id, e),
    }
    state
        .db
        .protocols()
        .delete_document(&document.document_id)
        .await?;
    info!("Deleted document {}", document.document_id);

    Ok((
        StatusCode::OK,
        Json(json!({"message": "Document deleted successfully"})),
    )
        .into_response())
}
