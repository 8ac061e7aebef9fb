//! Serves the local bucket so locators from the filesystem store resolve.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::super::error::ApiError;
use super::super::AppState;

pub async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    if key.contains('/') || key.contains("..") {
        return Err(ApiError::NotFound("File not found".to_string()));
    }
    let locator = state.store.locator_for(&key);
    let info = state
        .store
        .stat(&locator)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;
    let content = state.store.get(&locator).await?;

    let content_type = info
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], content).into_response())
}
