//! HTTP error mapping. Every error renders as `{"detail": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::repository::DieselError;
use crate::services::{ExperimentError, IngestError};
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(d) | ApiError::NotFound(d) | ApiError::Internal(d) => d,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("Request failed: {}", detail);
        }
        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

impl From<DieselError> for ApiError {
    fn from(e: DieselError) -> Self {
        ApiError::Internal(format!("Database error: {}", e))
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => ApiError::NotFound(format!("File not found: {}", key)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::UnsupportedExtension(inner) => ApiError::BadRequest(inner.to_string()),
            IngestError::Failed(_) => ApiError::Internal(format!("Error processing file: {}", e)),
        }
    }
}

impl From<ExperimentError> for ApiError {
    fn from(e: ExperimentError) -> Self {
        match e {
            ExperimentError::ProtocolNotFound(_)
            | ExperimentError::ProtocolStepNotFound(_)
            | ExperimentError::NotFound(_)
            | ExperimentError::StepNotFound(_) => ApiError::NotFound(e.to_string()),
            ExperimentError::EndBeforeStart { .. } => ApiError::BadRequest(e.to_string()),
            ExperimentError::Database(inner) => inner.into(),
        }
    }
}

/// Parse a path or body identifier, naming the entity in the 400 message.
pub fn parse_id(raw: &str, entity: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} ID format", entity)))
}
