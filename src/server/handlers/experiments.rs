//! Experiment run endpoints and the voice assistant turn.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::super::error::{parse_id, ApiError};
use super::super::AppState;
use crate::models::{Experiment, ExperimentConversation, ExperimentStatus, ExperimentStep};
use crate::services::VoiceTurn;

#[derive(Debug, Deserialize)]
pub struct StartExperimentRequest {
    pub protocol_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopExperimentRequest {
    pub experiment_id: String,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StartStepRequest {
    pub protocol_step_id: String,
}

/// Summary returned by start and stop.
#[derive(Debug, Serialize)]
pub struct ExperimentResponse {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub message: String,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub async fn start_experiment(
    State(state): State<AppState>,
    body: Result<Json<StartExperimentRequest>, JsonRejection>,
) -> Result<Json<ExperimentResponse>, ApiError> {
    let request = json_body(body)?;
    let protocol_id = parse_id(&request.protocol_id, "protocol")?;
    let user_id = request
        .user_id
        .as_deref()
        .map(|u| parse_id(u, "user"))
        .transpose()?;

    let experiment = state.runtime.start(protocol_id, user_id).await?;
    Ok(Json(ExperimentResponse {
        experiment_id: experiment.experiment_id.to_string(),
        status: experiment.status,
        message: "Experiment started successfully".to_string(),
    }))
}

pub async fn stop_experiment(
    State(state): State<AppState>,
    body: Result<Json<StopExperimentRequest>, JsonRejection>,
) -> Result<Json<ExperimentResponse>, ApiError> {
    let request = json_body(body)?;
    let experiment_id = parse_id(&request.experiment_id, "experiment")?;

    let experiment = state.runtime.stop(experiment_id, request.end_time).await?;
    Ok(Json(ExperimentResponse {
        experiment_id: experiment.experiment_id.to_string(),
        status: experiment.status,
        message: "Experiment stopped successfully".to_string(),
    }))
}

pub async fn get_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Experiment>, ApiError> {
    let id = parse_id(&experiment_id, "experiment")?;
    Ok(Json(state.runtime.get(id).await?))
}

pub async fn experiments_by_protocol(
    State(state): State<AppState>,
    Path(protocol_id): Path<String>,
) -> Result<Json<Vec<Experiment>>, ApiError> {
    let id = parse_id(&protocol_id, "protocol")?;
    Ok(Json(state.runtime.by_protocol(id).await?))
}

pub async fn experiments_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Experiment>>, ApiError> {
    let id = parse_id(&user_id, "user")?;
    Ok(Json(state.runtime.by_user(id).await?))
}

pub async fn experiment_steps(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Vec<ExperimentStep>>, ApiError> {
    let id = parse_id(&experiment_id, "experiment")?;
    Ok(Json(state.runtime.steps(id).await?))
}

pub async fn start_step(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    body: Result<Json<StartStepRequest>, JsonRejection>,
) -> Result<Json<ExperimentStep>, ApiError> {
    let experiment_id = parse_id(&experiment_id, "experiment")?;
    let request = json_body(body)?;
    let protocol_step_id = parse_id(&request.protocol_step_id, "protocol step")?;
    Ok(Json(
        state.runtime.start_step(experiment_id, protocol_step_id).await?,
    ))
}

pub async fn complete_step(
    State(state): State<AppState>,
    Path(step_id): Path<String>,
) -> Result<Json<ExperimentStep>, ApiError> {
    let id = parse_id(&step_id, "experiment step")?;
    Ok(Json(state.runtime.complete_step(id).await?))
}

pub async fn experiment_conversation(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
) -> Result<Json<Vec<ExperimentConversation>>, ApiError> {
    let id = parse_id(&experiment_id, "experiment")?;
    Ok(Json(state.runtime.conversation(id).await?))
}

struct AudioUpload {
    content_type: String,
    bytes: Vec<u8>,
}

/// Transcribe a recorded utterance and answer it.
///
/// Expects a multipart `file` with an `audio/*` content type and an optional
/// `experiment_id` field.
pub async fn voice_turn(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VoiceTurn>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;

    let mut audio: Option<AudioUpload> = None;
    let mut experiment_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if field.file_name().map_or(true, str::is_empty) {
                    return Err(ApiError::BadRequest("No audio file provided".to_string()));
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("audio/") {
                    return Err(ApiError::BadRequest(
                        "Invalid file type. Only audio files are allowed.".to_string(),
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
                audio = Some(AudioUpload {
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("experiment_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
                if !raw.trim().is_empty() {
                    experiment_id = Some(parse_id(&raw, "experiment")?);
                }
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;
    if audio.bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty audio file".to_string()));
    }
    info!(
        "Received audio ({}, {} bytes)",
        audio.content_type,
        audio.bytes.len()
    );

    Ok(Json(
        state
            .runtime
            .voice_turn(&audio.bytes, &audio.content_type, experiment_id)
            .await,
    ))
}
