//! Liveness endpoints.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "message": "API is healthy"}))
}

pub async fn root() -> Json<Value> {
    Json(json!({"message": "Welcome to Protocol Copilot API"}))
}
