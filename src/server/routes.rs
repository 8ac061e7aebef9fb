//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Largest accepted request body (uploads included).
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        // Protocols
        .route("/protocols", get(handlers::list_protocols))
        .route("/protocols/upload", post(handlers::upload_protocol))
        .route("/protocols/:protocol_id", get(handlers::get_protocol))
        .route(
            "/protocols/:protocol_id/steps",
            get(handlers::get_protocol_steps),
        )
        .route(
            "/protocols/:protocol_id/complete",
            get(handlers::get_protocol_complete),
        )
        // Source documents
        .route("/documents", get(handlers::list_documents))
        .route(
            "/documents/:document_id",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route(
            "/documents/:document_id/protocols",
            get(handlers::document_protocols),
        )
        .route("/documents/:document_id/file", get(handlers::document_file))
        // Experiments
        .route("/experiments/start", post(handlers::start_experiment))
        .route("/experiments/stop", post(handlers::stop_experiment))
        .route("/experiments/voice-turn", post(handlers::voice_turn))
        .route(
            "/experiments/protocol/:protocol_id",
            get(handlers::experiments_by_protocol),
        )
        .route(
            "/experiments/user/:user_id",
            get(handlers::experiments_by_user),
        )
        .route(
            "/experiments/steps/:step_id/complete",
            post(handlers::complete_step),
        )
        .route("/experiments/:experiment_id", get(handlers::get_experiment))
        .route(
            "/experiments/:experiment_id/steps",
            get(handlers::experiment_steps).post(handlers::start_step),
        )
        .route(
            "/experiments/:experiment_id/conversation",
            get(handlers::experiment_conversation),
        )
}

/// Create the main router with all routes.
///
/// When `serve_bucket` is set, objects of the store's bucket are served at
/// `/{bucket}/{key}` so locators from the filesystem store resolve.
pub fn create_router(state: AppState, serve_bucket: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::root))
        .nest("/api", api_routes());

    if serve_bucket {
        let path = format!("/{}/*key", state.store.bucket());
        router = router.route(&path, get(handlers::serve_object));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
