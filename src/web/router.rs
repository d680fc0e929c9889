use std::path::Path;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::app_state::AppState;
use super::uploads::MAX_BODY_BYTES;
use super::{auth_routes, lms_routes, processing_routes};
use crate::core::ai::AiMode;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ai_mode: AiMode,
    pub authenticated: bool,
    pub uptime_seconds: u64,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ai_mode: state.ai_mode,
        authenticated: state.auth.is_authenticated().await,
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/auth-url", get(auth_routes::auth_url))
        .route("/auth-status", get(auth_routes::auth_status))
        .route("/user", get(lms_routes::current_user))
        .route("/courses", get(lms_routes::courses))
        .route("/courses/:id", get(lms_routes::course))
        .route("/courses/:id/content", get(lms_routes::course_content))
        .route("/process-files", post(processing_routes::process_files))
        .route("/publish-to-brightspace", post(processing_routes::publish))
        .route("/create-announcement", post(lms_routes::create_announcement))
        .route("/create-discussion", post(lms_routes::create_discussion))
        .route("/create-survey", post(lms_routes::create_survey))
        .route(
            "/upload-file-to-brightspace",
            post(lms_routes::upload_file),
        );

    Router::new()
        .nest("/api", api)
        .route("/auth/callback", get(auth_routes::callback))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
