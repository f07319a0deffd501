//! Axum Handlers for the HTTP surface
//!
//! Liveness and status endpoints of the media-stream server. They use
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::{models::HealthResponse, state::AppState};

pub const ROOT_MESSAGE: &str = "Media Stream Server";

/// Report liveness and the number of calls currently bridged.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_calls: state.registry.len().await,
    })
}

/// Identify the server.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Server banner", body = String, content_type = "text/plain")
    )
)]
pub async fn root() -> &'static str {
    ROOT_MESSAGE
}
