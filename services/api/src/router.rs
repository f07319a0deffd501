//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the status endpoints, the media-stream WebSocket endpoint, and
//! OpenAPI documentation.

use crate::{handlers, models::HealthResponse, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::root, handlers::health),
    components(schemas(HealthResponse)),
    tags(
        (name = "Hostline", description = "Telephony to realtime voice bridge")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/media-stream", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
