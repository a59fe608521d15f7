//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

/// JSON 404 for unknown routes
async fn fallback_handler(uri: axum::http::Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(handlers::ApiError {
            error: format!("Not Found: {}", uri.path()),
        }),
    )
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time updates
        .route("/ws", get(ws_handler))
        // Gateways
        .route("/api/gateways", get(handlers::list_gateways))
        .route("/api/gateways/{name}", get(handlers::get_gateway))
        .route(
            "/api/gateways/{name}/owners/{address}",
            get(handlers::check_owner),
        )
        .route("/api/gateways/{name}/hash", post(handlers::compute_hash))
        .route("/api/gateways/{name}/approve", post(handlers::approve))
        .route("/api/gateways/{name}/execute", post(handlers::execute))
        .route(
            "/api/gateways/{name}/approvals/{hash}",
            get(handlers::get_approvals),
        )
        // Tokens
        .route("/api/tokens/{address}", get(handlers::get_token))
        .fallback(fallback_handler)
        .with_state(state)
        .layer(cors)
}
