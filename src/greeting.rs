//! Static greeting and health endpoints.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// GET /
pub async fn hello() -> &'static str {
    "Hello, world!"
}

/// GET /abc
pub async fn welcome() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the API",
    })
}

/// GET /api
pub async fn api_welcome() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the abc",
    })
}

/// Basic health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}
