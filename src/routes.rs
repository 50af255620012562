use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::events::handler as events_handler;
use crate::greeting;
use crate::state::AppState;
use crate::uploads::routes as upload_routes;
use crate::users::routes as user_routes;

/// Room for multipart framing on top of the file size limit, so the blob
/// store's own limit (413) trips before the transport limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.blobs.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let greeting_router = Router::new()
        .route("/", get(greeting::hello))
        .route("/abc", get(greeting::welcome))
        .route("/api", get(greeting::api_welcome))
        .route("/health", get(greeting::health_check));

    let user_router = Router::new().route(
        "/api/users",
        get(user_routes::list_users).post(user_routes::create_user),
    );

    let upload_router = Router::new()
        .route("/upload", post(upload_routes::upload_file))
        .layer(DefaultBodyLimit::max(body_limit));

    let event_router = Router::new().route("/events", get(events_handler::subscribe_events));

    let cors_layer = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .merge(greeting_router)
        .merge(user_router)
        .merge(upload_router)
        .merge(event_router)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Last-resort 500 for handlers that panic.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong!").into_response()
}
