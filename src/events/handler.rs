use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::StreamExt;
use std::convert::Infallible;

use crate::state::AppState;

/// GET /events
///
/// Server-Sent Events stream of upload notifications. Each upload arrives as
/// one `data: {"filename":..,"path":..}` frame. The stream stays open until
/// the client disconnects or the server shuts down; the subscription is
/// removed from the registry when the response body is dropped.
pub async fn subscribe_events(State(state): State<AppState>) -> Response {
    let subscription = state.subscribers.subscribe();

    tracing::info!(
        subscriber_id = %subscription.id(),
        subscribers = state.subscribers.len(),
        "Event stream opened"
    );

    let stream = subscription.map(|frame| Ok::<_, Infallible>(Event::default().data(&*frame)));

    let headers = [(header::CONNECTION, HeaderValue::from_static("keep-alive"))];

    match state.keep_alive {
        Some(interval) => (
            headers,
            Sse::new(stream).keep_alive(KeepAlive::new().interval(interval)),
        )
            .into_response(),
        None => (headers, Sse::new(stream)).into_response(),
    }
}
