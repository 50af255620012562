//! POST /upload — multipart file upload with live notification.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};

use crate::error::ApiError;
use crate::events::UploadEvent;
use crate::state::AppState;

/// Multipart field that carries the file.
const FILE_FIELD: &str = "file";

/// Stored name for a file part whose `filename` parameter is present but empty.
const FALLBACK_FILENAME: &str = "upload";

/// POST /upload
///
/// Stores the first `file` part that carries a file name and announces `{filename, path}` to every
/// `/events` subscriber. The response carries the same JSON. Notification is
/// best effort and never changes the response; only storage failures do.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadEvent>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Upload without multipart body");
        ApiError::bad_request("No file uploaded")
    })?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a filename parameter is a plain form value.
        let Some(filename) = field.file_name() else {
            continue;
        };
        let filename = if filename.is_empty() {
            FALLBACK_FILENAME.to_string()
        } else {
            filename.to_string()
        };

        let stored = state.blobs.put(&filename, field).await?;

        let event = UploadEvent {
            filename: stored.filename,
            path: stored.path,
        };
        let report = state.subscribers.broadcast(&event);

        tracing::info!(
            filename = %event.filename,
            path = %event.path,
            size = stored.size,
            delivered = report.delivered,
            dropped = report.dropped,
            reaped = report.reaped,
            "File uploaded"
        );

        return Ok(Json(event));
    }

    Err(ApiError::bad_request("No file uploaded"))
}
