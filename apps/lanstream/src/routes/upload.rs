use std::sync::Arc;

use axum::extract::{Multipart, State};
use tracing::{error, info};

use super::ApiError;
use crate::event::EventKind;
use crate::state::AppState;
use crate::uploads::UploadError;

const FILE_FIELD: &str = "file";

/// POST /upload - multipart form with a `file` field. The stored file is
/// announced as a `file` event.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<&'static str, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Rejected(err.status(), err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::Rejected(err.status(), err.body_text()))?;

        let stored = state
            .uploads
            .store(&filename, &bytes)
            .await
            .map_err(|err| match err {
                UploadError::InvalidName(_) => ApiError::BadRequest(err.to_string()),
                UploadError::Io { .. } => {
                    error!(error = %err, "could not store upload");
                    ApiError::Internal("could not store upload")
                }
            })?;
        info!(file = %stored, bytes = bytes.len(), "file uploaded");

        state.publish(EventKind::File, stored);
        return Ok("Successfully Uploaded File\n");
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart field `{FILE_FIELD}`"
    )))
}
