use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};

use super::ApiError;
use crate::event::Event;
use crate::history::{HistoryPage, ListQuery};
use crate::state::AppState;

/// GET /history - newest first, optionally filtered by `type` and paged by
/// `limit`/`offset`.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<HistoryPage> {
    Json(state.history.list(&query))
}

/// GET /history/recent - the in-memory window, oldest first.
pub async fn recent_history(State(state): State<Arc<AppState>>) -> Json<Vec<Event>> {
    Json(state.history.recent().snapshot())
}

/// DELETE /history/delete - body is the event to drop; only `type` and
/// `timestamp` are looked at.
pub async fn delete_history_item(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event: Event = serde_json::from_slice(&body)
        .map_err(|err| ApiError::BadRequest(format!("invalid event: {err}")))?;

    let removed = state.delete_event(&event).await;
    debug!(timestamp = %event.timestamp, kind = %event.kind, removed, "history item delete");
    Ok(StatusCode::OK)
}

/// DELETE /history/clear - wipe history and uploads, notify every client.
pub async fn clear_history(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state
        .clear_all()
        .await
        .map_err(|_| ApiError::Internal("failed to clear history"))?;
    info!("history cleared");
    Ok(StatusCode::OK)
}
