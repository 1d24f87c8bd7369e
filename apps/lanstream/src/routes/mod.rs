mod history;
mod ops;
mod upload;
mod ws;

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use history::{clear_history, delete_history_item, list_history, recent_history};
pub use ops::{health_check, metrics_handler};
pub use upload::upload_file;
pub use ws::ws_handler;

/// Assemble the full router. `static_dir` holds the browser client.
pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    let uploads = ServeDir::new(state.uploads.root());

    Router::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .route("/upload", post(upload_file).layer(upload_limit))
        .route("/history", get(list_history))
        .route("/history/recent", get(recent_history))
        .route("/history/delete", delete(delete_history_item))
        .route("/history/clear", delete(clear_history))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Rejected(StatusCode, String),
    Internal(&'static str),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, Some(message)),
            ApiError::Rejected(status, message) => (status, Some(message)),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some(message.to_string()))
            }
        };
        let body = ApiErrorBody {
            error: status.canonical_reason().unwrap_or("error"),
            message,
        };
        (status, Json(body)).into_response()
    }
}
