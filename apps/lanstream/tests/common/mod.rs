#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use lanstream::{
    history::History, hub::ConnectionHub, routes::build_router, state::AppState,
    uploads::UploadDir,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BODY_LIMIT: usize = 1 << 20;

/// A fully wired app rooted in its own temporary directory.
pub struct TestApp {
    pub dir: TempDir,
    pub state: Arc<AppState>,
    pub router: Router,
}

impl TestApp {
    /// Must run inside a Tokio runtime; the hub loop is spawned here.
    pub fn new() -> Self {
        Self::with(|state| state)
    }

    pub fn with(customize: impl FnOnce(AppState) -> AppState) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir).expect("static dir");
        std::fs::write(static_dir.join("index.html"), "<h1>lanstream</h1>").expect("index");

        let (hub, _task) = ConnectionHub::spawn();
        let state = Arc::new(customize(AppState::new(
            History::open(dir.path().join("history.json"), 10),
            hub,
            UploadDir::new(dir.path().join("uploads")),
        )));
        let router = build_router(state.clone(), &static_dir);

        Self { dir, state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

pub fn multipart_body(boundary: &str, field: &str, filename: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
