use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, warn};

use crate::event::{Event, EventClock, EventKind};
use crate::history::{History, HistoryError};
use crate::hub::{HubHandle, DEFAULT_CONNECTION_BUFFER};
use crate::uploads::{UploadDir, UploadError};

#[derive(Debug, Error)]
pub enum ClearError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Uploads(#[from] UploadError),
}

/// Shared by every handler as `Arc<AppState>`.
pub struct AppState {
    pub history: History,
    pub hub: HubHandle,
    pub uploads: UploadDir,
    pub clock: EventClock,
    pub connection_buffer: usize,
    pub max_upload_bytes: usize,
    pub metrics: Option<PrometheusHandle>,
    // Held across stamp, record and broadcast so archive order, wire order
    // and timestamp order agree.
    publish_guard: Mutex<()>,
}

impl AppState {
    pub fn new(history: History, hub: HubHandle, uploads: UploadDir) -> Self {
        Self {
            history,
            hub,
            uploads,
            clock: EventClock::new(),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            max_upload_bytes: crate::cli::DEFAULT_MAX_UPLOAD_BYTES,
            metrics: None,
            publish_guard: Mutex::new(()),
        }
    }

    pub fn with_connection_buffer(mut self, depth: usize) -> Self {
        self.connection_buffer = depth.max(1);
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Stamps a new event, records it in both logs and fans it out.
    pub fn publish(&self, kind: EventKind, content: impl Into<String>) -> Event {
        let content = content.into();
        off_reactor(|| {
            let _guard = self.publish_guard.lock();
            let event = self.clock.stamp(kind, content);
            self.history.record(event.clone());
            self.announce(&event);
            event
        })
    }

    /// Drops the described event from history. For a file event the stored
    /// file goes too; failing to remove it does not block the rest.
    pub async fn delete_event(&self, event: &Event) -> bool {
        if event.kind == EventKind::File {
            if let Err(err) = self.uploads.remove(&event.content).await {
                warn!(error = %err, file = %event.content, "could not delete uploaded file");
            }
        }
        off_reactor(|| self.history.delete(event.timestamp))
    }

    /// Empties history and the upload directory, then tells clients to reset.
    /// Stops at the first failing step; earlier steps are not rolled back.
    pub async fn clear_all(&self) -> Result<(), ClearError> {
        off_reactor(|| self.history.clear()).inspect_err(|err| {
            error!(error = %err, "could not clear history file");
        })?;
        self.uploads.reset().await.inspect_err(|err| {
            error!(error = %err, "could not reset upload directory");
        })?;
        {
            let _guard = self.publish_guard.lock();
            self.announce(&Event::clear());
        }
        Ok(())
    }

    fn announce(&self, event: &Event) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, kind = %event.kind, "could not serialise event");
                return;
            }
        };
        match self.hub.broadcast(payload) {
            Ok(()) => debug!(kind = %event.kind, "event queued for broadcast"),
            Err(err) => warn!(error = %err, kind = %event.kind, "event not broadcast"),
        }
    }
}

/// History writes hit the disk under the log lock. On a multi-threaded
/// runtime the worker hands its other tasks off first; elsewhere (current
/// thread runtime, plain threads) `f` just runs.
fn off_reactor<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLog;
    use crate::hub::ConnectionHub;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn state_in(dir: &std::path::Path) -> (AppState, mpsc::Receiver<Message>) {
        let (hub, _task) = ConnectionHub::spawn();
        let (tx, rx) = mpsc::channel(16);
        hub.register(Uuid::new_v4(), tx).unwrap();
        let state = AppState::new(
            History::open(dir.join("history.json"), 10),
            hub,
            UploadDir::new(dir.join("uploads")),
        );
        (state, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Message>) -> Event {
        match rx.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn publish_records_then_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state_in(dir.path());

        let event = state.publish(EventKind::Text, "hello");

        assert_eq!(next_event(&mut rx).await, event);
        assert_eq!(state.history.archive().snapshot(), vec![event.clone()]);
        assert_eq!(state.history.recent().snapshot(), vec![event]);
    }

    #[test_timeout::tokio_timeout_test]
    async fn deleting_file_event_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _rx) = state_in(dir.path());
        state.uploads.store("a.png", b"png").await.unwrap();
        let event = state.publish(EventKind::File, "a.png");

        assert!(state.delete_event(&event).await);
        assert!(!state.uploads.root().join("a.png").exists());
        assert!(state.history.archive().is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_upload_does_not_block_history_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _rx) = state_in(dir.path());
        let event = state.publish(EventKind::File, "gone.png");

        assert!(state.delete_event(&event).await);
        assert!(state.history.archive().is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn clear_all_resets_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let (state, mut rx) = state_in(dir.path());
        for i in 0..5 {
            state.publish(EventKind::Text, format!("m{i}"));
        }
        for name in ["a.png", "b.png", "c.png"] {
            state.uploads.store(name, b"x").await.unwrap();
        }
        for _ in 0..5 {
            next_event(&mut rx).await;
        }

        state.clear_all().await.unwrap();

        assert!(state.history.archive().is_empty());
        assert!(state.history.recent().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("history.json")).unwrap(),
            "[]"
        );
        assert_eq!(std::fs::read_dir(state.uploads.root()).unwrap().count(), 0);
        assert_eq!(next_event(&mut rx).await, Event::clear());
    }

    #[test_timeout::tokio_timeout_test]
    async fn concurrent_publishers_keep_archive_chronological() {
        let (hub, _task) = ConnectionHub::spawn();
        let state = std::sync::Arc::new(AppState::new(
            History::new(HistoryLog::unbounded(), HistoryLog::bounded(10)),
            hub,
            UploadDir::new("unused"),
        ));

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let state = state.clone();
                scope.spawn(move || {
                    for i in 0..2_000 {
                        state.publish(EventKind::Text, format!("{worker}-{i}"));
                    }
                });
            }
        });

        let archived = state.history.archive().snapshot();
        assert_eq!(archived.len(), 16_000);
        assert!(
            archived.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "archive insertion order drifted from timestamp order"
        );
        let recent = state.history.recent().snapshot();
        assert_eq!(recent, archived[archived.len() - 10..].to_vec());
    }

    #[test_timeout::timeout]
    fn publish_on_multi_thread_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        runtime.block_on(async {
            let (state, mut rx) = state_in(dir.path());
            let state = std::sync::Arc::new(state);
            let published = tokio::spawn({
                let state = state.clone();
                async move { state.publish(EventKind::Text, "from a worker") }
            })
            .await
            .unwrap();

            assert_eq!(next_event(&mut rx).await, published);
            assert!(state.delete_event(&published).await);
            state.clear_all().await.unwrap();
            assert!(state.history.archive().is_empty());
        });
    }
}
