//! Event history: the persisted archive plus the in-memory recent window.
//!
//! Both logs are updated in the same order (archive first) but not
//! atomically; the recent window is always rebuildable from the archive.

mod log;
mod query;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::event::Event;

pub use log::HistoryLog;
pub use query::{list, HistoryPage, ListQuery, DEFAULT_PAGE_LIMIT};

pub const DEFAULT_RECENT_CAPACITY: usize = 10;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse history file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode history: {0}")]
    Encode(serde_json::Error),
    #[error("failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct History {
    archive: HistoryLog,
    recent: HistoryLog,
}

impl History {
    pub fn new(archive: HistoryLog, recent: HistoryLog) -> Self {
        Self { archive, recent }
    }

    /// Loads the archive from `path` and rebuilds the recent window from it.
    /// A missing or unreadable file leaves both logs empty.
    pub fn open(path: impl AsRef<Path>, recent_capacity: usize) -> Self {
        let path = path.as_ref();
        let history = Self::new(
            HistoryLog::unbounded().persisted_at(path),
            HistoryLog::bounded(recent_capacity),
        );

        match history.archive.load() {
            Ok(count) => info!(path = %path.display(), events = count, "history loaded"),
            Err(err) => warn!(error = %err, "starting with empty history"),
        }
        for event in history.archive.snapshot() {
            if let Err(err) = history.recent.add(event) {
                warn!(error = %err, "recent window not persisted while rebuilding");
            }
        }

        history
    }

    pub fn archive(&self) -> &HistoryLog {
        &self.archive
    }

    pub fn recent(&self) -> &HistoryLog {
        &self.recent
    }

    /// Appends to the archive (persisting it) and then to the recent window.
    /// A failed save is logged; the event stays recorded in memory.
    pub fn record(&self, event: Event) {
        let kind = event.kind.as_str();
        if let Err(err) = self.archive.add(event.clone()) {
            counter!("lanstream_history_save_failures_total", 1);
            warn!(error = %err, "history not persisted");
        }
        if let Err(err) = self.recent.add(event) {
            warn!(error = %err, "recent window not persisted");
        }
        counter!("lanstream_events_recorded_total", 1, "kind" => kind);
    }

    /// Removes the event stamped `timestamp` from both logs.
    pub fn delete(&self, timestamp: DateTime<Utc>) -> bool {
        let removed = match self.archive.delete(timestamp) {
            Ok(removed) => removed,
            Err(err) => {
                counter!("lanstream_history_save_failures_total", 1);
                warn!(error = %err, %timestamp, "history not persisted after delete");
                true
            }
        };
        if let Err(err) = self.recent.delete(timestamp) {
            warn!(error = %err, %timestamp, "recent window not persisted after delete");
        }
        removed
    }

    /// Empties both logs and truncates the archive file. Both logs are
    /// emptied even if one fails to persist; the first error is returned.
    pub fn clear(&self) -> Result<(), HistoryError> {
        let archived = self.archive.clear();
        let recent = self.recent.clear();
        archived.and(recent)
    }

    pub fn list(&self, query: &ListQuery) -> HistoryPage {
        list(self.archive.snapshot(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventClock, EventKind};

    #[test_timeout::timeout]
    fn record_feeds_both_logs() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path().join("history.json"), 2);
        let clock = EventClock::new();

        for i in 0..3 {
            history.record(clock.stamp(EventKind::Text, format!("m{i}")));
        }

        assert_eq!(history.archive().len(), 3);
        let recent: Vec<String> = history
            .recent()
            .snapshot()
            .into_iter()
            .map(|event| event.content)
            .collect();
        assert_eq!(recent, vec!["m1", "m2"]);
    }

    #[test_timeout::timeout]
    fn reopen_rebuilds_recent_window_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let clock = EventClock::new();
        {
            let history = History::open(&path, 10);
            for i in 0..12 {
                history.record(clock.stamp(EventKind::Text, format!("m{i}")));
            }
        }

        let reopened = History::open(&path, 10);
        assert_eq!(reopened.archive().len(), 12);
        assert_eq!(reopened.recent().len(), 10);
        assert_eq!(reopened.recent().snapshot()[0].content, "m2");
    }

    #[test_timeout::timeout]
    fn corrupt_archive_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        let history = History::open(&path, 10);
        assert!(history.archive().is_empty());
        assert!(history.recent().is_empty());
    }

    #[test_timeout::timeout]
    fn delete_reaches_both_logs_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History::open(&path, 10);
        let clock = EventClock::new();
        let keep = clock.stamp(EventKind::Text, "keep");
        let drop = clock.stamp(EventKind::File, "a.png");
        history.record(keep.clone());
        history.record(drop.clone());

        assert!(history.delete(drop.timestamp));
        assert!(!history.delete(drop.timestamp));

        assert_eq!(history.archive().snapshot(), vec![keep.clone()]);
        assert_eq!(history.recent().snapshot(), vec![keep.clone()]);
        let on_disk: Vec<Event> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, vec![keep]);
    }

    #[test_timeout::timeout]
    fn clear_empties_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History::open(&path, 10);
        let clock = EventClock::new();
        for i in 0..5 {
            history.record(clock.stamp(EventKind::Text, format!("m{i}")));
        }

        history.clear().unwrap();

        assert!(history.archive().is_empty());
        assert!(history.recent().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test_timeout::timeout]
    fn recent_window_failures_surface() {
        let dir = tempfile::tempdir().unwrap();
        let unwritable = dir.path().join("missing").join("recent.json");
        let history = History::new(
            HistoryLog::unbounded(),
            HistoryLog::bounded(10).persisted_at(&unwritable),
        );
        let clock = EventClock::new();
        let event = clock.stamp(EventKind::Text, "hi");

        history.record(event.clone());
        assert_eq!(history.archive().snapshot(), vec![event.clone()]);
        assert_eq!(history.recent().snapshot(), vec![event]);

        assert!(matches!(history.clear(), Err(HistoryError::Write { .. })));
        assert!(history.archive().is_empty());
        assert!(history.recent().is_empty());
    }

    #[test_timeout::timeout]
    fn list_reads_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path().join("history.json"), 1);
        let clock = EventClock::new();
        let hi = clock.stamp(EventKind::Text, "hi");
        history.record(hi.clone());
        history.record(clock.stamp(EventKind::File, "a.png"));

        let page = history.list(&ListQuery {
            kind: Some("text".into()),
            ..ListQuery::default()
        });
        assert_eq!(page.total, 1);
        assert_eq!(page.messages, vec![hi]);
    }
}
