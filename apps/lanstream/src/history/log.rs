use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::HistoryError;
use crate::event::Event;

/// An insertion-ordered event log behind a single lock.
///
/// A log is either unbounded or capped at a fixed capacity, in which case the
/// oldest event is evicted to make room. A log with a backing file rewrites
/// that file after every mutation while still holding the lock, so the file
/// never lags the in-memory sequence.
#[derive(Debug)]
pub struct HistoryLog {
    capacity: Option<usize>,
    path: Option<PathBuf>,
    events: Mutex<VecDeque<Event>>,
}

impl HistoryLog {
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            path: None,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// A capacity of zero means unbounded.
    pub fn bounded(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::unbounded();
        }
        Self {
            capacity: Some(capacity),
            path: None,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn persisted_at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Appends `event`, evicting the oldest entry first when full. The event
    /// is kept in memory even if persisting it fails.
    pub fn add(&self, event: Event) -> Result<(), HistoryError> {
        let mut events = self.events.lock();
        if let Some(capacity) = self.capacity {
            while events.len() >= capacity {
                events.pop_front();
            }
        }
        events.push_back(event);
        self.persist(&events)
    }

    /// Chronological copy of the current contents.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }

    /// Removes the first event stamped exactly `timestamp`. Returns whether
    /// anything was removed; the file is only rewritten when it was.
    pub fn delete(&self, timestamp: DateTime<Utc>) -> Result<bool, HistoryError> {
        let mut events = self.events.lock();
        let Some(index) = events.iter().position(|event| event.timestamp == timestamp) else {
            return Ok(false);
        };
        events.remove(index);
        self.persist(&events)?;
        Ok(true)
    }

    /// Empties the log and truncates the backing file to `[]`.
    pub fn clear(&self) -> Result<(), HistoryError> {
        let mut events = self.events.lock();
        events.clear();
        self.persist(&events)
    }

    /// Replaces the contents with whatever the backing file holds and returns
    /// the number of events read. On error the log is left untouched.
    pub fn load(&self) -> Result<usize, HistoryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(0);
        };
        let mut events = self.events.lock();
        let data = fs::read(path).map_err(|source| HistoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded: Vec<Event> =
            serde_json::from_slice(&data).map_err(|source| HistoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        events.clear();
        let skip = match self.capacity {
            Some(capacity) => loaded.len().saturating_sub(capacity),
            None => 0,
        };
        events.extend(loaded.into_iter().skip(skip));
        Ok(events.len())
    }

    /// Writes the full sequence to the backing file, overwriting it.
    pub fn save(&self) -> Result<(), HistoryError> {
        let events = self.events.lock();
        self.persist(&events)
    }

    fn persist(&self, events: &VecDeque<Event>) -> Result<(), HistoryError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(events).map_err(HistoryError::Encode)?;
        fs::write(path, data).map_err(|source| HistoryError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
