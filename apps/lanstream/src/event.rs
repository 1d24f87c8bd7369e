use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Kind tag carried on the wire as `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    File,
    Clear,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Text => "text",
            EventKind::File => "file",
            EventKind::Clear => "clear",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded occurrence. The timestamp doubles as the event's identity
/// for deletion, so two events in the same log must never share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp,
        }
    }

    /// Notification telling clients to drop their local state. Carries the
    /// zero timestamp (`0001-01-01T00:00:00Z`) and no content.
    pub fn clear() -> Self {
        Self {
            kind: EventKind::Clear,
            content: String::new(),
            timestamp: zero_timestamp(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn zero_timestamp() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Hands out strictly increasing wall-clock timestamps. A reading that does
/// not move past the previous one is bumped by a nanosecond.
#[derive(Debug, Default)]
pub struct EventClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    fn next_after(&self, reading: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let issued = match *last {
            Some(previous) if reading <= previous => previous + Duration::nanoseconds(1),
            _ => reading,
        };
        *last = Some(issued);
        issued
    }

    pub fn stamp(&self, kind: EventKind, content: impl Into<String>) -> Event {
        Event::new(kind, content, self.now())
    }
}
