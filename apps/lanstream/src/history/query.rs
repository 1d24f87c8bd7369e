use serde::{Deserialize, Serialize};

use crate::event::Event;

pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Raw query string of `GET /history`. Values stay strings so that a
/// malformed `limit` or `offset` falls back to its default instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
}

impl ListQuery {
    pub fn kind_filter(&self) -> Option<&str> {
        self.kind.as_deref().filter(|kind| !kind.is_empty())
    }

    /// `None` when no pagination was requested at all.
    pub fn window(&self) -> Option<(usize, usize)> {
        let limit = self.limit.as_deref().filter(|raw| !raw.is_empty())?;
        let limit = limit.trim().parse().unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = self
            .offset
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0);
        Some((offset, limit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<Event>,
    /// Matches after filtering, before pagination.
    pub total: usize,
}

/// Turns a chronological snapshot into a newest-first page: reverse, filter
/// by kind, then slice.
pub fn list(chronological: Vec<Event>, query: &ListQuery) -> HistoryPage {
    let filter = query.kind_filter();
    let matching: Vec<Event> = chronological
        .into_iter()
        .rev()
        .filter(|event| filter.map_or(true, |kind| event.kind.as_str() == kind))
        .collect();
    let total = matching.len();

    let messages = match query.window() {
        Some((offset, limit)) => {
            let start = offset.min(total);
            let end = start.saturating_add(limit).min(total);
            matching[start..end].to_vec()
        }
        None => matching,
    };

    HistoryPage { messages, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use chrono::{DateTime, Duration, Utc};

    fn at(seconds: i64, kind: EventKind) -> Event {
        let base: DateTime<Utc> = "2024-05-01T10:00:00Z".parse().unwrap();
        Event::new(kind, format!("#{seconds}"), base + Duration::seconds(seconds))
    }

    fn query(kind: Option<&str>, limit: Option<&str>, offset: Option<&str>) -> ListQuery {
        ListQuery {
            kind: kind.map(str::to_string),
            limit: limit.map(str::to_string),
            offset: offset.map(str::to_string),
        }
    }

    fn mixed() -> Vec<Event> {
        (1..=9)
            .map(|i| at(i, if i % 3 == 0 { EventKind::File } else { EventKind::Text }))
            .collect()
    }

    #[test_timeout::timeout]
    fn filters_by_kind_newest_first() {
        let history = vec![at(1, EventKind::Text), at(2, EventKind::File)];
        let page = list(history, &query(Some("text"), None, None));

        assert_eq!(page.total, 1);
        assert_eq!(page.messages, vec![at(1, EventKind::Text)]);
    }

    #[test_timeout::timeout]
    fn no_params_returns_everything_reversed() {
        let page = list(mixed(), &ListQuery::default());
        let expected: Vec<Event> = mixed().into_iter().rev().collect();
        assert_eq!(page.total, 9);
        assert_eq!(page.messages, expected);
    }

    #[test_timeout::timeout]
    fn page_slices_filtered_sequence() {
        let filtered: Vec<Event> = mixed()
            .into_iter()
            .rev()
            .filter(|event| event.kind == EventKind::Text)
            .collect();
        let total = filtered.len();

        for offset in 0..=total + 2 {
            for limit in 0..=total + 1 {
                let page = list(
                    mixed(),
                    &query(
                        Some("text"),
                        Some(&limit.to_string()),
                        Some(&offset.to_string()),
                    ),
                );
                let start = offset.min(total);
                let end = (offset + limit).min(total);
                assert_eq!(page.total, total);
                assert_eq!(page.messages, filtered[start..end].to_vec());
            }
        }
    }

    #[test_timeout::timeout]
    fn offset_past_end_is_empty_with_total() {
        let page = list(mixed(), &query(None, Some("5"), Some("50")));
        assert!(page.messages.is_empty());
        assert_eq!(page.total, 9);
    }

    #[test_timeout::timeout]
    fn malformed_numbers_fall_back_to_defaults() {
        let history: Vec<Event> = (0..30).map(|i| at(i, EventKind::Text)).collect();
        let page = list(history.clone(), &query(None, Some("lots"), Some("-3")));

        assert_eq!(page.total, 30);
        assert_eq!(page.messages.len(), DEFAULT_PAGE_LIMIT);
        assert_eq!(page.messages[0], history[29]);
    }

    #[test_timeout::timeout]
    fn offset_without_limit_is_ignored() {
        let page = list(mixed(), &query(None, None, Some("4")));
        assert_eq!(page.messages.len(), 9);
    }

    #[test_timeout::timeout]
    fn empty_or_unknown_kind() {
        assert_eq!(list(mixed(), &query(Some(""), None, None)).total, 9);
        assert_eq!(list(mixed(), &query(Some("video"), None, None)).total, 0);
    }
}
