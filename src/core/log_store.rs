//! Append-only in-memory log store.
//!
//! One store instance is shared by every pipeline run in the process. All
//! mutation and every snapshot read happen inside a single critical section,
//! so overlapping runs never lose appends or observe a torn view.

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::error;

use crate::domain::{LogEntry, LogLevel};

/// Filter for [`LogStore::query`]
#[derive(Debug, Clone, Deserialize)]
pub struct LogQuery {
    pub agent: Option<String>,
    pub level: Option<LogLevel>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            agent: None,
            level: None,
            limit: default_limit(),
        }
    }
}

impl LogQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        self.agent.as_deref().map_or(true, |a| entry.agent == a)
            && self.level.map_or(true, |l| entry.level == l)
    }
}

/// Process-wide log of pipeline activity
#[derive(Debug, Default)]
pub struct LogStore {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an info-level entry
    pub fn append(
        &self,
        agent: &str,
        event: &str,
        data: serde_json::Value,
    ) -> LogEntry {
        self.append_with_level(agent, event, data, LogLevel::Info)
    }

    /// Append an entry at the given level.
    ///
    /// The timestamp is taken inside the critical section, so append order and
    /// timestamp order agree even under concurrent writers.
    pub fn append_with_level(
        &self,
        agent: &str,
        event: &str,
        data: serde_json::Value,
        level: LogLevel,
    ) -> LogEntry {
        if level == LogLevel::Error {
            error!(agent, event, %data, "Error logged");
        }

        let mut entries = self.entries.lock();
        let entry = LogEntry::new(agent, event, data, level);
        entries.push(entry.clone());
        entry
    }

    /// Matching entries, newest first, truncated to `query.limit`
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let mut results: Vec<LogEntry> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .rev()
                .filter(|e| query.matches(e))
                .cloned()
                .collect()
        };

        // Stable sort keeps later appends first among equal timestamps
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(query.limit);
        results
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_query_order() {
        let store = LogStore::new();
        for i in 0..5 {
            store.append("dev_agent", &format!("event{}", i), json!({"i": i}));
        }

        let entries = store.query(&LogQuery::latest(5));
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].event, "event4");
        assert_eq!(entries[4].event, "event0");
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_filter_by_agent_and_level() {
        let store = LogStore::new();
        store.append("parent_agent", "analysis_complete", json!(null));
        store.append_with_level("dev_agent", "stage_failed", json!("boom"), LogLevel::Error);
        store.append("dev_agent", "generation_complete", json!(null));

        let dev = store.query(&LogQuery::default().agent("dev_agent"));
        assert_eq!(dev.len(), 2);

        let errors = store.query(&LogQuery::default().level(LogLevel::Error));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, "stage_failed");

        let both = store.query(
            &LogQuery::default()
                .agent("parent_agent")
                .level(LogLevel::Error),
        );
        assert!(both.is_empty());
    }

    #[test]
    fn test_limit_truncates() {
        let store = LogStore::new();
        for _ in 0..10 {
            store.append("orchestrator", "tick", json!(null));
        }
        assert_eq!(store.query(&LogQuery::latest(3)).len(), 3);
        assert_eq!(store.query(&LogQuery::latest(0)).len(), 0);
    }

    #[test]
    fn test_clear_returns_count() {
        let store = LogStore::new();
        store.append("a", "x", json!(null));
        store.append("b", "y", json!(null));

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(store.clear(), 0);
    }
}
