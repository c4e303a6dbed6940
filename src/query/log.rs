//! Diagnostic log of executed queries.
//!
//! Connections configured with `debug` append one entry per backend search
//! to their log; other connections never record. Tests inject a private log
//! and reset it between scenarios.
//!
//! ```
//! use std::time::Duration;
//!
//! use sift::query::log::{QueryLog, QueryLogEntry};
//!
//! let log = QueryLog::new(true);
//! log.record(QueryLogEntry::new("title:moof", Duration::from_millis(3), 1, 0, Some(10)));
//! assert_eq!(log.len(), 1);
//!
//! log.reset();
//! assert!(log.is_empty());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::Mutex;

lazy_static! {
    static ref GLOBAL_QUERY_LOG: Arc<QueryLog> = Arc::new(QueryLog::new(true));
}

/// One executed query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    pub query_string: String,
    pub elapsed: Duration,
    pub hits: usize,
    pub start_offset: usize,
    pub end_offset: Option<usize>,
}

impl QueryLogEntry {
    pub fn new<S: Into<String>>(
        query_string: S,
        elapsed: Duration,
        hits: usize,
        start_offset: usize,
        end_offset: Option<usize>,
    ) -> Self {
        QueryLogEntry {
            query_string: query_string.into(),
            elapsed,
            hits,
            start_offset,
            end_offset,
        }
    }
}

/// Append-only, resettable list of executed queries.
#[derive(Debug, Default)]
pub struct QueryLog {
    enabled: AtomicBool,
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl QueryLog {
    pub fn new(enabled: bool) -> Self {
        QueryLog {
            enabled: AtomicBool::new(enabled),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide log debug connections record to unless given a
    /// private one.
    pub fn global() -> Arc<QueryLog> {
        Arc::clone(&GLOBAL_QUERY_LOG)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Append an entry; a no-op while the log is disabled.
    pub fn record(&self, entry: QueryLogEntry) {
        if self.is_enabled() {
            self.entries.lock().push(entry);
        }
    }

    /// Drop every entry.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// A copy of the recorded entries, oldest first.
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.entries.lock().clone()
    }

    pub fn last(&self) -> Option<QueryLogEntry> {
        self.entries.lock().last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str) -> QueryLogEntry {
        QueryLogEntry::new(query, Duration::ZERO, 0, 0, None)
    }

    #[test]
    fn test_disabled_log_is_noop() {
        let log = QueryLog::default();
        log.record(entry("*:*"));
        assert!(log.is_empty());

        log.set_enabled(true);
        log.record(entry("name:bar"));
        log.record(entry("(name:bar AND text:moof)"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().query_string, "(name:bar AND text:moof)");

        log.reset();
        assert_eq!(log.len(), 0);
    }
}
