//! Access journal
//!
//! Records who read or exported the log, for the access report. Kept in
//! memory: per-actor counters plus a bounded window of recent requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::Mutex;

/// Most recent records kept for the report
pub const RECENT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReport {
    pub by_user: BTreeMap<String, u64>,
    /// Newest first
    pub recent: Vec<AccessRecord>,
    pub total: u64,
}

#[derive(Default)]
struct JournalState {
    by_user: BTreeMap<String, u64>,
    recent: VecDeque<AccessRecord>,
}

#[derive(Default)]
pub struct AccessJournal {
    state: Mutex<JournalState>,
}

impl AccessJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, actor: &str, endpoint: &str, params: BTreeMap<String, String>) {
        let mut state = self.state.lock().await;
        *state.by_user.entry(actor.to_string()).or_insert(0) += 1;

        state.recent.push_front(AccessRecord {
            ts: Utc::now(),
            actor: actor.to_string(),
            endpoint: endpoint.to_string(),
            params,
        });
        state.recent.truncate(RECENT_LIMIT);
    }

    pub async fn report(&self) -> AccessReport {
        let state = self.state.lock().await;
        AccessReport {
            by_user: state.by_user.clone(),
            recent: state.recent.iter().cloned().collect(),
            total: state.by_user.values().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_counts_per_actor() {
        let journal = AccessJournal::new();
        journal.record("alice", "/log/list", BTreeMap::new()).await;
        journal.record("bob", "/export/logs", BTreeMap::new()).await;
        journal.record("alice", "/export/logs", BTreeMap::new()).await;

        let report = journal.report().await;
        assert_eq!(report.total, 3);
        assert_eq!(report.by_user["alice"], 2);
        assert_eq!(report.by_user["bob"], 1);
        assert_eq!(report.recent[0].actor, "alice");
        assert_eq!(report.recent[0].endpoint, "/export/logs");
    }

    #[tokio::test]
    async fn test_recent_window_is_bounded() {
        let journal = AccessJournal::new();
        for i in 0..(RECENT_LIMIT + 10) {
            let mut params = BTreeMap::new();
            params.insert("n".to_string(), i.to_string());
            journal.record("alice", "/log/list", params).await;
        }

        let report = journal.report().await;
        assert_eq!(report.recent.len(), RECENT_LIMIT);
        assert_eq!(report.total, (RECENT_LIMIT + 10) as u64);
        assert_eq!(report.recent[0].params["n"], (RECENT_LIMIT + 9).to_string());
    }
}
