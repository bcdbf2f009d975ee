//! Audit Log Store
//!
//! Owns the hash chain: assigns ids and timestamps, links each new entry to
//! the current head and confirms it with durable storage before publishing.
//!
//! Appends hold the write side of a `RwLock` over the chain head for the
//! whole build-persist-publish sequence; reads and verification hold the
//! read side, so they never observe an append half-way through.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::audit::chain::{compute_hash, GENESIS_HASH};
use crate::audit::entry::{now_micros, Details, LogEntry};
use crate::audit::verify::{verify_entries, VerifyReport};
use crate::error::AuditError;
use crate::storage::LogBackend;

/// Optional restrictions for `LogStore::list`; all set fields must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub case_id: Option<String>,
    pub action: Option<String>,
    /// Inclusive lower bound on `timestamp`
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`
    pub until: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn for_case(case_id: impl Into<String>) -> Self {
        Self {
            case_id: Some(case_id.into()),
            ..Self::default()
        }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.case_id.as_ref().map_or(true, |c| &entry.case_id == c)
            && self.action.as_ref().map_or(true, |a| &entry.action == a)
            && self.since.map_or(true, |since| entry.timestamp >= since)
            && self.until.map_or(true, |until| entry.timestamp <= until)
    }
}

struct ChainHead {
    last_id: u64,
    last_hash: String,
    last_timestamp: Option<DateTime<Utc>>,
    /// Set when a write timed out unconfirmed. Its outcome is unknown, so
    /// appending again could reuse an id already on disk.
    sealed: bool,
}

struct StoreInner {
    head: RwLock<ChainHead>,
    backend: Arc<dyn LogBackend>,
    write_timeout: Duration,
}

/// Handle to the append-only audit log. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<StoreInner>,
}

impl LogStore {
    /// Open the log held by `backend`, restoring the chain head from it.
    ///
    /// A log that no longer verifies still opens so it can be inspected and
    /// exported; the failure is logged and reported by `verify`.
    pub async fn open(
        backend: Arc<dyn LogBackend>,
        write_timeout: Duration,
    ) -> Result<Self, AuditError> {
        let entries = backend.load_all().await?;

        let report = verify_entries(&entries);
        if !report.ok {
            warn!(
                "Existing audit log fails verification: {}",
                report.summary()
            );
        }

        let head = match entries.last() {
            Some(last) => ChainHead {
                last_id: last.id,
                last_hash: last.hash.clone(),
                last_timestamp: Some(last.timestamp),
                sealed: false,
            },
            None => ChainHead {
                last_id: 0,
                last_hash: GENESIS_HASH.to_string(),
                last_timestamp: None,
                sealed: false,
            },
        };

        info!(
            "Opened audit log on {} with {} entries",
            backend.describe(),
            entries.len()
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                head: RwLock::new(head),
                backend,
                write_timeout,
            }),
        })
    }

    /// Append a new entry and return it once durably stored.
    ///
    /// The critical section runs on its own task: a caller that gives up
    /// waiting does not interrupt it, so the entry is either fully committed
    /// or never published.
    pub async fn append(
        &self,
        actor: &str,
        action: &str,
        case_id: &str,
        details: Details,
    ) -> Result<LogEntry, AuditError> {
        require_non_empty("actor", actor)?;
        require_non_empty("action", action)?;
        require_non_empty("case_id", case_id)?;

        let inner = Arc::clone(&self.inner);
        let (actor, action, case_id) = (actor.to_string(), action.to_string(), case_id.to_string());

        tokio::spawn(async move { inner.append_locked(actor, action, case_id, details).await })
            .await
            .map_err(|e| AuditError::write(format!("Append task failed: {}", e)))?
    }

    /// Entries in ascending id order, optionally filtered
    pub async fn list(&self, filter: Option<&EntryFilter>) -> Result<Vec<LogEntry>, AuditError> {
        let entries = self.snapshot().await?;
        Ok(match filter {
            Some(filter) => entries.into_iter().filter(|e| filter.matches(e)).collect(),
            None => entries,
        })
    }

    /// Walk the stored chain from genesis
    pub async fn verify(&self) -> Result<VerifyReport, AuditError> {
        let entries = self.snapshot().await?;
        let report = verify_entries(&entries);

        if report.ok {
            info!("Audit log verification successful: {} entries", report.count);
        } else {
            error!("Audit log verification failed: {}", report.summary());
        }

        Ok(report)
    }

    /// Id and hash of the newest entry (`0` and the genesis hash when empty)
    pub async fn head(&self) -> (u64, String) {
        let head = self.inner.head.read().await;
        (head.last_id, head.last_hash.clone())
    }

    pub async fn is_sealed(&self) -> bool {
        self.inner.head.read().await.sealed
    }

    async fn snapshot(&self) -> Result<Vec<LogEntry>, AuditError> {
        let _head = self.inner.head.read().await;
        self.inner.backend.load_all().await
    }
}

impl StoreInner {
    async fn append_locked(
        &self,
        actor: String,
        action: String,
        case_id: String,
        details: Details,
    ) -> Result<LogEntry, AuditError> {
        let mut head = self.head.write().await;

        if head.sealed {
            return Err(AuditError::Sealed(
                "an earlier write was never confirmed; reopen the store to resume".to_string(),
            ));
        }

        // Wall clock may step backwards; the log must not.
        let now = now_micros();
        let timestamp = match head.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let mut entry = LogEntry {
            id: head.last_id + 1,
            timestamp,
            actor,
            action,
            case_id,
            details,
            hash: String::new(),
            prev_hash: head.last_hash.clone(),
        };
        entry.hash = compute_hash(&entry, &entry.prev_hash);

        match tokio::time::timeout(self.write_timeout, self.backend.persist(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Audit append {} not persisted: {}", entry.id, e);
                return Err(e);
            }
            Err(_) => {
                head.sealed = true;
                error!(
                    "Audit append {} unconfirmed after {:?}; sealing log",
                    entry.id, self.write_timeout
                );
                return Err(AuditError::write(format!(
                    "durable write not confirmed within {:?}",
                    self.write_timeout
                )));
            }
        }

        head.last_id = entry.id;
        head.last_hash = entry.hash.clone();
        head.last_timestamp = Some(entry.timestamp);

        debug!("Appended audit entry: {}", entry.summary());
        Ok(entry)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AuditError> {
    if value.trim().is_empty() {
        return Err(AuditError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
