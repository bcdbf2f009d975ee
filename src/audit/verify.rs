//! Audit Log Verification
//!
//! Walks a sequence of entries from the genesis link and reports the first
//! place the chain stops holding.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::chain::{verify_link, GENESIS_HASH};
use crate::audit::entry::LogEntry;

/// Outcome of a chain walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub ok: bool,
    /// Entries examined, including the failing one
    pub count: u64,
    pub first_broken_id: Option<u64>,
}

impl VerifyReport {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self.first_broken_id {
            None => format!("Audit log is valid ({} entries)", self.count),
            Some(id) => format!(
                "Audit log is broken at entry {} ({} entries examined)",
                id, self.count
            ),
        }
    }
}

/// Verify a complete hash chain.
///
/// Each entry must carry the next id in sequence and link to its
/// predecessor's hash (the genesis constant for the first). Stops at the
/// first failure.
pub fn verify_entries(entries: &[LogEntry]) -> VerifyReport {
    let mut expected_prev = GENESIS_HASH;
    let mut count = 0u64;

    for (expected_id, entry) in (1u64..).zip(entries) {
        count += 1;

        if entry.id != expected_id {
            warn!(
                "Non-sequential id at position {}: expected {}, got {}",
                count, expected_id, entry.id
            );
            return broken(count, entry.id);
        }

        if !verify_link(entry, expected_prev) {
            warn!("Hash chain broken at entry {}", entry.id);
            return broken(count, entry.id);
        }

        expected_prev = entry.hash.as_str();
    }

    debug!("Verified {} audit entries", count);
    VerifyReport {
        ok: true,
        count,
        first_broken_id: None,
    }
}

fn broken(count: u64, id: u64) -> VerifyReport {
    VerifyReport {
        ok: false,
        count,
        first_broken_id: Some(id),
    }
}

/// Ids of every entry whose stored hash no longer matches its own fields.
///
/// Unlike `verify_entries` this keeps going past the first failure, which
/// helps when sizing the damage after a broken report.
pub fn find_tampered_entries(entries: &[LogEntry]) -> Vec<u64> {
    entries
        .iter()
        .filter(|entry| !verify_link(entry, &entry.prev_hash))
        .map(|entry| entry.id)
        .collect()
}
