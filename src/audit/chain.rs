//! Hash Chain
//!
//! Computes and checks the SHA-256 link binding each entry to its predecessor.

use chrono::Timelike;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::audit::entry::{format_timestamp, Details, LogEntry};

/// `prev_hash` of the first entry in an empty log
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Hashed fields, serialized in declaration order
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    id: u64,
    ts: String,
    actor: &'a str,
    action: &'a str,
    case_id: &'a str,
    details: &'a Details,
    prev_hash: &'a str,
}

/// Canonical text form of an entry's hashed fields.
///
/// Fields always appear in the order id, ts, actor, action, case_id,
/// details, prev_hash; `details` keys are sorted. The stored `hash` and
/// `prev_hash` are ignored, the link target is passed explicitly.
pub fn canonical_string(entry: &LogEntry, prev_hash: &str) -> String {
    let canonical = CanonicalEntry {
        id: entry.id,
        ts: format_timestamp(&entry.timestamp),
        actor: &entry.actor,
        action: &entry.action,
        case_id: &entry.case_id,
        details: &entry.details,
        prev_hash,
    };
    // Strings, integers and a string map always serialize.
    serde_json::to_string(&canonical).unwrap_or_default()
}

/// Hex-encoded SHA-256 over the canonical form.
pub fn compute_hash(entry: &LogEntry, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(entry, prev_hash).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that `entry` links to `prev_hash` and that its stored hash matches
/// its fields. Malformed input is simply a failed link.
pub fn verify_link(entry: &LogEntry, prev_hash: &str) -> bool {
    if entry.prev_hash != prev_hash {
        return false;
    }
    if entry.hash.len() != 64 {
        return false;
    }
    // Only microseconds are hashed; finer digits would go unchecked.
    if entry.timestamp.nanosecond() % 1_000 != 0 {
        return false;
    }
    entry.hash == compute_hash(entry, prev_hash)
}
