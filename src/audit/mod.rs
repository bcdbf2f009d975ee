//! Audit Log
//!
//! Tamper-evident, append-only log of case activity. Each entry carries the
//! hash of its predecessor, so any edit, deletion or reordering breaks the
//! chain at a detectable point.

pub mod chain;
pub mod entry;
pub mod store;
pub mod verify;

pub use chain::{compute_hash, verify_link, GENESIS_HASH};
pub use entry::{details_from_json, Details, LogEntry};
pub use store::{EntryFilter, LogStore};
pub use verify::{find_tampered_entries, verify_entries, VerifyReport};
