//! Durable Storage
//!
//! The audit log persists through an ordered, append-only record sequence.
//! Backends only store and return entries; chain rules live in `LogStore`.

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::audit::LogEntry;
use crate::config::{BackendKind, StorageConfig};
use crate::database::SqliteBackend;
use crate::error::AuditError;

pub use jsonl::JsonlBackend;
pub use memory::MemoryBackend;

/// Append-only persistence for audit entries
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Every stored entry in ascending id order.
    ///
    /// A record that cannot be parsed fails the whole read with
    /// `AuditError::ValidationError`; it is never skipped.
    async fn load_all(&self) -> Result<Vec<LogEntry>, AuditError>;

    /// Durably store one entry.
    ///
    /// Returns only once the write is confirmed. On error nothing of the
    /// entry may remain in storage.
    async fn persist(&self, entry: &LogEntry) -> Result<(), AuditError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Build the backend selected by configuration
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn LogBackend>, AuditError> {
    let backend: Arc<dyn LogBackend> = match config.backend {
        BackendKind::Jsonl => Arc::new(JsonlBackend::new(&config.path)?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::new(&config.database_url).await?),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };

    info!("Audit storage ready: {}", backend.describe());
    Ok(backend)
}
