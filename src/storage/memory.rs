//! In-memory backend for tests and throwaway runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::audit::LogEntry;
use crate::error::AuditError;
use crate::storage::LogBackend;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    reject_writes: Arc<AtomicBool>,
    write_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` fail, as a full or offline disk would.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Delay confirmation of each write, as a slow disk would.
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().await = delay;
    }

    /// Rewrite a stored entry in place, bypassing the chain.
    ///
    /// Simulates storage corruption; returns false if no entry has `id`.
    pub async fn tamper<F>(&self, id: u64, edit: F) -> bool
    where
        F: FnOnce(&mut LogEntry),
    {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                edit(entry);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    async fn load_all(&self) -> Result<Vec<LogEntry>, AuditError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn persist(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let delay = *self.write_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(AuditError::write("storage rejected the write"));
        }

        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
