//! JSON Lines Backend
//!
//! One serialized entry per line. Each append is flushed and synced before
//! it is confirmed, and a failed append truncates the file back to its
//! previous length.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::LogEntry;
use crate::error::AuditError;
use crate::storage::LogBackend;

/// Append-only JSONL file
#[derive(Clone)]
pub struct JsonlBackend {
    log_path: Arc<PathBuf>,
}

impl JsonlBackend {
    /// Create the backend, making the parent directory and file if needed
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AuditError::ConfigError(format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| AuditError::ConfigError(format!("Failed to open audit log file: {}", e)))?;

        Ok(Self {
            log_path: Arc::new(log_path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), AuditError> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| AuditError::write(format!("Failed to open audit log: {}", e)))?;

    write_or_roll_back(&mut file, line, |file, line| {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        file.sync_data()
    })
}

/// Run `write` against `file`. If it fails, the file is cut back to the
/// length it had before, so no partial line survives.
fn write_or_roll_back<F>(file: &mut File, line: &str, write: F) -> Result<(), AuditError>
where
    F: FnOnce(&mut File, &str) -> std::io::Result<()>,
{
    let original_len = file
        .metadata()
        .map_err(|e| AuditError::write(format!("Failed to stat audit log: {}", e)))?
        .len();

    if let Err(e) = write(file, line) {
        if let Err(truncate_err) = file.set_len(original_len).and_then(|_| file.sync_data()) {
            warn!("Failed to roll back partial audit write: {}", truncate_err);
        }
        return Err(AuditError::write(format!(
            "Failed to write to audit log: {}",
            e
        )));
    }

    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<LogEntry>, AuditError> {
    let file = File::open(path)
        .map_err(|e| AuditError::validation(format!("Failed to open audit log: {}", e)))?;

    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            AuditError::validation(format!("Failed to read line {}: {}", line_num + 1, e))
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let entry: LogEntry = serde_json::from_str(&line).map_err(|e| {
            AuditError::validation(format!(
                "Failed to parse entry at line {}: {}",
                line_num + 1,
                e
            ))
        })?;

        entries.push(entry);
    }

    debug!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

#[async_trait]
impl LogBackend for JsonlBackend {
    async fn load_all(&self) -> Result<Vec<LogEntry>, AuditError> {
        let path = Arc::clone(&self.log_path);
        tokio::task::spawn_blocking(move || read_entries(&path))
            .await
            .map_err(|e| AuditError::validation(format!("Audit log read task failed: {}", e)))?
    }

    async fn persist(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| AuditError::write(format!("Failed to serialize entry: {}", e)))?;

        let path = Arc::clone(&self.log_path);
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|e| AuditError::write(format!("Audit log write task failed: {}", e)))?
    }

    fn describe(&self) -> String {
        format!("jsonl file {}", self.log_path.display())
    }
}
