//! Audit Log Export
//!
//! Produces a downloadable JSON or CSV artifact of the full log, masked or
//! not depending on what the caller asked for and what their role allows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{LogEntry, LogStore};
use crate::error::AuditError;
use crate::masking;
use crate::policy::{require, Operation, Role};

/// Column order of CSV exports; matches the JSON field names
pub const CSV_HEADER: &str = "id,ts,actor,action,case_id,details,hash,prev_hash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    /// Parse a requested format; anything unrecognised means JSON
    pub fn parse(format: &str) -> Self {
        if format.trim().eq_ignore_ascii_case("csv") {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A rendered export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub filename: String,
    pub content: String,
}

#[derive(Clone)]
pub struct ExportService {
    store: LogStore,
}

impl ExportService {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    pub async fn export(
        &self,
        role: Option<Role>,
        mask_requested: bool,
        format: ExportFormat,
    ) -> Result<ExportArtifact, AuditError> {
        self.export_at(role, mask_requested, format, Utc::now()).await
    }

    /// `export` with the export time supplied, which fixes the filename
    pub async fn export_at(
        &self,
        role: Option<Role>,
        mask_requested: bool,
        format: ExportFormat,
        exported_at: DateTime<Utc>,
    ) -> Result<ExportArtifact, AuditError> {
        let operation = if mask_requested {
            Operation::ExportMasked
        } else {
            Operation::ExportUnmasked
        };
        let role = require(role, operation)?;

        let mut entries = self.store.list(None).await?;
        if mask_requested {
            entries = entries.iter().map(masking::mask_entry).collect();
        }

        let content = match format {
            ExportFormat::Json => render_json(&entries)?,
            ExportFormat::Csv => render_csv(&entries)?,
        };

        info!(
            "Exported {} audit entries as {} for {} (masked: {})",
            entries.len(),
            format,
            role,
            mask_requested
        );

        Ok(ExportArtifact {
            filename: export_filename(exported_at, mask_requested, format),
            content,
        })
    }
}

pub fn export_filename(exported_at: DateTime<Utc>, masked: bool, format: ExportFormat) -> String {
    format!(
        "audit_export_{}{}.{}",
        exported_at.format("%Y%m%dT%H%M%SZ"),
        if masked { "_masked" } else { "" },
        format.extension()
    )
}

/// JSON array of entry objects
pub fn render_json(entries: &[LogEntry]) -> Result<String, AuditError> {
    serde_json::to_string(entries)
        .map_err(|e| AuditError::ValidationError(format!("JSON export serialization: {}", e)))
}

/// CSV with a header row; `details` is flattened to compact JSON text
pub fn render_csv(entries: &[LogEntry]) -> Result<String, AuditError> {
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for entry in entries {
        let details = serde_json::to_string(&entry.details)
            .map_err(|e| AuditError::ValidationError(format!("CSV details serialization: {}", e)))?;

        output.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            entry.id,
            entry.ts_string(),
            csv_escape(&entry.actor),
            csv_escape(&entry.action),
            csv_escape(&entry.case_id),
            csv_escape(&details),
            entry.hash,
            entry.prev_hash,
        ));
    }

    Ok(output)
}

/// Quote a field if it contains a comma, quote, or line break
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let escaped = field.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}
