pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::audit::entry::{format_timestamp, Details, LogEntry};
use crate::error::AuditError;
use crate::storage::LogBackend;

/// SQLite-backed audit log
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn new(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite audit log connected");
        Ok(backend)
    }

    /// Open an existing log for inspection only.
    ///
    /// The file is never created and the schema is left untouched.
    pub async fn open_read_only(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!("SQLite audit log opened read-only");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database (SQLite memory databases are
    /// per-connection).
    pub async fn new_in_memory() -> Result<Self, AuditError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    pub async fn run_migrations(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(schema::AUDIT_LOG_SCHEMA)
            .execute(&self.pool)
            .await?;
        debug!("Audit log schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LogEntry, AuditError> {
    let id: i64 = row.try_get("id")?;
    let id = u64::try_from(id)
        .map_err(|_| AuditError::validation(format!("Stored entry has negative id {}", id)))?;

    let ts: String = row.try_get("ts")?;
    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|e| {
            AuditError::validation(format!("Entry {} has unparsable timestamp: {}", id, e))
        })?
        .with_timezone(&Utc);

    let details_json: String = row.try_get("details_json")?;
    let details: Details = serde_json::from_str(&details_json).map_err(|e| {
        AuditError::validation(format!("Entry {} has unparsable details: {}", id, e))
    })?;

    Ok(LogEntry {
        id,
        timestamp,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        case_id: row.try_get("case_id")?,
        details,
        hash: row.try_get("hash")?,
        prev_hash: row.try_get("prev_hash")?,
    })
}

#[async_trait]
impl LogBackend for SqliteBackend {
    async fn load_all(&self) -> Result<Vec<LogEntry>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, ts, actor, action, case_id, details_json, prev_hash, hash
            FROM audit_log
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // A column that is present but of the wrong type is corruption, not
        // a database outage.
        rows.iter()
            .map(|row| {
                entry_from_row(row).map_err(|e| match e {
                    AuditError::DatabaseError(msg) => AuditError::ValidationError(msg),
                    other => other,
                })
            })
            .collect()
    }

    async fn persist(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let id = i64::try_from(entry.id)
            .map_err(|_| AuditError::write(format!("Entry id {} out of range", entry.id)))?;
        let details_json = serde_json::to_string(&entry.details)
            .map_err(|e| AuditError::write(format!("Failed to serialize details: {}", e)))?;

        let insert = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO audit_log (id, ts, actor, action, case_id, details_json, prev_hash, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(format_timestamp(&entry.timestamp))
            .bind(&entry.actor)
            .bind(&entry.action)
            .bind(&entry.case_id)
            .bind(&details_json)
            .bind(&entry.prev_hash)
            .bind(&entry.hash)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        };

        insert
            .await
            .map_err(|e| AuditError::write(format!("Failed to insert audit entry: {}", e)))
    }

    fn describe(&self) -> String {
        "sqlite".to_string()
    }
}
