use thiserror::Error;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::ValidationError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for AuditError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    /// Carries no detail on purpose: callers only ever learn "denied".
    #[error("access denied")]
    AuthorizationError,

    #[error("Write error: {0}")]
    WriteError(String),

    /// Appends refused until the store is reopened.
    #[error("Audit log sealed: {0}")]
    Sealed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AuditError {
    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Whether the caller can safely repeat the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteError(_))
    }
}
