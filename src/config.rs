use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AuditError;
use crate::policy::Role;

pub const DEFAULT_CONFIG_FILE: &str = "audit-chain.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub storage: StorageConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Jsonl,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// JSONL log file, used by the `jsonl` backend
    pub path: String,
    /// Used by the `sqlite` backend
    pub database_url: String,
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub name: String,
    pub role: Role,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            storage: StorageConfig::default(),
            api_keys: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Jsonl,
            path: "data/audit.jsonl".to_string(),
            database_url: "sqlite://audit.db".to_string(),
            write_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_timeout_ms)
    }
}

impl AppConfig {
    /// Defaults, then `audit-chain.toml` if present, then `AUDIT_*` variables
    pub fn load() -> Result<Self, AuditError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Like `load`, reading the file at `path` instead. Nested keys come from
    /// the environment with a double underscore, e.g. `AUDIT_STORAGE__BACKEND`.
    pub fn load_from(path: &Path) -> Result<Self, AuditError> {
        let defaults = AppConfig::default();

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(
                config::File::from(path)
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("AUDIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.storage.write_timeout_ms == 0 {
            return Err(AuditError::ConfigError(
                "storage.write_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(dup) = self
            .api_keys
            .iter()
            .enumerate()
            .find(|(i, k)| self.api_keys[..*i].iter().any(|o| o.key == k.key))
        {
            return Err(AuditError::ConfigError(format!(
                "API key for '{}' is configured more than once",
                dup.1.name
            )));
        }
        Ok(())
    }
}
