use audit_chain::api::AuditApi;
use audit_chain::audit::{Details, LogStore};
use audit_chain::auth::Principal;
use audit_chain::policy::Role;
use audit_chain::storage::{LogBackend, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const AUDITOR_KEY: &str = "test-auditor-key";
pub const INVESTIGATOR_KEY: &str = "test-investigator-key";

pub const ADMIN: &str = "admin@example.com";
pub const INVESTIGATOR: &str = "investigator@example.com";

/// Fixture resolver standing in for real key provisioning
pub fn fixture_resolver(key: &str) -> Option<Principal> {
    match key {
        ADMIN_KEY => Some(Principal::new(ADMIN, Role::Admin)),
        AUDITOR_KEY => Some(Principal::new("auditor@example.com", Role::Auditor)),
        INVESTIGATOR_KEY => Some(Principal::new(INVESTIGATOR, Role::Investigator)),
        _ => None,
    }
}

pub async fn open_store(backend: Arc<dyn LogBackend>) -> LogStore {
    LogStore::open(backend, Duration::from_secs(5))
        .await
        .expect("Failed to open audit log")
}

pub async fn setup_memory_store() -> (LogStore, MemoryBackend) {
    let backend = MemoryBackend::new();
    let store = open_store(Arc::new(backend.clone())).await;
    (store, backend)
}

pub async fn setup_api() -> AuditApi {
    let (store, _) = setup_memory_store().await;
    AuditApi::new(store, Arc::new(fixture_resolver))
}

pub fn details(pairs: &[(&str, &str)]) -> Details {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn json_details(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}
