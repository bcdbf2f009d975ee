//! Audit API
//!
//! The boundary every caller goes through: resolve the credential, check the
//! policy, then hand off to the store, exporter or journal.

pub mod routes;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{AccessJournal, AccessReport};
use crate::audit::{details_from_json, EntryFilter, LogEntry, LogStore, VerifyReport};
use crate::auth::{CredentialResolver, Principal};
use crate::error::AuditError;
use crate::export::{ExportArtifact, ExportFormat, ExportService};
use crate::masking;
use crate::policy::{authorize, require, Operation};

#[derive(Clone)]
pub struct AuditApi {
    store: LogStore,
    exporter: ExportService,
    resolver: Arc<dyn CredentialResolver>,
    journal: Arc<AccessJournal>,
}

impl AuditApi {
    pub fn new(store: LogStore, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            exporter: ExportService::new(store.clone()),
            store,
            resolver,
            journal: Arc::new(AccessJournal::new()),
        }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn principal(&self, credential: &str) -> Option<Principal> {
        self.resolver.resolve(credential)
    }

    /// Resolve `credential` and check it against `operation`
    fn authorized(&self, credential: &str, operation: Operation) -> Result<Principal, AuditError> {
        let principal = self.principal(credential);
        match require(principal.as_ref().map(|p| p.role), operation) {
            Ok(_) => principal.ok_or(AuditError::AuthorizationError),
            Err(e) => {
                warn!(
                    "Denied {:?} for {}",
                    operation,
                    principal.as_ref().map_or("unresolved caller", |p| p.name.as_str())
                );
                Err(e)
            }
        }
    }

    pub async fn write(
        &self,
        credential: &str,
        case_id: &str,
        action: &str,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Result<LogEntry, AuditError> {
        let principal = self.authorized(credential, Operation::Write)?;
        let details = details_from_json(details)?;

        self.store.append(&principal.name, action, case_id, details).await
    }

    /// Entries in id order. Details come back masked unless the caller may
    /// export unmasked.
    pub async fn list(
        &self,
        credential: &str,
        filter: Option<&EntryFilter>,
    ) -> Result<Vec<LogEntry>, AuditError> {
        let principal = self.authorized(credential, Operation::List)?;
        let entries = self.store.list(filter).await?;

        self.journal
            .record(&principal.name, "/log/list", filter_params(filter))
            .await;

        if authorize(Some(principal.role), Operation::ExportUnmasked) {
            Ok(entries)
        } else {
            Ok(entries.iter().map(masking::mask_entry).collect())
        }
    }

    pub async fn export(
        &self,
        credential: &str,
        mask: bool,
        format: &str,
    ) -> Result<ExportArtifact, AuditError> {
        let principal = self.principal(credential);
        let format = ExportFormat::parse(format);

        let artifact = self
            .exporter
            .export(principal.as_ref().map(|p| p.role), mask, format)
            .await?;

        if let Some(principal) = principal {
            let mut params = BTreeMap::new();
            params.insert("mask".to_string(), mask.to_string());
            params.insert("format".to_string(), format.to_string());
            self.journal
                .record(&principal.name, "/export/logs", params)
                .await;
        }

        Ok(artifact)
    }

    pub async fn verify(&self, credential: &str) -> Result<VerifyReport, AuditError> {
        let principal = self.authorized(credential, Operation::Verify)?;
        let report = self.store.verify().await?;

        info!("Chain verified by {}: {}", principal.name, report.summary());
        Ok(report)
    }

    pub async fn access_report(&self, credential: &str) -> Result<AccessReport, AuditError> {
        let principal = self.authorized(credential, Operation::AccessReport)?;
        self.journal
            .record(&principal.name, "/reports/access", BTreeMap::new())
            .await;

        Ok(self.journal.report().await)
    }
}

fn filter_params(filter: Option<&EntryFilter>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let Some(filter) = filter else {
        return params;
    };

    if let Some(case_id) = &filter.case_id {
        params.insert("case_id".to_string(), case_id.clone());
    }
    if let Some(action) = &filter.action {
        params.insert("action".to_string(), action.clone());
    }
    if let Some(since) = &filter.since {
        params.insert("since".to_string(), since.to_rfc3339());
    }
    if let Some(until) = &filter.until {
        params.insert("until".to_string(), until.to_rfc3339());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Role;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    async fn test_api() -> AuditApi {
        let store = LogStore::open(Arc::new(MemoryBackend::new()), Duration::from_secs(5))
            .await
            .unwrap();
        let resolver = |key: &str| match key {
            "admin-key" => Some(Principal::new("admin@example.com", Role::Admin)),
            "inv-key" => Some(Principal::new("investigator@example.com", Role::Investigator)),
            _ => None,
        };
        AuditApi::new(store, Arc::new(resolver))
    }

    fn details(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_write_records_principal_as_actor() {
        let api = test_api().await;
        let entry = api
            .write("inv-key", "CASE-1", "note_added", details(json!({"note": "x"})))
            .await
            .unwrap();

        assert_eq!(entry.id, 1);
        assert_eq!(entry.actor, "investigator@example.com");
    }

    #[tokio::test]
    async fn test_unknown_credential_is_denied_before_validation() {
        let api = test_api().await;
        let err = api
            .write("nope", "CASE-1", "note_added", details(json!({"n": 1})))
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::AuthorizationError));
        assert_eq!(api.store().head().await.0, 0);
    }

    #[tokio::test]
    async fn test_non_string_detail_is_rejected() {
        let api = test_api().await;
        let err = api
            .write("admin-key", "CASE-1", "note_added", details(json!({"n": 1})))
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::ValidationError(_)));
        assert!(api.list("admin-key", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_masks_for_investigator_only() {
        let api = test_api().await;
        api.write(
            "admin-key",
            "CASE-1",
            "note_added",
            details(json!({"email": "bob@example.com"})),
        )
        .await
        .unwrap();

        let masked = api.list("inv-key", None).await.unwrap();
        assert_eq!(masked[0].details["email"], "b***@***.***");

        let clear = api.list("admin-key", None).await.unwrap();
        assert_eq!(clear[0].details["email"], "bob@example.com");
    }

    #[tokio::test]
    async fn test_access_report_tracks_reads() {
        let api = test_api().await;
        api.list("inv-key", Some(&EntryFilter::for_case("CASE-9")))
            .await
            .unwrap();
        api.export("inv-key", true, "csv").await.unwrap();

        assert!(api.access_report("inv-key").await.is_err());

        let report = api.access_report("admin-key").await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.by_user["investigator@example.com"], 2);
        assert_eq!(report.recent[0].endpoint, "/reports/access");
        assert_eq!(report.recent[1].params["format"], "csv");
        assert_eq!(report.recent[2].params["case_id"], "CASE-9");
    }
}
