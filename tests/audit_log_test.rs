//! End-to-end behaviour of the audit log through the core API

use audit_chain::audit::{EntryFilter, LogEntry, GENESIS_HASH};
use audit_chain::error::AuditError;
use audit_chain::export::CSV_HEADER;
use std::collections::HashSet;
use std::time::Duration;

mod common;
use common::*;

#[tokio::test]
async fn test_case_notes_scenario() {
    let api = setup_api().await;

    let a = api
        .write(
            ADMIN_KEY,
            "CASE-1",
            "note_added",
            json_details(&[("email", "bob@example.com"), ("phone", "+91 9876543210")]),
        )
        .await
        .unwrap();
    let b = api
        .write(INVESTIGATOR_KEY, "CASE-1", "status_changed", json_details(&[("status", "open")]))
        .await
        .unwrap();

    assert_eq!((a.id, b.id), (1, 2));
    assert_eq!(a.prev_hash, GENESIS_HASH);
    assert_eq!(b.prev_hash, a.hash);
    assert!(b.timestamp >= a.timestamp);

    let report = api.verify(AUDITOR_KEY).await.unwrap();
    assert!(report.ok);
    assert_eq!(report.count, 2);
    assert_eq!(report.first_broken_id, None);

    let masked = api.export(INVESTIGATOR_KEY, true, "json").await.unwrap();
    let rows: Vec<LogEntry> = serde_json::from_str(&masked.content).unwrap();
    assert_eq!(rows[0].details["email"], "b***@***.***");
    assert_eq!(rows[0].details["phone"], "********10");
    assert_eq!(rows[1].details["status"], "open");

    let clear = api.export(ADMIN_KEY, false, "json").await.unwrap();
    let rows: Vec<LogEntry> = serde_json::from_str(&clear.content).unwrap();
    assert_eq!(rows[0].details["email"], "bob@example.com");
    assert_eq!(rows[0].details["phone"], "+91 9876543210");
}

#[tokio::test]
async fn test_role_gating() {
    let api = setup_api().await;
    api.write(ADMIN_KEY, "CASE-1", "note_added", json_details(&[]))
        .await
        .unwrap();

    assert!(matches!(
        api.export(INVESTIGATOR_KEY, false, "json").await,
        Err(AuditError::AuthorizationError)
    ));
    assert!(matches!(
        api.access_report(INVESTIGATOR_KEY).await,
        Err(AuditError::AuthorizationError)
    ));
    assert!(api.export(AUDITOR_KEY, false, "csv").await.is_ok());
    assert!(api.access_report(AUDITOR_KEY).await.is_ok());

    for key in ["", "unknown-key"] {
        assert!(matches!(
            api.write(key, "CASE-1", "note_added", json_details(&[])).await,
            Err(AuditError::AuthorizationError)
        ));
        assert!(api.list(key, None).await.is_err());
        assert!(api.verify(key).await.is_err());
        assert!(api.export(key, true, "json").await.is_err());
    }

    // Denied calls never reach the log
    assert_eq!(api.store().head().await.0, 1);
}

#[tokio::test]
async fn test_concurrent_appends_on_empty_log() {
    let (store, _) = setup_memory_store().await;

    let first = store.clone();
    let second = store.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.append("alice", "note_added", "CASE-1", details(&[])).await }),
        tokio::spawn(async move { second.append("bob", "note_added", "CASE-1", details(&[])).await }),
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    let ids: HashSet<u64> = [a.id, b.id].into_iter().collect();
    assert_eq!(ids, HashSet::from([1, 2]));

    let (earlier, later) = if a.id == 1 { (a, b) } else { (b, a) };
    assert_eq!(later.prev_hash, earlier.hash);
    assert!(store.verify().await.unwrap().ok);
}

#[tokio::test]
async fn test_many_concurrent_appends_form_one_chain() {
    let (store, _) = setup_memory_store().await;

    let handles: Vec<_> = (0..25)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append(&format!("user{}", i), "note_added", "CASE-7", details(&[]))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = store.list(None).await.unwrap();
    let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, (1..=25).collect::<Vec<u64>>());

    let report = store.verify().await.unwrap();
    assert!(report.ok);
    assert_eq!(report.count, 25);
}

#[tokio::test]
async fn test_verify_runs_alongside_appends() {
    let (store, _) = setup_memory_store().await;

    let writer = store.clone();
    let writes = tokio::spawn(async move {
        for _ in 0..20 {
            writer
                .append("alice", "note_added", "CASE-1", details(&[]))
                .await
                .unwrap();
        }
    });

    for _ in 0..20 {
        let report = store.verify().await.unwrap();
        assert!(report.ok, "verify saw a half-written chain: {}", report.summary());
        tokio::task::yield_now().await;
    }

    writes.await.unwrap();
    assert_eq!(store.verify().await.unwrap().count, 20);
}

#[tokio::test]
async fn test_failed_write_leaves_chain_intact() {
    let (store, backend) = setup_memory_store().await;
    store
        .append("alice", "note_added", "CASE-1", details(&[]))
        .await
        .unwrap();

    backend.set_reject_writes(true);
    let err = store
        .append("alice", "note_added", "CASE-1", details(&[("k", "v")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::WriteError(_)));
    assert!(err.is_retryable());

    backend.set_reject_writes(false);
    let retried = store
        .append("alice", "note_added", "CASE-1", details(&[("k", "v")]))
        .await
        .unwrap();

    assert_eq!(retried.id, 2);
    assert_eq!(backend.len().await, 2);
    assert!(store.verify().await.unwrap().ok);
}

#[tokio::test]
async fn test_abandoned_append_still_commits() {
    let (store, backend) = setup_memory_store().await;
    backend.set_write_delay(Some(Duration::from_millis(200))).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        store.append("alice", "note_added", "CASE-1", details(&[("k", "v")])),
    )
    .await;
    assert!(abandoned.is_err(), "caller should have given up first");

    // Waits behind the abandoned append, which must finish on its own
    let next = store
        .append("bob", "note_added", "CASE-1", details(&[]))
        .await
        .unwrap();
    assert_eq!(next.id, 2);

    let entries = store.list(None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, 1);
    assert_eq!(entries[0].actor, "alice");
    assert_eq!(entries[1].prev_hash, entries[0].hash);

    let report = store.verify().await.unwrap();
    assert!(report.ok);
    assert_eq!(report.count, 2);
    assert!(!store.is_sealed().await);
}

#[tokio::test]
async fn test_list_filters() {
    let api = setup_api().await;
    for (case_id, action) in [
        ("CASE-1", "note_added"),
        ("CASE-2", "note_added"),
        ("CASE-1", "status_changed"),
    ] {
        api.write(ADMIN_KEY, case_id, action, json_details(&[]))
            .await
            .unwrap();
    }

    let case_one = api
        .list(AUDITOR_KEY, Some(&EntryFilter::for_case("CASE-1")))
        .await
        .unwrap();
    assert_eq!(case_one.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);

    let filter = EntryFilter {
        action: Some("note_added".to_string()),
        ..EntryFilter::default()
    };
    let notes = api.list(AUDITOR_KEY, Some(&filter)).await.unwrap();
    assert_eq!(notes.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);

    let all = api.list(AUDITOR_KEY, None).await.unwrap();
    let window = EntryFilter::between(all[1].timestamp, all[2].timestamp);
    let windowed = api.list(AUDITOR_KEY, Some(&window)).await.unwrap();
    assert!(windowed.iter().any(|e| e.id == 2));
    assert!(windowed.iter().any(|e| e.id == 3));

    let before = EntryFilter {
        until: Some(all[0].timestamp - chrono::Duration::seconds(1)),
        ..EntryFilter::default()
    };
    assert!(api.list(AUDITOR_KEY, Some(&before)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_csv_export_reads_back() {
    let api = setup_api().await;
    api.write(
        ADMIN_KEY,
        "CASE-1",
        "note_added",
        json_details(&[("note", "called back, no answer"), ("quote", "she said \"later\"")]),
    )
    .await
    .unwrap();
    api.write(ADMIN_KEY, "CASE-2", "closed", json_details(&[]))
        .await
        .unwrap();

    let json = api.export(ADMIN_KEY, false, "json").await.unwrap();
    let expected: Vec<LogEntry> = serde_json::from_str(&json.content).unwrap();

    let csv = api.export(ADMIN_KEY, false, "csv").await.unwrap();
    let rows = parse_csv(&csv.content);
    assert_eq!(rows[0].join(","), CSV_HEADER);
    assert_eq!(rows.len(), expected.len() + 1);

    for (row, entry) in rows[1..].iter().zip(&expected) {
        assert_eq!(row[0], entry.id.to_string());
        assert_eq!(row[1], entry.ts_string());
        assert_eq!(row[2], entry.actor);
        assert_eq!(row[4], entry.case_id);
        let details: audit_chain::audit::Details = serde_json::from_str(&row[5]).unwrap();
        assert_eq!(details, entry.details);
        assert_eq!(row[6], entry.hash);
        assert_eq!(row[7], entry.prev_hash);
    }
}

/// Minimal RFC 4180 reader for checking exports
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) => in_quotes = true,
            (',', false) => row.push(std::mem::take(&mut field)),
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
