//! Contract Test: Reconciliation Against a Live Zone
//!
//! Constraints verified:
//! - Create followed by read with the same addresses reports no drift
//! - Update sends exactly `new − old` insertions and `old − new` removals
//! - Equal address sets cause no network traffic at all
//! - A missing name reads as absent and clears stored state
//! - Failed updates and drift clear stored state
//! - Delete removes the whole record set with a single exchange
//! - One shared client serves concurrent reconciliations of different names

mod common;

use common::*;
use dnsup_core::message::{Rcode, RecordType, UpdateOperation};
use dnsup_core::state::FileStateStore;
use dnsup_core::{Error, ReadOutcome, RecordSet, RecordState, StateStore};
use dnsup_core::Reconciler;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn www(addresses: &[&str]) -> RecordSet {
    RecordSet::new(ZONE, "www", 300, RecordType::A, addresses.iter().copied())
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn create_then_read_reports_no_drift() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let record = www(&["1.2.3.4"]);
    let mut state = RecordState::new();

    let id = assert_ok!(reconciler.create(&record, &mut state).await);
    assert_eq!(id, "www.example.com.");
    assert_eq!(state.id.as_deref(), Some("www.example.com."));
    assert_eq!(state.addresses, set(&["1.2.3.4"]));
    assert!(state.last_updated.is_some());

    let outcome = assert_ok!(reconciler.read(&record, &mut state).await);
    assert_eq!(outcome, ReadOutcome::Present(set(&["1.2.3.4"])));
    assert_eq!(nameserver.records("www.example.com.", RecordType::A), set(&["1.2.3.4"]));
}

#[tokio::test]
async fn update_inserts_only_new_address() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&www(&["1.2.3.4"]), &mut state).await);

    let old = state.addresses.clone();
    assert_ok!(
        reconciler
            .update(&www(&["1.2.3.4", "5.6.7.8"]), &old, &mut state)
            .await
    );

    let update = nameserver.last_update().unwrap();
    assert_eq!(update.operations().len(), 1);
    assert!(matches!(
        &update.operations()[0],
        UpdateOperation::Insert { fqdn, ttl: 300, data } if fqdn == "www.example.com." && data.to_string() == "5.6.7.8"
    ));
    assert_eq!(state.addresses, set(&["1.2.3.4", "5.6.7.8"]));
}

#[tokio::test]
async fn update_removes_and_inserts_in_one_message() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&www(&["1.2.3.4", "9.9.9.9"]), &mut state).await);

    let old = state.addresses.clone();
    let updates_before = nameserver.update_count();
    assert_ok!(
        reconciler
            .update(&www(&["1.2.3.4", "5.6.7.8"]), &old, &mut state)
            .await
    );

    assert_eq!(nameserver.update_count(), updates_before + 1);
    let operations = nameserver.last_update().unwrap().operations().to_vec();
    assert_eq!(operations.len(), 2);
    assert!(operations.iter().any(|op| matches!(
        op,
        UpdateOperation::Remove { data, .. } if data.to_string() == "9.9.9.9"
    )));
    assert!(operations.iter().any(|op| matches!(
        op,
        UpdateOperation::Insert { data, .. } if data.to_string() == "5.6.7.8"
    )));
    assert_eq!(
        nameserver.records("www.example.com.", RecordType::A),
        set(&["1.2.3.4", "5.6.7.8"])
    );
}

#[tokio::test]
async fn equal_sets_cause_no_exchange() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();
    state.id = Some("www.example.com.".to_string());

    // Different spellings of the same addresses
    let old = set(&["::ffff:1.2.3.4", "5.6.7.8", "5.6.7.8"]);
    assert_ok!(
        reconciler
            .update(&www(&["5.6.7.8", "1.2.3.4"]), &old, &mut state)
            .await
    );
    assert_eq!(nameserver.exchange_count(), 0);
}

#[tokio::test]
async fn missing_name_reads_as_absent() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState {
        id: Some("www.example.com.".to_string()),
        addresses: set(&["1.2.3.4"]),
        last_updated: None,
    };

    let outcome = assert_ok!(reconciler.read(&www(&["1.2.3.4"]), &mut state).await);
    assert_eq!(outcome, ReadOutcome::Absent);
    assert!(!state.is_present());
    assert!(state.addresses.is_empty());
}

#[tokio::test]
async fn read_failure_carries_server_code() {
    let nameserver = FakeNameserver::new();
    nameserver.force_query_rcode(Rcode::ServFail);
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();

    let err = assert_err!(reconciler.read(&www(&["1.2.3.4"]), &mut state).await);
    assert!(matches!(err, Error::Query { .. }));
    assert_eq!(err.rcode(), Some(Rcode::ServFail));
}

#[tokio::test]
async fn drift_is_reported_and_clears_state() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&www(&["1.2.3.4"]), &mut state).await);

    // Someone else changes the zone
    nameserver.seed("www.example.com.", RecordType::A, &["1.2.3.4", "6.6.6.6"]);

    let err = assert_err!(reconciler.read(&www(&["1.2.3.4"]), &mut state).await);
    assert!(err.is_drift());
    match err {
        Error::Drift { fqdn, expected, observed } => {
            assert_eq!(fqdn, "www.example.com.");
            assert_eq!(expected, vec!["1.2.3.4".to_string()]);
            assert_eq!(observed, vec!["1.2.3.4".to_string(), "6.6.6.6".to_string()]);
        }
        other => panic!("expected drift, got {}", other),
    }
    assert_eq!(state, RecordState::default());
}

#[tokio::test]
async fn rejected_update_clears_state() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&www(&["1.2.3.4"]), &mut state).await);

    nameserver.force_update_rcode(Rcode::ServFail);
    let old = state.addresses.clone();
    let err = assert_err!(
        reconciler
            .update(&www(&["1.2.3.4", "5.6.7.8"]), &old, &mut state)
            .await
    );

    assert!(matches!(err, Error::Update { .. }));
    assert_eq!(err.rcode(), Some(Rcode::ServFail));
    assert!(!state.is_present());
    assert!(state.addresses.is_empty());
}

#[tokio::test]
async fn unreachable_server_on_update_clears_state() {
    let transport = FailingTransport::new();
    let reconciler = dnsup_core::Reconciler::new(std::sync::Arc::new(client_over(transport.clone(), 1)));
    let mut state = RecordState {
        id: Some("www.example.com.".to_string()),
        addresses: set(&["1.2.3.4"]),
        last_updated: None,
    };

    let old = state.addresses.clone();
    let err = assert_err!(reconciler.update(&www(&["5.6.7.8"]), &old, &mut state).await);
    assert!(matches!(err, Error::Update { .. }));
    assert_eq!(transport.attempts(), 2);
    assert!(!state.is_present());
}

#[tokio::test]
async fn invalid_address_is_rejected_before_any_exchange() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();

    let err = assert_err!(reconciler.create(&www(&["1.2.3.400"]), &mut state).await);
    assert!(matches!(err, Error::Update { ref source, .. } if matches!(**source, Error::Parse(_))));
    assert_eq!(nameserver.exchange_count(), 0);
}

#[tokio::test]
async fn invalid_expected_address_on_read_names_the_query() {
    let nameserver = FakeNameserver::new();
    nameserver.seed("www.example.com.", RecordType::A, &["1.2.3.4"]);
    let reconciler = reconciler_for(&nameserver);
    let mut state = RecordState::new();

    let err = assert_err!(reconciler.read(&www(&["not-an-address"]), &mut state).await);
    match err {
        Error::Query { fqdn, source } => {
            assert_eq!(fqdn, "www.example.com.");
            assert!(matches!(*source, Error::Parse(_)));
        }
        other => panic!("expected query error, got {}", other),
    }
}

#[tokio::test]
async fn delete_removes_whole_set() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let record = www(&["1.2.3.4", "5.6.7.8"]);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&record, &mut state).await);

    let exchanges_before = nameserver.exchange_count();
    assert_ok!(reconciler.delete(&record, &mut state).await);

    assert_eq!(nameserver.exchange_count(), exchanges_before + 1);
    assert!(matches!(
        nameserver.last_update().unwrap().operations(),
        [UpdateOperation::RemoveSet { record_type: RecordType::A, .. }]
    ));
    assert!(nameserver.records("www.example.com.", RecordType::A).is_empty());
    assert!(!state.is_present());
}

#[tokio::test]
async fn delete_failure_keeps_state() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let record = www(&["1.2.3.4"]);
    let mut state = RecordState::new();
    assert_ok!(reconciler.create(&record, &mut state).await);

    nameserver.force_update_rcode(Rcode::NotAuth);
    let err = assert_err!(reconciler.delete(&record, &mut state).await);
    assert!(matches!(err, Error::Delete { .. }));
    assert_eq!(err.rcode(), Some(Rcode::NotAuth));
    assert!(state.is_present());
}

#[tokio::test]
async fn aaaa_record_sets_reconcile() {
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let record = RecordSet::new(ZONE, "v6", 600, RecordType::Aaaa, ["2001:DB8::1"]);
    let mut state = RecordState::new();

    assert_ok!(reconciler.create(&record, &mut state).await);
    assert_eq!(state.addresses, set(&["2001:db8::1"]));
    assert_eq!(
        nameserver.records("v6.example.com.", RecordType::Aaaa),
        set(&["2001:db8::1"])
    );
}

#[tokio::test]
async fn apply_creates_then_updates_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let nameserver = FakeNameserver::new();
    let reconciler = reconciler_for(&nameserver);
    let key = "www.example.com.";

    // First run: nothing stored, so apply creates
    {
        let store = FileStateStore::new(&path).await.unwrap();
        let mut state = store.get(key).await.unwrap().unwrap_or_default();
        assert_ok!(reconciler.apply(&www(&["1.2.3.4"]), &mut state).await);
        store.set(key, &state).await.unwrap();
    }

    // Second run: stored state drives a minimal update
    {
        let store = FileStateStore::new(&path).await.unwrap();
        let mut state = store.get(key).await.unwrap().unwrap();
        assert!(state.is_present());
        assert_ok!(reconciler.apply(&www(&["5.6.7.8"]), &mut state).await);
        store.set(key, &state).await.unwrap();

        let operations = nameserver.last_update().unwrap().operations().to_vec();
        assert_eq!(operations.len(), 2);
    }

    // Third run: nothing to do
    let store = FileStateStore::new(&path).await.unwrap();
    let mut state = store.get(key).await.unwrap().unwrap();
    let exchanges = nameserver.exchange_count();
    assert_ok!(reconciler.apply(&www(&["5.6.7.8"]), &mut state).await);
    assert_eq!(nameserver.exchange_count(), exchanges);
}

#[tokio::test]
async fn shared_client_serves_concurrent_reconcilers() {
    let nameserver = FakeNameserver::new().with_key(server_key());
    let client = Arc::new(
        dnsup_core::ClientConfig::new("127.0.0.1")
            .with_key(KEY_NAME, KEY_SECRET, "hmac-sha256")
            .build_with_transport(Arc::new(nameserver.clone()))
            .unwrap(),
    );

    let tasks: Vec<_> = [("www", "1.2.3.4"), ("mail", "5.6.7.8")]
        .into_iter()
        .map(|(name, address)| {
            let reconciler = Reconciler::new(Arc::clone(&client));
            tokio::spawn(async move {
                let record = RecordSet::new(ZONE, name, 300, RecordType::A, [address]);
                let mut state = RecordState::new();
                reconciler.apply(&record, &mut state).await?;
                Ok::<_, Error>(state)
            })
        })
        .collect();

    for task in tasks {
        let state = assert_ok!(task.await.unwrap());
        assert!(state.is_present());
    }
    assert_eq!(nameserver.records("www.example.com.", RecordType::A), set(&["1.2.3.4"]));
    assert_eq!(nameserver.records("mail.example.com.", RecordType::A), set(&["5.6.7.8"]));
}
