//! State Reconstruction Tests
//!
//! - INS replaces, ALT sets one field, NUL clears
//! - Non-state operators leave state untouched
//! - Ordering by timestamp, ties by append order
//! - Point-in-time and per-table reconstruction
//! - Projection cache coherence

use crate::*;
use serde::Deserialize;

// =============================================================================
// FOLD SEMANTICS
// =============================================================================

#[test]
fn test_insert_then_alter() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins(
            "organizations",
            "org_1",
            fields(json!({"name": "A", "status": "draft"})),
        ))
        .unwrap();
    store
        .append(RecordDraft::alt("organizations", "org_1", "status", "draft", "verified"))
        .unwrap();

    let state = store.reconstruct_state("org_1");
    assert_eq!(state.len(), 2);
    assert_eq!(state["name"], json!("A"));
    assert_eq!(state["status"], json!("verified"));
}

#[test]
fn test_unknown_entity_is_empty() {
    let store = ephemeral();
    assert!(store.reconstruct_state("nobody").is_empty());
}

#[test]
fn test_nul_clears_state() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("subscriptions", "sub_1", fields(json!({"plan": "pro"}))))
        .unwrap();
    store.append(RecordDraft::nul("subscriptions", "sub_1")).unwrap();

    assert!(store.reconstruct_state("sub_1").is_empty());
}

#[test]
fn test_nul_only_entity() {
    let store = ephemeral();
    store.append(RecordDraft::nul("subscriptions", "sub_1")).unwrap();

    assert!(store.reconstruct_state("sub_1").is_empty());
    let trail = store.audit_trail("sub_1");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].op, Operator::Nul);
}

#[test]
fn test_records_after_nul_do_not_resurrect_state() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"a": 1}))))
        .unwrap();
    store.append(RecordDraft::nul("t", "x")).unwrap();
    store.append(RecordDraft::alt("t", "x", "a", 1, 2)).unwrap();

    assert!(store.reconstruct_state("x").is_empty());
    assert_eq!(store.audit_trail("x").len(), 3);
}

#[test]
fn test_second_insert_replaces_all_fields() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"a": 1, "b": 2}))))
        .unwrap();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"c": 3}))))
        .unwrap();

    let state = store.reconstruct_state("x");
    assert_eq!(state.keys().collect::<Vec<_>>(), vec!["c"]);
}

#[test]
fn test_alter_without_insert_creates_field() {
    let store = ephemeral();
    store
        .append(RecordDraft::alt("t", "x", "status", json!(null), "open"))
        .unwrap();

    assert_eq!(store.reconstruct_state("x")["status"], json!("open"));
}

#[test]
fn test_alter_old_value_is_informational() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"status": "draft"}))))
        .unwrap();
    // old does not match current state; the new value still applies
    store
        .append(RecordDraft::alt("t", "x", "status", "archived", "live"))
        .unwrap();

    assert_eq!(store.reconstruct_state("x")["status"], json!("live"));
}

#[test]
fn test_non_state_operators_ignored() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();
    let before = store.reconstruct_state("x");

    store.append(RecordDraft::des("t", "x", json!("a widget"))).unwrap();
    store.append(RecordDraft::seg("t", "x", json!({"v": 1}))).unwrap();
    store.append(RecordDraft::con("x", "y").in_table("t")).unwrap();
    store.append(RecordDraft::sup("t", "x", json!({"v": 99}))).unwrap();
    store.append(RecordDraft::rec("t", "x", json!("rename"))).unwrap();

    assert_eq!(store.reconstruct_state("x"), before);
}

#[test]
fn test_state_deserializes_into_struct() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Organization {
        name: String,
        employees: u32,
    }

    let store = ephemeral();
    store
        .append(RecordDraft::ins(
            "organizations",
            "org_1",
            fields(json!({"name": "Acme", "employees": 10})),
        ))
        .unwrap();
    store
        .append(RecordDraft::alt("organizations", "org_1", "employees", 10, 12))
        .unwrap();

    let state = store.reconstruct_state("org_1");
    let value = serde_json::to_value(&state).unwrap();
    let org: Organization = serde_json::from_value(value).unwrap();
    assert_eq!(
        org,
        Organization {
            name: "Acme".into(),
            employees: 12
        }
    );
}

// =============================================================================
// ORDERING
// =============================================================================

#[test]
fn test_caller_timestamps_order_the_fold() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 0}))).at(Timestamp::from_millis(100)))
        .unwrap();
    store
        .append(RecordDraft::alt("t", "x", "v", 0, "late").at(Timestamp::from_millis(300)))
        .unwrap();

    assert_eq!(store.reconstruct_state("x")["v"], json!("late"));
    assert_eq!(
        store.reconstruct_state_at("x", Timestamp::from_millis(200))["v"],
        json!(0)
    );
}

#[test]
fn test_equal_timestamps_break_ties_by_append_order() {
    let store = ephemeral();
    let ts = Timestamp::from_millis(500);
    for v in ["first", "second", "third"] {
        store
            .append(RecordDraft::alt("t", "x", "v", json!(null), v).at(ts))
            .unwrap();
    }

    assert_eq!(store.reconstruct_state("x")["v"], json!("third"));
    let ops: Vec<_> = store
        .audit_trail("x")
        .iter()
        .map(|e| e.context.new_value().cloned())
        .collect();
    assert_eq!(
        ops,
        vec![Some(json!("first")), Some(json!("second")), Some(json!("third"))]
    );
}

#[test]
fn test_backdated_append_rejected() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();
    store.append(RecordDraft::alt("t", "x", "v", 1, 2)).unwrap();
    let stats = store.stats();

    let err = store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 0}))).at(Timestamp::from_millis(1)))
        .unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(
        err,
        Error::Validation(ValidationError::TimestampRegression { .. })
    ));

    assert_eq!(store.stats(), stats);
    assert_eq!(store.operator_pattern("x").to_string(), "INS→ALT");
    assert_eq!(store.reconstruct_state("x")["v"], json!(2));
    assert!(store.verify_indexes().is_consistent());
}

#[test]
fn test_backdating_is_judged_per_entity() {
    let store = ephemeral();
    store.append(RecordDraft::nul("t", "recent")).unwrap();

    // No history for `imported`, so an old timestamp is fine
    store
        .append(RecordDraft::ins("t", "imported", fields(json!({"v": 1}))).at(Timestamp::from_millis(5)))
        .unwrap();
    store
        .append(RecordDraft::alt("t", "imported", "v", 1, 2).at(Timestamp::from_millis(5)))
        .unwrap();
    assert_eq!(store.reconstruct_state("imported")["v"], json!(2));

    let assigned = store.append(RecordDraft::alt("t", "imported", "v", 2, 3)).unwrap();
    assert!(store.get(&assigned).unwrap().timestamp > Timestamp::from_millis(5));
}

// =============================================================================
// POINT IN TIME AND TABLE SCOPE
// =============================================================================

#[test]
fn test_reconstruct_state_at() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))).at(Timestamp::from_millis(10)))
        .unwrap();
    store
        .append(RecordDraft::alt("t", "x", "v", 1, 2).at(Timestamp::from_millis(20)))
        .unwrap();
    store
        .append(RecordDraft::nul("t", "x").at(Timestamp::from_millis(30)))
        .unwrap();

    assert!(store.reconstruct_state_at("x", Timestamp::from_millis(5)).is_empty());
    assert_eq!(store.reconstruct_state_at("x", Timestamp::from_millis(10))["v"], json!(1));
    assert_eq!(store.reconstruct_state_at("x", Timestamp::from_millis(25))["v"], json!(2));
    assert!(store.reconstruct_state_at("x", Timestamp::from_millis(30)).is_empty());
    assert!(store.reconstruct_state("x").is_empty());
}

#[test]
fn test_same_id_in_two_tables() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("people", "p1", fields(json!({"name": "Ada"}))))
        .unwrap();
    store
        .append(RecordDraft::ins("accounts", "p1", fields(json!({"balance": 5}))))
        .unwrap();

    let people = store.reconstruct_state_in("people", "p1");
    assert_eq!(people.keys().collect::<Vec<_>>(), vec!["name"]);
    let accounts = store.reconstruct_state_in("accounts", "p1");
    assert_eq!(accounts.keys().collect::<Vec<_>>(), vec!["balance"]);

    // Across tables the later INS wins
    assert_eq!(store.reconstruct_state("p1"), accounts);
    assert_eq!(store.entity_history("people", "p1").len(), 1);
    assert_eq!(store.tables(), vec!["accounts".to_string(), "people".to_string()]);
}

#[test]
fn test_table_records_paging() {
    let store = ephemeral();
    for i in 0..25 {
        store
            .append(RecordDraft::nul("t", format!("e{}", i)).at(Timestamp::from_millis(i)))
            .unwrap();
    }

    let first = store.table_records("t", 0, Some(10));
    let second = store.table_records("t", 10, Some(10));
    let rest = store.table_records("t", 20, None);
    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert_eq!(rest.len(), 5);
    assert_eq!(first[0].entity_id(), "e0");
    assert_eq!(second[0].entity_id(), "e10");
    assert_eq!(rest[4].entity_id(), "e24");
    assert!(store.table_records("t", 30, None).is_empty());
    assert!(store.table_records("missing", 0, None).is_empty());
}

// =============================================================================
// PROJECTION CACHE
// =============================================================================

#[test]
fn test_cache_is_invalidated_by_appends() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();

    assert_eq!(store.reconstruct_state("x")["v"], json!(1));
    assert_eq!(store.reconstruct_state("x")["v"], json!(1));
    let stats = store.cache_stats().expect("cache enabled by default");
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    store.append(RecordDraft::alt("t", "x", "v", 1, 2)).unwrap();
    assert_eq!(store.reconstruct_state("x")["v"], json!(2));
    assert_eq!(store.cache_stats().unwrap().misses, 2);
}

#[test]
fn test_cache_disabled() {
    init_tracing();
    let store = EoStore::builder()
        .no_durability()
        .projection_cache(false)
        .open_temp()
        .unwrap();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();

    assert_eq!(store.reconstruct_state("x")["v"], json!(1));
    assert!(store.cache_stats().is_none());
}

#[test]
fn test_rebuild_indexes_preserves_projections() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();
    store.append(RecordDraft::con("x", "y")).unwrap();
    let state = store.reconstruct_state("x");
    let links = store.connections("x");

    store.rebuild_indexes();

    assert_eq!(store.reconstruct_state("x"), state);
    assert_eq!(store.connections("x"), links);
    let verification = store.verify_indexes();
    assert!(verification.is_consistent());
    assert_eq!(verification.records_scanned, 2);
}
