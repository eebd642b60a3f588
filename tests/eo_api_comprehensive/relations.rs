//! Relationship, Audit and Pattern Tests
//!
//! - CON links are symmetric
//! - Audit trails list every record, NUL included, in total order
//! - Operator patterns reflect the audit trail

use crate::*;
use std::collections::BTreeSet;

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// CONNECTIONS
// =============================================================================

#[test]
fn test_connections_are_symmetric() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("organizations", "org_1", fields(json!({"name": "A"}))))
        .unwrap();
    store.append(RecordDraft::con("org_1", "campaign_1")).unwrap();

    assert_eq!(store.connections("org_1"), set(&["campaign_1"]));
    assert_eq!(store.connections("campaign_1"), set(&["org_1"]));
}

#[test]
fn test_connections_deduplicate_and_merge_directions() {
    let store = ephemeral();
    store.append(RecordDraft::con("hub", "a")).unwrap();
    store.append(RecordDraft::con("hub", "a")).unwrap();
    store.append(RecordDraft::con("b", "hub")).unwrap();
    store.append(RecordDraft::con("c", "d")).unwrap();

    assert_eq!(store.connections("hub"), set(&["a", "b"]));
    assert_eq!(store.connections("a"), set(&["hub"]));
    assert_eq!(store.connections("c"), set(&["d"]));
    assert!(store.connections("lonely").is_empty());
}

#[test]
fn test_self_link() {
    let store = ephemeral();
    store.append(RecordDraft::con("x", "x")).unwrap();

    assert_eq!(store.connections("x"), set(&["x"]));
    assert!(store.verify_indexes().is_consistent());
}

#[test]
fn test_links_survive_nul() {
    let store = ephemeral();
    store.append(RecordDraft::con("x", "y")).unwrap();
    store.append(RecordDraft::nul("t", "x")).unwrap();

    assert_eq!(store.connections("y"), set(&["x"]));
}

// =============================================================================
// AUDIT TRAIL
// =============================================================================

#[test]
fn test_audit_trail_lists_every_record() {
    let store = ephemeral();
    let frame = Frame::new().actor("alice");
    let ids = vec![
        store
            .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))).with_frame(frame.clone()))
            .unwrap(),
        store.append(RecordDraft::alt("t", "x", "v", 1, 2)).unwrap(),
        store.append(RecordDraft::sup("t", "x", json!("overlay"))).unwrap(),
        store.append(RecordDraft::nul("t", "x")).unwrap(),
    ];

    let trail = store.audit_trail("x");
    let trail_ids: Vec<_> = trail.iter().map(|e| e.record_id.clone()).collect();
    assert_eq!(trail_ids, ids);
    assert_eq!(trail[0].actor.as_deref(), Some("alice"));
    assert_eq!(trail[1].actor, None);
    assert_eq!(trail[1].context.new_value(), Some(&json!(2)));
    assert!(trail.windows(2).all(|w| w[0].when <= w[1].when));
}

#[test]
fn test_audit_trail_keeps_caller_timestamps() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({}))).at(Timestamp::from_millis(10)))
        .unwrap();
    store
        .append(RecordDraft::nul("t", "y").at(Timestamp::from_millis(50)))
        .unwrap();
    store
        .append(RecordDraft::alt("t", "x", "v", 0, 1).at(Timestamp::from_millis(20)))
        .unwrap();
    store
        .append(RecordDraft::nul("t", "x").at(Timestamp::from_millis(30)))
        .unwrap();

    let trail = store.audit_trail("x");
    let ops: Vec<_> = trail.iter().map(|e| e.op).collect();
    assert_eq!(ops, vec![Operator::Ins, Operator::Alt, Operator::Nul]);
    let whens: Vec<_> = trail.iter().map(|e| e.when.as_millis()).collect();
    assert_eq!(whens, vec![10, 20, 30]);
}

#[test]
fn test_audit_trail_of_unknown_entity_is_empty() {
    let store = ephemeral();
    store.append(RecordDraft::nul("t", "x")).unwrap();
    assert!(store.audit_trail("y").is_empty());
}

#[test]
fn test_audit_event_serializes() {
    let store = ephemeral();
    store
        .append(RecordDraft::alt("organizations", "org_1", "status", "draft", "verified"))
        .unwrap();

    let event = &store.audit_trail("org_1")[0];
    let value = serde_json::to_value(event).unwrap();
    assert_eq!(value["op"], json!("ALT"));
    assert_eq!(value["context"]["table"], json!("organizations"));
    assert_eq!(value["context"]["new"], json!("verified"));
}

// =============================================================================
// OPERATOR PATTERN
// =============================================================================

#[test]
fn test_operator_pattern_matches_audit_trail() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();
    store.append(RecordDraft::alt("t", "x", "v", 1, 2)).unwrap();
    store.append(RecordDraft::alt("t", "x", "v", 2, 3)).unwrap();
    store.append(RecordDraft::nul("t", "x")).unwrap();

    let pattern = store.operator_pattern("x");
    assert_eq!(pattern.to_string(), "INS→ALT→ALT→NUL");
    assert_eq!(pattern, [Operator::Ins, Operator::Alt, Operator::Alt, Operator::Nul]);
    assert!(pattern.contains(&[Operator::Alt, Operator::Alt]));
    assert!(pattern.starts_with(&[Operator::Ins]));
    assert!(pattern.ends_with(&[Operator::Nul]));
    assert!(!pattern.contains(&[Operator::Ins, Operator::Nul]));

    let audit_ops: Vec<_> = store.audit_trail("x").iter().map(|e| e.op).collect();
    assert_eq!(pattern.as_slice(), audit_ops.as_slice());
}

#[test]
fn test_operator_pattern_parses() {
    let parsed: OperatorPattern = "INS -> ALT -> NUL".parse().unwrap();
    assert_eq!(parsed.to_string(), "INS→ALT→NUL");
    assert!("INS->BOGUS".parse::<OperatorPattern>().is_err());
}

#[test]
fn test_operator_pattern_of_unknown_entity_is_empty() {
    let store = ephemeral();
    assert!(store.operator_pattern("nobody").is_empty());
    assert_eq!(store.operator_pattern("nobody").to_string(), "");
}
