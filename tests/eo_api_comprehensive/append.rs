//! Append Tests
//!
//! - Id and timestamp assignment
//! - Validation of the operator taxonomy
//! - Rejections leave the log untouched
//! - Duplicate ids, read-only and closed stores

use crate::*;

// =============================================================================
// ASSIGNMENT
// =============================================================================

#[test]
fn test_append_assigns_id_and_timestamp() {
    let store = ephemeral();
    let id = store
        .append(RecordDraft::ins("organizations", "org_1", fields(json!({"name": "A"}))))
        .expect("append should succeed");

    assert!(id.as_str().starts_with("op-"), "generated id: {}", id);
    let record = store.get(&id).expect("record is readable");
    assert_eq!(record.operator, Operator::Ins);
    assert_eq!(record.entity_id(), "org_1");
    assert_eq!(record.source_table(), Some("organizations"));
    assert!(record.timestamp.as_millis() > 0);
}

#[test]
fn test_generated_ids_are_unique() {
    let store = ephemeral();
    let mut ids = std::collections::HashSet::new();
    for i in 0..200 {
        let id = store
            .append(RecordDraft::nul("t", format!("e{}", i)))
            .unwrap();
        assert!(ids.insert(id), "generated id repeated");
    }
    assert_eq!(store.len(), 200);
}

#[test]
fn test_caller_id_and_timestamp_preserved() {
    let store = ephemeral();
    let id = store
        .append(
            RecordDraft::des("schemas", "org_schema", json!({"fields": ["name"]}))
                .with_id("op-fixed")
                .at(Timestamp::from_millis(1_000)),
        )
        .unwrap();

    assert_eq!(id.as_str(), "op-fixed");
    let record = store.get(&id).unwrap();
    assert_eq!(record.timestamp, Timestamp::from_millis(1_000));
}

#[test]
fn test_assigned_timestamps_never_go_backwards() {
    let store = ephemeral();
    let far_future = Timestamp::from_millis(i64::MAX / 2);
    store
        .append(RecordDraft::nul("t", "a").at(far_future))
        .unwrap();
    let id = store.append(RecordDraft::nul("t", "b")).unwrap();

    let assigned = store.get(&id).unwrap().timestamp;
    assert!(assigned >= far_future, "{} should not precede {}", assigned, far_future);
}

#[test]
fn test_all_nine_operators_accepted() {
    let store = ephemeral();
    let drafts = vec![
        RecordDraft::des("t", "x", json!("a thing")),
        RecordDraft::ins("t", "x", fields(json!({"k": 1}))),
        RecordDraft::seg("t", "x", json!({"k": {"gt": 0}})),
        RecordDraft::con("x", "y"),
        RecordDraft::syn("t", "z", ["x", "y"]),
        RecordDraft::alt("t", "x", "k", 1, 2),
        RecordDraft::sup("t", "x", json!({"lens": "finance"})),
        RecordDraft::rec("t", "x", json!("schema migration")),
        RecordDraft::nul("t", "x"),
    ];
    for draft in drafts {
        let op = draft.operator;
        store
            .append(draft)
            .unwrap_or_else(|e| panic!("{} rejected: {}", op, e));
    }

    let stats = store.stats();
    assert_eq!(stats.records, 9);
    assert_eq!(stats.per_operator.len(), 9);
    assert!(stats.per_operator.values().all(|&n| n == 1));
}

#[test]
fn test_frame_round_trips() {
    let store = ephemeral();
    let frame = Frame::new()
        .actor("alice")
        .reason("quarterly review")
        .version(3)
        .certainty(0.75)
        .with("source", "crm");
    let id = store
        .append(RecordDraft::alt("organizations", "org_1", "tier", "b", "a").with_frame(frame.clone()))
        .unwrap();

    let record = store.get(&id).unwrap();
    assert_eq!(record.frame.as_ref(), Some(&frame));
    assert_eq!(record.actor(), Some("alice"));
}

#[test]
fn test_aggregate_target_is_stored_and_indexed() {
    let store = ephemeral();
    let id = store
        .append(RecordDraft::new(
            Operator::Seg,
            Target::aggregate("cohort_q3", ["org_1", "org_2"]),
            Context::in_table("organizations").with("filter", json!({"tier": "a"})),
        ))
        .unwrap();

    let record = store.get(&id).unwrap();
    assert_eq!(record.target.id, "cohort_q3");
    assert_eq!(
        record.target.ids.as_deref(),
        Some(&["org_1".to_string(), "org_2".to_string()][..])
    );
    assert_eq!(store.operator_pattern("cohort_q3").to_string(), "SEG");
    assert!(store.reconstruct_state("cohort_q3").is_empty());
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn test_unknown_operator_rejected_without_side_effects() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("organizations", "org_1", fields(json!({"name": "A"}))))
        .unwrap();
    let stats_before = store.stats();
    let tables_before = store.tables();

    let err = store
        .append_json(r#"{"op":"FOO","target":{"id":"x"},"context":{"table":"t"}}"#)
        .expect_err("unknown operator must be rejected");

    assert!(err.is_validation(), "unexpected error: {}", err);
    assert!(matches!(
        err,
        Error::Validation(ValidationError::UnknownOperator(ref op)) if op == "FOO"
    ));
    assert_eq!(store.stats(), stats_before);
    assert_eq!(store.tables(), tables_before);
    assert!(store.reconstruct_state("x").is_empty());
    assert!(store.audit_trail("x").is_empty());
    assert!(store.verify_indexes().is_consistent());
}

#[test]
fn test_invalid_drafts_rejected() {
    let store = ephemeral();
    let invalid = vec![
        // Empty target id
        RecordDraft::nul("t", ""),
        // Missing table on a non-CON operator
        RecordDraft::new(Operator::Nul, Target::entity("x"), Context::new()),
        // INS without data
        RecordDraft::new(Operator::Ins, Target::entity("x"), Context::in_table("t")),
        // INS data that is not an object
        RecordDraft::new(
            Operator::Ins,
            Target::entity("x"),
            Context::in_table("t").with("data", json!([1, 2])),
        ),
        // ALT without target.field
        RecordDraft::new(
            Operator::Alt,
            Target::entity("x"),
            Context::in_table("t").with("old", 1).with("new", 2),
        ),
        // CON without related
        RecordDraft::new(Operator::Con, Target::entity("x"), Context::new()),
        // CON with an empty related id
        RecordDraft::con("x", ""),
        // SYN with non-string inputs
        RecordDraft::new(
            Operator::Syn,
            Target::entity("x"),
            Context::in_table("t").with("inputs", json!([1])),
        ),
        // Certainty out of range
        RecordDraft::nul("t", "x").with_frame(Frame::new().certainty(1.5)),
    ];

    for draft in invalid {
        let op = draft.operator;
        let err = store.append(draft).expect_err("draft should be rejected");
        assert!(err.is_validation(), "{}: unexpected error {}", op, err);
    }
    assert!(store.is_empty());
    assert!(store.tables().is_empty());
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let store = ephemeral();
    let err = store.append_json("{not json").unwrap_err();
    assert!(matches!(err, Error::Serialization(_)), "got {}", err);
    assert!(store.is_empty());
}

#[test]
fn test_append_json_wire_shape() {
    let store = ephemeral();
    let id = store
        .append_json(
            r#"{"op":"ALT","target":{"id":"org_1","field":"status"},
                "context":{"table":"organizations","old":"draft","new":"verified"},
                "frame":{"actor":"bob"}}"#,
        )
        .unwrap();

    let record = store.get(&id).unwrap();
    assert_eq!(record.operator, Operator::Alt);
    assert_eq!(record.target.field.as_deref(), Some("status"));
    assert_eq!(record.actor(), Some("bob"));
    assert_eq!(store.reconstruct_state("org_1")["status"], json!("verified"));
}

// =============================================================================
// DUPLICATES AND ACCESS
// =============================================================================

#[test]
fn test_duplicate_id_rejected() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))).with_id("op-1"))
        .unwrap();

    let err = store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 2}))).with_id("op-1"))
        .unwrap_err();

    assert!(err.is_duplicate());
    assert_eq!(store.len(), 1);
    assert_eq!(store.reconstruct_state("x")["v"], json!(1));
    assert!(store.verify_indexes().is_consistent());

    // The log keeps accepting fresh ids after a rejection
    store
        .append(RecordDraft::alt("t", "x", "v", 1, 3).with_id("op-2"))
        .unwrap();
    assert_eq!(store.reconstruct_state("x")["v"], json!(3));
}

#[test]
fn test_read_only_rejects_appends() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let store = EoStore::builder().path(dir.path()).strict().open().unwrap();
        store.append(RecordDraft::nul("t", "x")).unwrap();
        store.close().unwrap();
    }

    let store = EoStore::builder().path(dir.path()).read_only().open().unwrap();
    assert_eq!(store.access_mode(), AccessMode::ReadOnly);
    assert_eq!(store.len(), 1, "read-only open still replays the WAL");

    let err = store.append(RecordDraft::nul("t", "y")).unwrap_err();
    assert!(matches!(err, Error::ReadOnly));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_closed_store_rejects_appends_but_serves_reads() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("t", "x", fields(json!({"v": 1}))))
        .unwrap();
    store.close().unwrap();

    let err = store.append(RecordDraft::nul("t", "x")).unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {}", err);
    assert_eq!(store.reconstruct_state("x")["v"], json!(1));
}
