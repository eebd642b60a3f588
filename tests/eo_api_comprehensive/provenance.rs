//! Provenance Tests
//!
//! - Derivation trees from SYN inputs and frame provenance
//! - GIVEN / MEANT / DERIVED classification
//! - Cycle detection with the offending path

use crate::*;

#[test]
fn test_underived_entity_is_given() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("raw", "r1", fields(json!({"v": 1}))))
        .unwrap();

    let tree = store.trace_provenance("r1").unwrap();
    assert_eq!(tree.id(), "r1");
    assert_eq!(tree.epistemic_type(), EpistemicType::Given);
    assert!(tree.is_leaf());
}

#[test]
fn test_synthesis_tree() {
    let store = ephemeral();
    store
        .append(RecordDraft::ins("raw", "r1", fields(json!({"v": 1}))))
        .unwrap();
    store
        .append(RecordDraft::ins("raw", "r2", fields(json!({"v": 2}))))
        .unwrap();
    let syn_id = store
        .append(RecordDraft::syn("reports", "summary", ["r1", "r2"]))
        .unwrap();
    store
        .append(RecordDraft::syn("reports", "dashboard", ["summary", "r3"]))
        .unwrap();

    let tree = store.trace_provenance("dashboard").unwrap();
    assert_eq!(tree.epistemic_type(), EpistemicType::Derived);
    assert_eq!(tree.depth(), 3);
    assert_eq!(tree.node_count(), 5);
    assert_eq!(tree.sources(), vec!["r1", "r2", "r3"]);

    let summary = tree.child(0).unwrap();
    assert_eq!(summary.id(), "summary");
    assert_eq!(summary.epistemic_type(), EpistemicType::Derived);
    assert_eq!(summary.record_id(), Some(&syn_id));
    let leaf_ids: Vec<_> = summary.children().map(|c| c.id()).collect();
    assert_eq!(leaf_ids, vec!["r1", "r2"]);
    assert!(summary
        .children()
        .all(|c| c.epistemic_type() == EpistemicType::Given));
}

#[test]
fn test_latest_derivation_wins() {
    let store = ephemeral();
    store.append(RecordDraft::syn("reports", "s", ["old_input"])).unwrap();
    store.append(RecordDraft::syn("reports", "s", ["new_input"])).unwrap();

    let tree = store.trace_provenance("s").unwrap();
    assert_eq!(tree.sources(), vec!["new_input"]);
}

#[test]
fn test_frame_provenance_classifications() {
    let store = ephemeral();
    let frame = Frame::new()
        .epistemic(EpistemicType::Derived)
        .provenance([
            ProvenanceRef::given("sensor_1"),
            ProvenanceRef::meant("policy_1"),
            ProvenanceRef::derived("model_1"),
        ]);
    store
        .append(RecordDraft::ins("scores", "score_1", fields(json!({"v": 0.9}))).with_frame(frame))
        .unwrap();

    let tree = store.trace_provenance("score_1").unwrap();
    let kinds: Vec<_> = tree
        .children()
        .map(|c| (c.id(), c.epistemic_type()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("sensor_1", EpistemicType::Given),
            ("policy_1", EpistemicType::Meant),
            // DERIVED without a derivation record of its own stays a leaf
            ("model_1", EpistemicType::Derived),
        ]
    );
    assert!(tree.children().all(|c| c.is_leaf()));
}

#[test]
fn test_shared_ancestor_is_not_a_cycle() {
    let store = ephemeral();
    store.append(RecordDraft::syn("d", "left", ["root"])).unwrap();
    store.append(RecordDraft::syn("d", "right", ["root"])).unwrap();
    store.append(RecordDraft::syn("d", "top", ["left", "right"])).unwrap();

    let tree = store.trace_provenance("top").unwrap();
    assert_eq!(tree.node_count(), 5);
    assert_eq!(tree.sources(), vec!["root"]);
}

#[test]
fn test_direct_cycle_detected() {
    let store = ephemeral();
    store.append(RecordDraft::syn("d", "a", ["b"])).unwrap();
    store.append(RecordDraft::syn("d", "b", ["a"])).unwrap();

    let err = store.trace_provenance("a").unwrap_err();
    assert!(err.is_cycle());
    match err {
        Error::ProvenanceCycle { entity_id, path } => {
            assert_eq!(entity_id, "a");
            assert_eq!(path, vec!["a", "b", "a"]);
        }
        other => panic!("expected a cycle, got {}", other),
    }
}

#[test]
fn test_self_derivation_is_cycle() {
    let store = ephemeral();
    store.append(RecordDraft::syn("d", "x", ["x"])).unwrap();

    let err = store.trace_provenance("x").unwrap_err();
    assert!(err.is_cycle());
    assert!(err.to_string().contains("x -> x"), "message: {}", err);
}

#[test]
fn test_cycle_below_root_reports_path() {
    let store = ephemeral();
    store.append(RecordDraft::syn("d", "top", ["x"])).unwrap();
    store.append(RecordDraft::syn("d", "x", ["y"])).unwrap();
    store.append(RecordDraft::syn("d", "y", ["x"])).unwrap();

    match store.trace_provenance("top") {
        Err(Error::ProvenanceCycle { entity_id, path }) => {
            assert_eq!(entity_id, "x");
            assert_eq!(path, vec!["top", "x", "y", "x"]);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[test]
fn test_deep_chain() {
    let store = ephemeral();
    for i in 1..100 {
        store
            .append(RecordDraft::syn("chain", format!("n{}", i), [format!("n{}", i - 1)]))
            .unwrap();
    }

    let tree = store.trace_provenance("n99").unwrap();
    assert_eq!(tree.depth(), 100);
    assert_eq!(tree.sources(), vec!["n0"]);
}

#[test]
fn test_chain_of_100k_on_small_stack() {
    const DEPTH: usize = 100_000;
    let store = ephemeral();
    for i in 1..=DEPTH {
        store
            .append(RecordDraft::syn("chain", format!("n{}", i), [format!("n{}", i - 1)]))
            .unwrap();
    }

    let tracer = store.clone();
    let tree = std::thread::Builder::new()
        .stack_size(256 * 1024)
        .spawn(move || tracer.trace_provenance(&format!("n{}", DEPTH)))
        .unwrap()
        .join()
        .unwrap()
        .unwrap();

    assert_eq!(tree.depth(), DEPTH + 1);
    assert_eq!(tree.node_count(), DEPTH + 1);
    assert_eq!(tree.sources(), vec!["n0"]);
}

#[test]
fn test_stacked_diamonds_trace_quickly() {
    let store = ephemeral();
    let levels = 30;
    for i in 1..=levels {
        let below = format!("b{}", i - 1);
        store
            .append(RecordDraft::syn("d", format!("l{}", i), [below.clone()]))
            .unwrap();
        store
            .append(RecordDraft::syn("d", format!("r{}", i), [below]))
            .unwrap();
        store
            .append(RecordDraft::syn(
                "d",
                format!("b{}", i),
                [format!("l{}", i), format!("r{}", i)],
            ))
            .unwrap();
    }

    let started = std::time::Instant::now();
    let tree = store.trace_provenance("b30").unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(tree.stored_nodes(), 3 * levels + 2);
    assert_eq!(tree.node_count(), (1usize << (levels + 2)) - 3);
}
