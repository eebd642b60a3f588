//! Provenance tracker
//!
//! A *derivation record* is a SYN record, or any record whose
//! `frame.epistemic` is `DERIVED`. Its inputs are `frame.provenance` when
//! present; otherwise `context.inputs`, each classified `GIVEN` unless the
//! input has a derivation record of its own, in which case it is `DERIVED`.
//!
//! Tracing expands `DERIVED` nodes through the latest derivation record of
//! that entity. `GIVEN` and `MEANT` inputs are leaves.
//!
//! ## Traversal
//!
//! Depth-first with an explicit work stack, so lineage depth is bounded by
//! memory rather than the thread stack. Each entity is expanded at most once
//! per trace; later references to it share the finished node, which keeps
//! stacked diamonds linear in the number of records.
//!
//! ## Cycles
//!
//! The traversal keeps the set of entities on the current root-to-node path.
//! Reaching an entity already on the path is a cycle and aborts the trace.
//! The same entity on two different branches (a diamond) is fine.

use crate::projection::RecordSource;
use eo_core::{EoError, EpistemicType, OperationRecord, ProvenanceRef, RecordId, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Provenance of one entity
///
/// Stored as a node table: node 0 is the root and `children` hold node
/// indices. An ancestor reached along several branches is stored once and
/// referenced from each parent, so the tree views below are logical.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceTree {
    nodes: Vec<NodeData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct NodeData {
    id: String,
    epistemic_type: EpistemicType,
    record_id: Option<RecordId>,
    children: Vec<usize>,
    #[serde(skip)]
    depth: usize,
    #[serde(skip)]
    count: usize,
}

impl NodeData {
    fn leaf(id: impl Into<String>, epistemic_type: EpistemicType) -> Self {
        Self {
            id: id.into(),
            epistemic_type,
            record_id: None,
            children: Vec::new(),
            depth: 1,
            count: 1,
        }
    }

    fn derived(id: impl Into<String>, record: &OperationRecord) -> Self {
        Self {
            record_id: Some(record.id.clone()),
            ..Self::leaf(id, EpistemicType::Derived)
        }
    }
}

impl ProvenanceTree {
    fn single(id: &str, epistemic_type: EpistemicType) -> Self {
        Self {
            nodes: vec![NodeData::leaf(id, epistemic_type)],
        }
    }

    /// Root node
    pub fn root(&self) -> ProvenanceNode<'_> {
        ProvenanceNode {
            tree: self,
            index: 0,
        }
    }

    /// Root entity id
    pub fn id(&self) -> &str {
        self.root().id()
    }

    /// How the root entity is known
    pub fn epistemic_type(&self) -> EpistemicType {
        self.root().epistemic_type()
    }

    /// Derivation record used to expand the root
    pub fn record_id(&self) -> Option<&RecordId> {
        self.root().record_id()
    }

    /// Inputs of the root, in provenance-list order
    pub fn children(&self) -> impl ExactSizeIterator<Item = ProvenanceNode<'_>> + '_ {
        self.root().children()
    }

    /// The `n`th input of the root
    pub fn child(&self, n: usize) -> Option<ProvenanceNode<'_>> {
        self.root().child(n)
    }

    /// Whether the root has no inputs
    pub fn is_leaf(&self) -> bool {
        self.root().is_leaf()
    }

    /// Longest root-to-leaf path, counting nodes
    pub fn depth(&self) -> usize {
        self.root().depth()
    }

    /// Nodes of the logical tree, shared ancestors counted once per branch
    ///
    /// Saturates at `usize::MAX`.
    pub fn node_count(&self) -> usize {
        self.root().node_count()
    }

    /// Nodes actually stored, shared ancestors counted once
    pub fn stored_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Distinct leaf entity ids, sorted
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .map(|n| n.id.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// A node of a [`ProvenanceTree`]
#[derive(Clone, Copy)]
pub struct ProvenanceNode<'a> {
    tree: &'a ProvenanceTree,
    index: usize,
}

impl<'a> ProvenanceNode<'a> {
    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.index]
    }

    /// Entity id
    pub fn id(&self) -> &'a str {
        &self.data().id
    }

    /// How this entity is known
    pub fn epistemic_type(&self) -> EpistemicType {
        self.data().epistemic_type
    }

    /// Derivation record used to expand this node
    pub fn record_id(&self) -> Option<&'a RecordId> {
        self.data().record_id.as_ref()
    }

    /// Inputs, in provenance-list order
    pub fn children(&self) -> impl ExactSizeIterator<Item = ProvenanceNode<'a>> + 'a {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&index| ProvenanceNode { tree, index })
    }

    /// The `n`th input
    pub fn child(&self, n: usize) -> Option<ProvenanceNode<'a>> {
        self.data().children.get(n).map(|&index| ProvenanceNode {
            tree: self.tree,
            index,
        })
    }

    /// Whether the node has no inputs
    pub fn is_leaf(&self) -> bool {
        self.data().children.is_empty()
    }

    /// Longest path from this node to a leaf, counting nodes
    pub fn depth(&self) -> usize {
        self.data().depth
    }

    /// Nodes of the logical subtree rooted here
    pub fn node_count(&self) -> usize {
        self.data().count
    }
}

impl std::fmt::Debug for ProvenanceNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceNode")
            .field("id", &self.id())
            .field("epistemic_type", &self.epistemic_type())
            .field("record_id", &self.record_id())
            .field("children", &self.data().children.len())
            .finish()
    }
}

/// Latest derivation record of `entity_id`, if any
pub fn latest_derivation<S: RecordSource + ?Sized>(
    source: &S,
    entity_id: &str,
) -> Option<Arc<OperationRecord>> {
    source
        .records_for_target(entity_id)
        .into_iter()
        .rev()
        .find(|r| r.record.is_derivation())
        .map(|r| r.record)
}

/// Inputs of a derivation record
pub fn provenance_inputs<S: RecordSource + ?Sized>(
    source: &S,
    record: &OperationRecord,
) -> Vec<ProvenanceRef> {
    classify_inputs(record, |input| latest_derivation(source, input).is_some())
}

fn classify_inputs(
    record: &OperationRecord,
    mut has_derivation: impl FnMut(&str) -> bool,
) -> Vec<ProvenanceRef> {
    if let Some(frame) = &record.frame {
        if !frame.provenance_refs().is_empty() {
            return frame.provenance_refs().to_vec();
        }
    }

    record
        .context
        .inputs()
        .unwrap_or_default()
        .into_iter()
        .map(|input| {
            if has_derivation(input) {
                ProvenanceRef::derived(input)
            } else {
                ProvenanceRef::given(input)
            }
        })
        .collect()
}

/// Trace the provenance of `entity_id`
///
/// An entity with no derivation record is a `GIVEN` root with no children.
///
/// # Errors
///
/// [`EoError::ProvenanceCycle`] when an entity is its own ancestor.
pub fn trace_provenance<S: RecordSource + ?Sized>(
    source: &S,
    entity_id: &str,
) -> Result<ProvenanceTree> {
    Tracer {
        source,
        derivations: HashMap::new(),
    }
    .trace(entity_id)
}

struct Tracer<'a, S: ?Sized> {
    source: &'a S,
    derivations: HashMap<String, Option<Arc<OperationRecord>>>,
}

/// A node whose inputs are still being visited
struct Pending {
    node: usize,
    inputs: Vec<ProvenanceRef>,
    next: usize,
}

impl<S: RecordSource + ?Sized> Tracer<'_, S> {
    fn derivation(&mut self, entity_id: &str) -> Option<Arc<OperationRecord>> {
        if let Some(found) = self.derivations.get(entity_id) {
            return found.clone();
        }
        let found = latest_derivation(self.source, entity_id);
        self.derivations
            .insert(entity_id.to_string(), found.clone());
        found
    }

    fn inputs(&mut self, record: &OperationRecord) -> Vec<ProvenanceRef> {
        classify_inputs(record, |input| self.derivation(input).is_some())
    }

    fn trace(mut self, entity_id: &str) -> Result<ProvenanceTree> {
        let Some(record) = self.derivation(entity_id) else {
            return Ok(ProvenanceTree::single(entity_id, EpistemicType::Given));
        };

        let mut nodes = vec![NodeData::derived(entity_id, &record)];
        let mut stack = vec![Pending {
            node: 0,
            inputs: self.inputs(&record),
            next: 0,
        }];
        let mut path = vec![entity_id.to_string()];
        let mut on_path = HashSet::from([entity_id.to_string()]);
        let mut expanded: HashMap<String, usize> = HashMap::new();

        while let Some(top) = stack.last_mut() {
            let Some(input) = top.inputs.get(top.next).cloned() else {
                let node = top.node;
                stack.pop();
                finish(&mut nodes, node);
                if let Some(id) = path.pop() {
                    on_path.remove(&id);
                    expanded.insert(id, node);
                }
                continue;
            };
            top.next += 1;
            let parent = top.node;

            if on_path.contains(&input.id) {
                let mut cycle = path.clone();
                cycle.push(input.id.clone());
                return Err(EoError::ProvenanceCycle {
                    entity_id: input.id,
                    path: cycle,
                });
            }

            let child = match input.epistemic_type {
                EpistemicType::Derived => match expanded.get(&input.id) {
                    Some(&done) => done,
                    None => match self.derivation(&input.id) {
                        Some(record) => {
                            let child = nodes.len();
                            nodes.push(NodeData::derived(input.id.as_str(), &record));
                            stack.push(Pending {
                                node: child,
                                inputs: self.inputs(&record),
                                next: 0,
                            });
                            on_path.insert(input.id.clone());
                            path.push(input.id);
                            child
                        }
                        None => push_leaf(&mut nodes, input.id, EpistemicType::Derived),
                    },
                },
                other => push_leaf(&mut nodes, input.id, other),
            };
            nodes[parent].children.push(child);
        }

        Ok(ProvenanceTree { nodes })
    }
}

fn push_leaf(nodes: &mut Vec<NodeData>, id: String, epistemic_type: EpistemicType) -> usize {
    nodes.push(NodeData::leaf(id, epistemic_type));
    nodes.len() - 1
}

/// Fill in depth and count once every child of `index` is final
fn finish(nodes: &mut [NodeData], index: usize) {
    let (depth, count) = nodes[index]
        .children
        .iter()
        .fold((0usize, 0usize), |(depth, count), &child| {
            (
                depth.max(nodes[child].depth),
                count.saturating_add(nodes[child].count),
            )
        });
    nodes[index].depth = depth + 1;
    nodes[index].count = count.saturating_add(1);
}
