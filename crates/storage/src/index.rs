//! Index layer: derived projections of the log maintained on append
//!
//! Five sharded maps, all append-only:
//!
//! | Index | Key | Value |
//! |-------|-----|-------|
//! | `by_entity` | `(source_table, entity_id)` | sequences targeting it |
//! | `by_table` | `source_table` | sequences in the table |
//! | `by_target` | `entity_id` | sequences targeting it, any table |
//! | `by_link` | `entity_id` | CON sequences naming it on either side |
//! | `by_id` | `RecordId` | its sequence |
//!
//! Sequence lists are kept ascending. Every index can be rebuilt from a full
//! scan of the arena, which is also how indexes are restored after recovery.

use crate::SequencedRecord;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eo_core::{EntityKey, OperationRecord, Operator, RecordId, Sequence};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Most entities have a handful of records; keep those inline.
pub type SeqList = SmallVec<[Sequence; 8]>;

/// Incrementally maintained record indexes
#[derive(Default)]
pub struct IndexLayer {
    by_entity: DashMap<EntityKey, SeqList>,
    by_table: DashMap<String, SeqList>,
    by_target: DashMap<String, SeqList>,
    by_link: DashMap<String, SeqList>,
    by_id: DashMap<RecordId, Sequence>,
}

impl IndexLayer {
    /// Create empty indexes
    pub fn new() -> Self {
        Self::default()
    }

    /// Build indexes from a full scan of published records
    pub fn rebuild(records: &[SequencedRecord]) -> Self {
        let index = Self::new();
        for entry in records {
            index.by_id.insert(entry.record.id.clone(), entry.sequence);
            index.insert(entry.sequence, &entry.record);
        }
        tracing::debug!(
            records = records.len(),
            entities = index.entity_count(),
            tables = index.table_count(),
            "Rebuilt indexes"
        );
        index
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Claim `id` for `sequence`
    ///
    /// Returns `false` if the id is already taken; the index is unchanged.
    pub fn reserve_id(&self, id: &RecordId, sequence: Sequence) -> bool {
        match self.by_id.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(sequence);
                true
            }
        }
    }

    /// Undo a reservation whose append failed before publication
    pub fn release_id(&self, id: &RecordId, sequence: Sequence) {
        self.by_id.remove_if(id, |_, &reserved| reserved == sequence);
    }

    /// Index a published record
    pub fn insert(&self, sequence: Sequence, record: &OperationRecord) {
        insert_sorted(
            &mut self.by_entity.entry(record.entity_key()).or_default(),
            sequence,
        );

        if let Some(table) = record.source_table() {
            insert_sorted(
                &mut self.by_table.entry(table.to_string()).or_default(),
                sequence,
            );
        }

        insert_sorted(
            &mut self.by_target.entry(record.target.id.clone()).or_default(),
            sequence,
        );

        if record.operator == Operator::Con {
            insert_sorted(
                &mut self.by_link.entry(record.target.id.clone()).or_default(),
                sequence,
            );
            if let Some(related) = record.context.related() {
                if related != record.target.id {
                    insert_sorted(
                        &mut self.by_link.entry(related.to_string()).or_default(),
                        sequence,
                    );
                }
            }
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Sequences addressing `(table, id)`
    pub fn entity(&self, key: &EntityKey) -> Vec<Sequence> {
        self.by_entity
            .get(key)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Sequences in `table`
    pub fn table(&self, table: &str) -> Vec<Sequence> {
        self.by_table
            .get(table)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Sequences whose `target.id` is `id`, across all tables
    pub fn target(&self, id: &str) -> Vec<Sequence> {
        self.by_target
            .get(id)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Number of records targeting `id`
    pub fn target_count(&self, id: &str) -> usize {
        self.by_target.get(id).map_or(0, |list| list.len())
    }

    /// CON sequences naming `id` on either side
    pub fn links(&self, id: &str) -> Vec<Sequence> {
        self.by_link
            .get(id)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    /// Sequence of a record id, if reserved
    pub fn sequence_of(&self, id: &RecordId) -> Option<Sequence> {
        self.by_id.get(id).map(|s| *s)
    }

    /// Distinct source tables, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.by_table.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }

    /// Number of distinct `(table, id)` pairs
    pub fn entity_count(&self) -> usize {
        self.by_entity.len()
    }

    /// Number of distinct tables
    pub fn table_count(&self) -> usize {
        self.by_table.len()
    }

    /// Ordered copy of every index, for comparison and verification
    pub fn snapshot(&self) -> IndexSnapshot {
        fn collect<K: Ord + Clone + std::hash::Hash + Eq>(
            map: &DashMap<K, SeqList>,
        ) -> BTreeMap<K, Vec<Sequence>> {
            map.iter()
                .map(|e| (e.key().clone(), e.value().to_vec()))
                .collect()
        }

        IndexSnapshot {
            by_entity: collect(&self.by_entity),
            by_table: collect(&self.by_table),
            by_target: collect(&self.by_target),
            by_link: collect(&self.by_link),
            by_id: self.by_id.iter().map(|e| (e.key().clone(), *e.value())).collect(),
        }
    }
}

impl std::fmt::Debug for IndexLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLayer")
            .field("entities", &self.entity_count())
            .field("tables", &self.table_count())
            .field("ids", &self.by_id.len())
            .finish()
    }
}

/// Point-in-time ordered copy of the index layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSnapshot {
    /// `(table, id)` to sequences
    pub by_entity: BTreeMap<EntityKey, Vec<Sequence>>,
    /// table to sequences
    pub by_table: BTreeMap<String, Vec<Sequence>>,
    /// entity id to sequences
    pub by_target: BTreeMap<String, Vec<Sequence>>,
    /// entity id to CON sequences
    pub by_link: BTreeMap<String, Vec<Sequence>>,
    /// record id to sequence
    pub by_id: BTreeMap<RecordId, Sequence>,
}

/// Insert keeping the list ascending; O(1) for in-order appends
fn insert_sorted(list: &mut SeqList, sequence: Sequence) {
    match list.last() {
        Some(&last) if last > sequence => {
            let pos = list.partition_point(|&s| s < sequence);
            list.insert(pos, sequence);
        }
        _ => list.push(sequence),
    }
}
