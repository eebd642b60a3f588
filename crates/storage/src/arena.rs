//! Record arena: the published, immutable records of the log
//!
//! # Design
//!
//! - DashMap keyed by [`Sequence`]: sharded, lock-free reads
//! - FxHash: fast non-crypto hash for dense integer keys
//! - `Arc<OperationRecord>`: readers share records without copying
//!
//! A record is inserted here before any index references its sequence, so a
//! reader that finds a sequence in an index always finds the record.

use crate::{FxBuildHasher, SequencedRecord};
use dashmap::DashMap;
use eo_core::{OperationRecord, Sequence};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Published records by sequence number
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - get(): lock-free read via DashMap
/// - insert(): only locks the target shard
/// - next_sequence(): atomic increment
pub struct RecordArena {
    records: DashMap<Sequence, Arc<OperationRecord>, FxBuildHasher>,
    next: AtomicU64,
}

impl RecordArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            records: DashMap::with_hasher(FxBuildHasher::default()),
            next: AtomicU64::new(0),
        }
    }

    /// Create with expected number of records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
            next: AtomicU64::new(0),
        }
    }

    /// Allocate the next sequence number
    ///
    /// Sequences are strictly increasing. A sequence allocated for an append
    /// that is later rejected is never reused, so gaps are possible.
    #[inline]
    pub fn next_sequence(&self) -> Sequence {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Sequence the next allocation will return
    #[inline]
    pub fn peek_sequence(&self) -> Sequence {
        self.next.load(Ordering::Acquire)
    }

    /// Publish a record at `sequence`
    ///
    /// Returns `false` (and leaves the arena unchanged) if the slot is taken.
    pub fn insert(&self, sequence: Sequence, record: Arc<OperationRecord>) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.records.entry(sequence) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Look up a record by sequence
    #[inline]
    pub fn get(&self, sequence: Sequence) -> Option<Arc<OperationRecord>> {
        self.records.get(&sequence).map(|r| Arc::clone(r.value()))
    }

    /// Look up many sequences, skipping any not yet published
    pub fn get_many(&self, sequences: &[Sequence]) -> Vec<SequencedRecord> {
        sequences
            .iter()
            .filter_map(|&sequence| {
                self.get(sequence)
                    .map(|record| SequencedRecord { sequence, record })
            })
            .collect()
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record has been published
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All published records in append order
    ///
    /// O(n log n). Used for index rebuilds and statistics, not on the hot path.
    pub fn scan(&self) -> Vec<SequencedRecord> {
        let mut all: Vec<SequencedRecord> = self
            .records
            .iter()
            .map(|entry| SequencedRecord {
                sequence: *entry.key(),
                record: Arc::clone(entry.value()),
            })
            .collect();
        all.sort_by_key(|r| r.sequence);
        all
    }
}

impl Default for RecordArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordArena")
            .field("records", &self.len())
            .field("next_sequence", &self.peek_sequence())
            .finish()
    }
}
