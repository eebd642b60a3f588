//! In-memory storage for the EO operation log
//!
//! This crate holds the published state of the log:
//! - [`RecordArena`]: records by append sequence, lock-free reads
//! - [`IndexLayer`]: per-entity, per-table, per-target and link indexes
//! - [`MonotonicClock`]: non-decreasing timestamp source
//! - [`EntityClocks`]: per-entity timestamp order for appends
//!
//! Nothing here persists; the engine crate sequences appends
//! and the durability crate writes them to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod clock;
pub mod index;

use eo_core::{OperationRecord, Sequence, Timestamp};
use std::sync::Arc;

pub use arena::RecordArena;
pub use clock::{EntityClocks, MonotonicClock};
pub use index::{IndexLayer, IndexSnapshot, SeqList};

/// FxHash for dense integer keys
pub(crate) type FxBuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// A published record together with its append position
#[derive(Debug, Clone)]
pub struct SequencedRecord {
    /// Append position
    pub sequence: Sequence,
    /// The record
    pub record: Arc<OperationRecord>,
}

impl SequencedRecord {
    /// Total-order key: `(timestamp, sequence)`
    #[inline]
    pub fn order_key(&self) -> (Timestamp, Sequence) {
        (self.record.timestamp, self.sequence)
    }
}

/// Sort into the log's total order: timestamp, then append sequence
pub fn sort_total_order(records: &mut [SequencedRecord]) {
    records.sort_by_key(SequencedRecord::order_key);
}
