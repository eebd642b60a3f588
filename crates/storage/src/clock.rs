//! Timestamp sources
//!
//! [`MonotonicClock`] assigns timestamps. [`EntityClocks`] keeps each
//! entity's history append-ordered: a record is stamped and published while
//! its entity's slot is held, and a caller-supplied timestamp older than the
//! entity's latest record is rejected.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eo_core::{EoError, Result, Timestamp, ValidationError};
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out non-decreasing timestamps
///
/// Wall-clock time can step backwards; `tick` never does. Timestamps observed
/// during recovery or supplied by callers raise the floor so later assigned
/// timestamps do not sort before them.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// Create a clock with floor at the epoch
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp: `max(now, last)`
    pub fn tick(&self) -> Timestamp {
        let now = Timestamp::now().as_millis();
        let prev = self.last.fetch_max(now, Ordering::AcqRel);
        Timestamp::from_millis(prev.max(now))
    }

    /// Raise the floor to at least `ts`
    pub fn observe(&self, ts: Timestamp) {
        self.last.fetch_max(ts.as_millis(), Ordering::AcqRel);
    }

    /// Highest timestamp handed out or observed
    pub fn last(&self) -> Timestamp {
        Timestamp::from_millis(self.last.load(Ordering::Acquire))
    }
}

/// Latest timestamp per target entity
///
/// Slots are DashMap entries, so stamping one entity only contends with
/// entities in the same shard.
#[derive(Debug, Default)]
pub struct EntityClocks {
    latest: DashMap<String, Timestamp>,
}

impl EntityClocks {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `entity_id`'s latest timestamp to at least `ts`
    pub fn observe(&self, entity_id: &str, ts: Timestamp) {
        let mut slot = self.latest.entry(entity_id.to_string()).or_insert(ts);
        if *slot < ts {
            *slot = ts;
        }
    }

    /// Latest timestamp recorded for `entity_id`
    pub fn latest(&self, entity_id: &str) -> Option<Timestamp> {
        self.latest.get(entity_id).map(|ts| *ts)
    }

    /// Stamp one record of `entity_id` and publish it with the slot held
    ///
    /// `requested` is the caller's timestamp; when absent one is taken from
    /// `clock`, which is never below a timestamp it has observed. The slot
    /// advances only if `publish` succeeds.
    ///
    /// # Errors
    ///
    /// `Validation(TimestampRegression)` when `requested` precedes the
    /// entity's latest timestamp; otherwise whatever `publish` returns.
    pub fn stamp<T>(
        &self,
        entity_id: &str,
        requested: Option<Timestamp>,
        clock: &MonotonicClock,
        publish: impl FnOnce(Timestamp) -> Result<T>,
    ) -> Result<T> {
        let entry = self.latest.entry(entity_id.to_string());
        let latest = match &entry {
            Entry::Occupied(slot) => Some(*slot.get()),
            Entry::Vacant(_) => None,
        };

        let ts = match (requested, latest) {
            (Some(ts), Some(latest)) if ts < latest => {
                return Err(EoError::Validation(ValidationError::TimestampRegression {
                    entity_id: entity_id.to_string(),
                    ts,
                    latest,
                }));
            }
            (Some(ts), _) => {
                clock.observe(ts);
                ts
            }
            (None, _) => clock.tick(),
        };

        let out = publish(ts)?;
        match entry {
            Entry::Occupied(mut slot) => {
                slot.insert(ts);
            }
            Entry::Vacant(slot) => {
                slot.insert(ts);
            }
        }
        Ok(out)
    }

    /// Number of entities with a recorded timestamp
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Whether no entity has been stamped
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
