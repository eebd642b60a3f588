//! Projection cache for reconstructed entity state
//!
//! Entries are keyed by entity id and stamped with the number of records the
//! entity had when the state was computed. A lookup only hits when the
//! caller's current count matches, so a racing append can never be masked by
//! a stale entry. Appends also evict the entries they touch.

use dashmap::DashMap;
use eo_core::EntityState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CachedState {
    record_count: usize,
    state: Arc<EntityState>,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that had to replay
    pub misses: u64,
    /// Cached entities
    pub entries: usize,
}

/// Per-entity cache of reconstructed state
#[derive(Debug, Default)]
pub struct ProjectionCache {
    entries: DashMap<String, CachedState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProjectionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached state of `entity_id`, if computed over exactly `record_count` records
    pub fn get(&self, entity_id: &str, record_count: usize) -> Option<Arc<EntityState>> {
        let hit = self
            .entries
            .get(entity_id)
            .filter(|cached| cached.record_count == record_count)
            .map(|cached| Arc::clone(&cached.state));

        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Store the state computed over `record_count` records
    ///
    /// Never replaces an entry computed over more records.
    pub fn put(&self, entity_id: &str, record_count: usize, state: Arc<EntityState>) {
        let mut entry = self
            .entries
            .entry(entity_id.to_string())
            .or_insert_with(|| CachedState {
                record_count,
                state: Arc::clone(&state),
            });
        if record_count >= entry.record_count {
            *entry = CachedState {
                record_count,
                state,
            };
        }
    }

    /// Evict `entity_id`
    pub fn invalidate(&self, entity_id: &str) {
        self.entries.remove(entity_id);
    }

    /// Evict everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
