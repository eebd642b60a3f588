//! Database: the owned operation log
//!
//! A `Database` owns everything one log needs: the record arena, the index
//! layer, the WAL writer, the timestamp clock and the projection cache. There
//! is no global state; any number of databases can coexist in one process.
//!
//! # Append Path
//!
//! ```text
//! append(draft):
//!   validate                  ← rejects before anything is touched
//!   ┌─ entity slot ──────────────────────────┐
//!   │ assign id / ts                         │  ← caller ts may not precede
//!   │ ┌─ WAL lock ─────────────────────┐     │    the entity's latest record
//!   │ │ allocate sequence              │     │
//!   │ │ reserve id (DuplicateId)       │     │
//!   │ │ write WAL frame                │     │  ← rolled back on failure
//!   │ └────────────────────────────────┘     │
//!   │ publish to arena                       │
//!   │ update indexes                         │  ← visible to readers from here
//!   └────────────────────────────────────────┘
//!   evict cached state
//! ```
//!
//! The entity slot serializes appends to one entity so its history is never
//! reordered by a late append. The WAL lock is the only point where appends
//! for unrelated entities serialize. Arena, indexes and slots are sharded
//! maps.
//!
//! # Reads
//!
//! Readers never take the WAL lock. They clone the current index handle and
//! fetch records from the arena, so they observe every record whose append
//! has returned, and never a partially published one.

use crate::cache::{CacheStats, ProjectionCache};
use crate::projection::{self, AuditEvent, OperatorPattern, RecordSource};
use crate::provenance::{self, ProvenanceTree};
use eo_core::{
    validate, EntityKey, EntityState, EoError, OperationRecord, Operator, RecordDraft, RecordId,
    Result, Sequence, Timestamp,
};
use eo_durability::{recover, DurabilityMode, RecoveryOptions, RecoveryResult, WalWriter, WAL_FILE_NAME};
use eo_storage::{
    sort_total_order, EntityClocks, IndexLayer, MonotonicClock, RecordArena, SequencedRecord,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Whether the database accepts appends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Appends allowed
    #[default]
    ReadWrite,
    /// Reads only; appends fail with `ReadOnly`
    ReadOnly,
}

impl AccessMode {
    /// Whether appends are rejected
    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessMode::ReadOnly)
    }
}

/// Builder for database configuration
///
/// # Example
///
/// ```ignore
/// // Disk-backed, fsync every append
/// let db = DatabaseBuilder::new().path("./eo-data").strict().open()?;
///
/// // Temp directory, no fsync
/// let db = DatabaseBuilder::new().no_durability().open_temp()?;
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    durability: DurabilityMode,
    access_mode: AccessMode,
    projection_cache: bool,
    recovery: RecoveryOptions,
}

impl DatabaseBuilder {
    /// Defaults: batched durability, read-write, cache on
    pub fn new() -> Self {
        Self {
            path: None,
            durability: DurabilityMode::default(),
            access_mode: AccessMode::ReadWrite,
            projection_cache: true,
            recovery: RecoveryOptions::default(),
        }
    }

    /// Data directory
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// No WAL; records live only in memory
    pub fn no_durability(self) -> Self {
        self.durability(DurabilityMode::None)
    }

    /// Batched fsync with default parameters
    pub fn buffered(self) -> Self {
        self.durability(DurabilityMode::buffered_default())
    }

    /// Batched fsync with custom parameters
    pub fn buffered_with(self, interval_ms: u64, batch_size: usize) -> Self {
        self.durability(DurabilityMode::Batched {
            interval_ms,
            batch_size,
        })
    }

    /// fsync every append
    pub fn strict(self) -> Self {
        self.durability(DurabilityMode::Strict)
    }

    /// Set the access mode
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Open read-only
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Enable or disable the projection cache
    pub fn projection_cache(mut self, enabled: bool) -> Self {
        self.projection_cache = enabled;
        self
    }

    /// WAL recovery options
    pub fn recovery(mut self, options: RecoveryOptions) -> Self {
        self.recovery = options;
        self
    }

    /// Open the database
    ///
    /// Uses the configured path, or a fresh temp directory if none is set.
    pub fn open(self) -> Result<Database> {
        match self.path.clone() {
            Some(path) => Database::open_at(&path, self),
            None => self.open_temp(),
        }
    }

    /// Open in a fresh directory under the system temp dir
    pub fn open_temp(self) -> Result<Database> {
        let dir = std::env::temp_dir().join(format!("eostore-{}", uuid::Uuid::new_v4()));
        Database::open_at(&dir, self)
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Log-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Published records
    pub records: usize,
    /// Distinct source tables
    pub tables: usize,
    /// Distinct `(table, id)` pairs
    pub entities: usize,
    /// Records per operator (operators with no records omitted)
    pub per_operator: BTreeMap<Operator, usize>,
}

/// Outcome of comparing live indexes against a fresh rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexVerification {
    /// Records scanned for the rebuild
    pub records_scanned: usize,
    /// Names of indexes that differ from the rebuild
    pub mismatched: Vec<&'static str>,
}

impl IndexVerification {
    /// Whether every index matched
    pub fn is_consistent(&self) -> bool {
        self.mismatched.is_empty()
    }
}

// ============================================================================
// Database
// ============================================================================

/// The operation log with its indexes, WAL and projections
pub struct Database {
    data_dir: Option<PathBuf>,
    durability_mode: DurabilityMode,
    access_mode: AccessMode,
    arena: RecordArena,
    indexes: RwLock<Arc<IndexLayer>>,
    wal: Option<Mutex<WalWriter>>,
    wal_failed: AtomicBool,
    closed: AtomicBool,
    clock: MonotonicClock,
    entity_clocks: EntityClocks,
    cache: Option<ProjectionCache>,
    recovery: Option<RecoveryResult>,
}

impl Database {
    /// Builder with default settings
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Open (or create) a database in `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        DatabaseBuilder::new().path(path).open()
    }

    /// In-memory database: no directory, no WAL
    pub fn ephemeral() -> Self {
        Self::in_memory(true)
    }

    /// Ephemeral database with the projection cache toggled
    pub fn ephemeral_with_cache(projection_cache: bool) -> Self {
        Self::in_memory(projection_cache)
    }

    fn in_memory(projection_cache: bool) -> Self {
        debug!("Opened ephemeral database");
        Self {
            data_dir: None,
            durability_mode: DurabilityMode::None,
            access_mode: AccessMode::ReadWrite,
            arena: RecordArena::new(),
            indexes: RwLock::new(Arc::new(IndexLayer::new())),
            wal: None,
            wal_failed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            clock: MonotonicClock::new(),
            entity_clocks: EntityClocks::new(),
            cache: projection_cache.then(ProjectionCache::new),
            recovery: None,
        }
    }

    fn open_at(dir: &Path, builder: DatabaseBuilder) -> Result<Self> {
        if !builder.access_mode.is_read_only() {
            std::fs::create_dir_all(dir)?;
        }

        let wal_path = dir.join(WAL_FILE_NAME);
        let (records, result) = recover(&wal_path, &builder.recovery)?;

        let clock = MonotonicClock::new();
        let entity_clocks = EntityClocks::new();
        let arena = RecordArena::with_capacity(records.len());
        for record in records {
            clock.observe(record.timestamp);
            entity_clocks.observe(&record.target.id, record.timestamp);
            arena.insert(arena.next_sequence(), Arc::new(record));
        }
        let indexes = IndexLayer::rebuild(&arena.scan());

        let wal = if builder.durability.requires_wal() && !builder.access_mode.is_read_only() {
            Some(Mutex::new(WalWriter::open(
                &wal_path,
                builder.durability,
                Some(result.valid_len),
            )?))
        } else {
            None
        };

        info!(
            path = %dir.display(),
            records = arena.len(),
            mode = %builder.durability,
            access = ?builder.access_mode,
            "Opened database"
        );

        Ok(Self {
            data_dir: Some(dir.to_path_buf()),
            durability_mode: builder.durability,
            access_mode: builder.access_mode,
            arena,
            indexes: RwLock::new(Arc::new(indexes)),
            wal,
            wal_failed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            clock,
            entity_clocks,
            cache: builder.projection_cache.then(ProjectionCache::new),
            recovery: Some(result),
        })
    }

    // ========================================================================
    // Append
    // ========================================================================

    /// Append a record
    ///
    /// Assigns `id` and `timestamp` when the draft leaves them empty. On
    /// success the record is persisted per the durability mode, indexed, and
    /// visible to every subsequent read.
    ///
    /// # Errors
    ///
    /// - `Validation`: nothing stored, indexes unchanged; includes a
    ///   caller timestamp older than the target entity's latest record
    /// - `DuplicateId`: caller-supplied id already in the log
    /// - `ReadOnly`: database opened read-only
    /// - `Io`/`Storage`: WAL write failed; the frame is rolled back and the
    ///   id reservation released
    pub fn append(&self, draft: RecordDraft) -> Result<RecordId> {
        if self.access_mode.is_read_only() {
            warn!(op = %draft.operator, target = %draft.target.id, "Append rejected: read-only");
            return Err(EoError::ReadOnly);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(EoError::Storage("database is closed".into()));
        }
        if self.wal_failed.load(Ordering::Acquire) {
            return Err(EoError::Storage(
                "WAL unavailable after a failed rollback; reopen to recover".into(),
            ));
        }

        validate(&draft)?;

        let id = draft.id.clone().unwrap_or_else(RecordId::new);
        let target = draft.target.id.clone();
        let requested = draft.timestamp;

        let (record, sequence) =
            self.entity_clocks
                .stamp(&target, requested, &self.clock, |timestamp| {
                    let record = Arc::new(draft.into_record(id.clone(), timestamp));
                    let sequence = self.publish(&record)?;
                    Ok((record, sequence))
                })?;

        if let Some(cache) = &self.cache {
            cache.invalidate(&record.target.id);
        }

        debug!(
            record_id = %id,
            op = %record.operator,
            table = record.source_table().unwrap_or("-"),
            target = %record.target.id,
            seq = sequence,
            "Appended record"
        );

        Ok(id)
    }

    /// Reserve the id, write the WAL frame, then publish and index
    fn publish(&self, record: &Arc<OperationRecord>) -> Result<Sequence> {
        let id = &record.id;

        // Held until the record is indexed so a concurrent rebuild cannot
        // miss it.
        let indexes = self.indexes.read();

        let sequence = match &self.wal {
            Some(wal) => {
                let mut wal = wal.lock();
                let sequence = self.arena.next_sequence();
                if !indexes.reserve_id(id, sequence) {
                    return Err(EoError::DuplicateId(id.clone()));
                }
                if let Err(e) = wal.append(record) {
                    indexes.release_id(id, sequence);
                    if wal.is_poisoned() {
                        self.wal_failed.store(true, Ordering::Release);
                    }
                    error!(record_id = %id, error = %e, poisoned = wal.is_poisoned(), "WAL write failed");
                    return Err(e);
                }
                sequence
            }
            None => {
                let sequence = self.arena.next_sequence();
                if !indexes.reserve_id(id, sequence) {
                    return Err(EoError::DuplicateId(id.clone()));
                }
                sequence
            }
        };

        if !self.arena.insert(sequence, Arc::clone(record)) {
            indexes.release_id(id, sequence);
            return Err(EoError::Storage(format!(
                "sequence {} already published",
                sequence
            )));
        }
        indexes.insert(sequence, record);
        Ok(sequence)
    }

    /// Decode a candidate from JSON and append it
    ///
    /// An unknown `op` is a validation error; the log is untouched.
    pub fn append_json(&self, json: &str) -> Result<RecordId> {
        self.append(RecordDraft::from_json(json)?)
    }

    // ========================================================================
    // Projections
    // ========================================================================

    /// Current field state of `entity_id`
    pub fn reconstruct_state(&self, entity_id: &str) -> EntityState {
        let Some(cache) = &self.cache else {
            return projection::reconstruct_state(self, entity_id);
        };

        let count = self.index().target_count(entity_id);
        if let Some(hit) = cache.get(entity_id, count) {
            return (*hit).clone();
        }

        let records = self.records_for_target(entity_id);
        let state = projection::fold_state(records.iter().map(|r| r.record.as_ref()));
        cache.put(entity_id, records.len(), Arc::new(state.clone()));
        state
    }

    /// Current field state of `(table, id)`
    pub fn reconstruct_state_in(&self, table: &str, entity_id: &str) -> EntityState {
        projection::reconstruct_state_in(self, table, entity_id)
    }

    /// Field state of `entity_id` as of `as_of`, inclusive
    pub fn reconstruct_state_at(&self, entity_id: &str, as_of: Timestamp) -> EntityState {
        projection::reconstruct_state_at(self, entity_id, as_of)
    }

    /// Entities linked to `entity_id` by CON records
    pub fn connections(&self, entity_id: &str) -> BTreeSet<String> {
        projection::connections(self, entity_id)
    }

    /// Every record targeting `entity_id`, in total order
    pub fn audit_trail(&self, entity_id: &str) -> Vec<AuditEvent> {
        projection::audit_trail(self, entity_id)
    }

    /// Operator sequence of the audit trail
    pub fn operator_pattern(&self, entity_id: &str) -> OperatorPattern {
        projection::operator_pattern(self, entity_id)
    }

    /// Provenance tree of `entity_id`
    pub fn trace_provenance(&self, entity_id: &str) -> Result<ProvenanceTree> {
        provenance::trace_provenance(self, entity_id)
    }

    // ========================================================================
    // Record reads
    // ========================================================================

    /// Record by id
    pub fn get(&self, id: &RecordId) -> Option<Arc<OperationRecord>> {
        let sequence = self.index().sequence_of(id)?;
        self.arena.get(sequence)
    }

    /// Records of `(table, id)` in total order
    pub fn entity_history(&self, table: &str, entity_id: &str) -> Vec<Arc<OperationRecord>> {
        self.records_for_entity(&EntityKey::new(table, entity_id))
            .into_iter()
            .map(|r| r.record)
            .collect()
    }

    /// Page of `table`'s records in total order
    ///
    /// `offset` skips that many records; `limit` of `None` returns the rest.
    pub fn table_records(
        &self,
        table: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Arc<OperationRecord>> {
        let sequences = self.index().table(table);
        let records = self.fetch_ordered(&sequences);
        records
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.record)
            .collect()
    }

    /// Distinct source tables, sorted
    pub fn tables(&self) -> Vec<String> {
        self.index().tables()
    }

    /// All records in append order
    pub fn scan(&self) -> Vec<SequencedRecord> {
        self.arena.scan()
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Log-wide counts
    pub fn stats(&self) -> StoreStats {
        let index = self.index();
        let mut per_operator = BTreeMap::new();
        for entry in self.arena.scan() {
            *per_operator.entry(entry.record.operator).or_insert(0) += 1;
        }
        StoreStats {
            records: self.arena.len(),
            tables: index.table_count(),
            entities: index.entity_count(),
            per_operator,
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Replace every index with a rebuild from a full scan
    pub fn rebuild_indexes(&self) {
        let mut guard = self.indexes.write();
        let records = self.arena.scan();
        *guard = Arc::new(IndexLayer::rebuild(&records));
        drop(guard);

        if let Some(cache) = &self.cache {
            cache.clear();
        }
        info!(records = records.len(), "Rebuilt indexes");
    }

    /// Compare live indexes against a fresh rebuild
    ///
    /// Blocks appends for the duration of the comparison.
    pub fn verify_indexes(&self) -> IndexVerification {
        let guard = self.indexes.write();
        let records = self.arena.scan();
        let fresh = IndexLayer::rebuild(&records).snapshot();
        let live = guard.snapshot();
        drop(guard);

        let mut mismatched = Vec::new();
        if live.by_entity != fresh.by_entity {
            mismatched.push("by_entity");
        }
        if live.by_table != fresh.by_table {
            mismatched.push("by_table");
        }
        if live.by_target != fresh.by_target {
            mismatched.push("by_target");
        }
        if live.by_link != fresh.by_link {
            mismatched.push("by_link");
        }
        if live.by_id != fresh.by_id {
            mismatched.push("by_id");
        }

        if !mismatched.is_empty() {
            warn!(?mismatched, "Index verification failed");
        }

        IndexVerification {
            records_scanned: records.len(),
            mismatched,
        }
    }

    /// Force pending WAL frames to disk
    pub fn flush(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        Ok(())
    }

    /// Flush and stop accepting appends
    pub fn shutdown(&self) -> Result<()> {
        self.flush()?;
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(records = self.arena.len(), "Closed database");
        }
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Data directory, if disk-backed
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Durability mode
    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    /// Access mode
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Whether this database has no directory
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Result of the WAL replay performed at open
    pub fn recovery_result(&self) -> Option<&RecoveryResult> {
        self.recovery.as_ref()
    }

    /// Projection cache counters, if the cache is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ProjectionCache::stats)
    }

    /// Highest timestamp assigned or observed
    pub fn last_timestamp(&self) -> Timestamp {
        self.clock.last()
    }

    /// Sequence the next append will receive
    pub fn next_sequence(&self) -> Sequence {
        self.arena.peek_sequence()
    }

    fn index(&self) -> Arc<IndexLayer> {
        self.indexes.read().clone()
    }

    fn fetch_ordered(&self, sequences: &[Sequence]) -> Vec<SequencedRecord> {
        let mut records = self.arena.get_many(sequences);
        sort_total_order(&mut records);
        records
    }
}

impl RecordSource for Database {
    fn records_for_target(&self, entity_id: &str) -> Vec<SequencedRecord> {
        self.fetch_ordered(&self.index().target(entity_id))
    }

    fn records_for_entity(&self, key: &EntityKey) -> Vec<SequencedRecord> {
        self.fetch_ordered(&self.index().entity(key))
    }

    fn links_for(&self, entity_id: &str) -> Vec<SequencedRecord> {
        self.fetch_ordered(&self.index().links(entity_id))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("durability_mode", &self.durability_mode)
            .field("access_mode", &self.access_mode)
            .field("records", &self.arena.len())
            .finish()
    }
}
