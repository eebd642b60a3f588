//! Main store entry point for EO Store.
//!
//! This module provides the `EoStore` struct, the primary entry point for
//! appending operation records and querying their projections.

use crate::error::{Error, Result};
use crate::types::{
    AccessMode, AuditEvent, CacheStats, DurabilityMode, EntityState, IndexVerification,
    OperationRecord, OperatorPattern, ProvenanceTree, RecordDraft, RecordId, RecoveryOptions,
    RecoveryResult, StoreStats, Timestamp,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// The EO operation store.
///
/// An append-only log of operation records with replay-derived state,
/// relationships, audit trails and provenance. Create one with
/// [`EoStore::open`], [`EoStore::ephemeral`] or [`EoStore::builder`].
///
/// Cloning is cheap and shares the same underlying log, so a store can be
/// handed to many threads.
///
/// # Example
///
/// ```ignore
/// use eostore::prelude::*;
///
/// let store = EoStore::open("./eo-data")?;
///
/// store.append(RecordDraft::ins(
///     "organizations",
///     "org_1",
///     json!({"name": "A", "status": "draft"}).as_object().cloned().unwrap(),
/// ))?;
/// store.append(RecordDraft::alt("organizations", "org_1", "status", "draft", "verified"))?;
///
/// let state = store.reconstruct_state("org_1");
/// assert_eq!(state["status"], json!("verified"));
///
/// store.close()?;
/// ```
#[derive(Clone)]
pub struct EoStore {
    inner: Arc<eo_engine::Database>,
}

impl EoStore {
    /// Open a store at the given directory.
    ///
    /// Uses default settings (batched durability, projection cache on).
    /// Any existing WAL in the directory is replayed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Create an ephemeral store with no disk I/O.
    ///
    /// No directory and no WAL; all records are lost when the last clone is
    /// dropped. Use for tests and scratch computations.
    ///
    /// # Comparison
    ///
    /// | Method | Disk Files | Recovery |
    /// |--------|------------|----------|
    /// | `EoStore::ephemeral()` | None | No |
    /// | `EoStore::builder().open_temp()` | Temp dir | Yes |
    /// | `EoStore::open(path)` | User dir | Yes |
    ///
    /// Never fails; it returns `Result` like the other constructors.
    pub fn ephemeral() -> Result<Self> {
        Ok(Self::from_engine(eo_engine::Database::ephemeral()))
    }

    /// Create a builder for store configuration.
    pub fn builder() -> EoStoreBuilder {
        EoStoreBuilder::new()
    }

    fn from_engine(db: eo_engine::Database) -> Self {
        Self {
            inner: Arc::new(db),
        }
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Append a record.
    ///
    /// The sole write entry point. Assigns `id` and `ts` when absent. On
    /// success the record is durable per the configured mode and visible to
    /// every subsequent read.
    pub fn append(&self, draft: RecordDraft) -> Result<RecordId> {
        self.inner.append(draft).map_err(Error::from)
    }

    /// Append a record given in its JSON wire shape.
    ///
    /// An `op` outside the nine operators is a validation error.
    pub fn append_json(&self, json: &str) -> Result<RecordId> {
        self.inner.append_json(json).map_err(Error::from)
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// Current field state of an entity, folded over all its records.
    ///
    /// Unknown and nulled entities yield an empty map.
    pub fn reconstruct_state(&self, entity_id: &str) -> EntityState {
        self.inner.reconstruct_state(entity_id)
    }

    /// Current field state of an entity within one table.
    pub fn reconstruct_state_in(&self, table: &str, entity_id: &str) -> EntityState {
        self.inner.reconstruct_state_in(table, entity_id)
    }

    /// Field state of an entity as of a timestamp (inclusive).
    pub fn reconstruct_state_at(&self, entity_id: &str, as_of: Timestamp) -> EntityState {
        self.inner.reconstruct_state_at(entity_id, as_of)
    }

    /// Entities linked to `entity_id` by CON records, either direction.
    pub fn connections(&self, entity_id: &str) -> BTreeSet<String> {
        self.inner.connections(entity_id)
    }

    /// Every record of an entity in total order, NUL and later included.
    pub fn audit_trail(&self, entity_id: &str) -> Vec<AuditEvent> {
        self.inner.audit_trail(entity_id)
    }

    /// Operator sequence of an entity's audit trail.
    pub fn operator_pattern(&self, entity_id: &str) -> OperatorPattern {
        self.inner.operator_pattern(entity_id)
    }

    /// Provenance tree of an entity.
    ///
    /// Fails with [`Error::ProvenanceCycle`] if the entity is its own
    /// ancestor.
    pub fn trace_provenance(&self, entity_id: &str) -> Result<ProvenanceTree> {
        self.inner.trace_provenance(entity_id).map_err(Error::from)
    }

    // =========================================================================
    // Record reads
    // =========================================================================

    /// Look up a record by id.
    pub fn get(&self, id: &RecordId) -> Option<Arc<OperationRecord>> {
        self.inner.get(id)
    }

    /// Records of `(table, entity_id)` in total order.
    pub fn entity_history(&self, table: &str, entity_id: &str) -> Vec<Arc<OperationRecord>> {
        self.inner.entity_history(table, entity_id)
    }

    /// Page through a table's records in total order.
    ///
    /// 1. First page: `table_records("orgs", 0, Some(100))`
    /// 2. Next page: `table_records("orgs", 100, Some(100))`
    pub fn table_records(
        &self,
        table: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Arc<OperationRecord>> {
        self.inner.table_records(table, offset, limit)
    }

    /// Distinct source tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.inner.tables()
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Log-wide counts.
    pub fn stats(&self) -> StoreStats {
        self.inner.stats()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuild every index from a full scan of the log.
    pub fn rebuild_indexes(&self) {
        self.inner.rebuild_indexes()
    }

    /// Compare the live indexes against a fresh rebuild.
    pub fn verify_indexes(&self) -> IndexVerification {
        self.inner.verify_indexes()
    }

    /// Force pending WAL frames to disk.
    ///
    /// In batched mode fsyncs are deferred; call `flush()` to make every
    /// acknowledged append durable now.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush().map_err(Error::from)
    }

    /// Gracefully close the store.
    ///
    /// Flushes the WAL. Later appends fail; reads keep working.
    pub fn close(&self) -> Result<()> {
        self.inner.shutdown().map_err(Error::from)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Data directory, or `None` for an ephemeral store.
    pub fn path(&self) -> Option<&Path> {
        self.inner.data_dir()
    }

    /// Current durability mode.
    pub fn durability_mode(&self) -> DurabilityMode {
        self.inner.durability_mode()
    }

    /// Current access mode.
    pub fn access_mode(&self) -> AccessMode {
        self.inner.access_mode()
    }

    /// Check if this is an ephemeral (no-disk) store.
    pub fn is_ephemeral(&self) -> bool {
        self.inner.is_ephemeral()
    }

    /// Statistics of the WAL replay performed at open.
    pub fn recovery_result(&self) -> Option<&RecoveryResult> {
        self.inner.recovery_result()
    }

    /// Projection cache counters, if the cache is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache_stats()
    }

    /// The engine database, for use with [`crate::RecordSource`]
    /// based projections.
    pub fn database(&self) -> &eo_engine::Database {
        &self.inner
    }
}

impl std::fmt::Debug for EoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EoStore").field("inner", &self.inner).finish()
    }
}

/// Builder for store configuration.
///
/// # Example
///
/// ```ignore
/// // Production: disk-backed, fsync every append
/// let store = EoStore::builder()
///     .path("./eo-data")
///     .strict()
///     .open()?;
///
/// // Integration testing: temp directory, no WAL
/// let store = EoStore::builder()
///     .no_durability()
///     .open_temp()?;
///
/// // Unit testing: truly ephemeral (no disk at all)
/// let store = EoStore::ephemeral()?;
/// ```
pub struct EoStoreBuilder {
    inner: eo_engine::DatabaseBuilder,
}

impl EoStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            inner: eo_engine::DatabaseBuilder::new(),
        }
    }

    /// Set the data directory.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.inner = self.inner.path(path);
        self
    }

    /// Use no-durability mode: no WAL is written.
    pub fn no_durability(mut self) -> Self {
        self.inner = self.inner.no_durability();
        self
    }

    /// Use buffered mode (default).
    ///
    /// Default fsync cadence: every 100ms or 1000 appends.
    pub fn buffered(mut self) -> Self {
        self.inner = self.inner.buffered();
        self
    }

    /// Use buffered mode with custom parameters.
    ///
    /// # Arguments
    ///
    /// * `flush_interval_ms` - Maximum time between fsyncs
    /// * `max_pending_writes` - Maximum appends before forced fsync
    pub fn buffered_with(mut self, flush_interval_ms: u64, max_pending_writes: usize) -> Self {
        self.inner = self.inner.buffered_with(flush_interval_ms, max_pending_writes);
        self
    }

    /// Use strict mode: fsync on every append.
    pub fn strict(mut self) -> Self {
        self.inner = self.inner.strict();
        self
    }

    /// Set the durability mode directly.
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.inner = self.inner.durability(mode);
        self
    }

    /// Open read-only: the WAL is replayed, appends fail with `ReadOnly`.
    pub fn read_only(mut self) -> Self {
        self.inner = self.inner.read_only();
        self
    }

    /// Enable or disable the projection cache (on by default).
    pub fn projection_cache(mut self, enabled: bool) -> Self {
        self.inner = self.inner.projection_cache(enabled);
        self
    }

    /// Set WAL recovery options.
    pub fn recovery(mut self, options: RecoveryOptions) -> Self {
        self.inner = self.inner.recovery(options);
        self
    }

    /// Open the store.
    ///
    /// Uses the configured path, or a temp directory if none set.
    pub fn open(self) -> Result<EoStore> {
        let db = self.inner.open().map_err(Error::from)?;
        Ok(EoStore::from_engine(db))
    }

    /// Open a store in a fresh temporary directory.
    pub fn open_temp(self) -> Result<EoStore> {
        let db = self.inner.open_temp().map_err(Error::from)?;
        Ok(EoStore::from_engine(db))
    }
}

impl Default for EoStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
