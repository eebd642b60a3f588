//! Durability mode for WAL writes
//!
//! Controls when appended records are fsynced to disk.

/// Durability mode for WAL writes
///
/// # Mode Comparison
///
/// | Mode | fsync | On crash |
/// |------|-------|----------|
/// | None | never, no file | everything lost |
/// | Batched | every N appends or T ms | at most one batch lost |
/// | Strict | every append | nothing acknowledged is lost |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// In-memory only
    ///
    /// No WAL file is created. Use for tests and scratch stores.
    None,

    /// fsync after every append
    ///
    /// `append` returns only after the record is on stable storage.
    Strict,

    /// fsync every `batch_size` appends OR once `interval_ms` has elapsed
    ///
    /// Records are written to the file immediately; only the fsync is
    /// deferred. The interval is checked on append, and `flush`/`close`
    /// always sync.
    Batched {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum appends between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Whether this mode writes a WAL at all
    pub fn requires_wal(&self) -> bool {
        !matches!(self, DurabilityMode::None)
    }

    /// Whether every append is fsynced before returning
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Strict)
    }

    /// `Batched { interval_ms: 100, batch_size: 1000 }`
    pub fn buffered_default() -> Self {
        DurabilityMode::Batched {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::buffered_default()
    }
}

impl std::fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurabilityMode::None => f.write_str("none"),
            DurabilityMode::Strict => f.write_str("strict"),
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => write!(f, "batched({}ms, {})", interval_ms, batch_size),
        }
    }
}
