//! Crash recovery by WAL replay
//!
//! ## Recovery Sequence
//!
//! 1. Read the WAL image and split it into frames
//! 2. Stop at a torn tail; skip frames with a bad checksum or an impossible
//!    header
//! 3. Decode each payload and re-validate it against the operator taxonomy
//! 4. Skip records that fail validation or repeat an earlier id
//!
//! The recovered records are a prefix of the acknowledged history, in append
//! order. Rebuilding indexes from them is the engine's job.
//!
//! ## Usage
//!
//! ```ignore
//! let (records, result) = recover(&dir.join(WAL_FILE_NAME), &RecoveryOptions::default())?;
//! println!("{}", result.summary());
//! ```

use crate::wal::scan_frames;
use eo_core::{validate_record, EoError, OperationRecord, RecordId};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Recovery Options
// ============================================================================

/// Recovery options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Maximum checksum-corrupt frames to tolerate before failing
    pub max_corrupt_entries: usize,
    /// Log every skipped record at `warn` level
    pub verbose: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 10,
            verbose: false,
        }
    }
}

impl RecoveryOptions {
    /// Fail on any corrupt frame
    pub fn strict() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 0,
            verbose: true,
        }
    }

    /// Tolerate more corruption
    pub fn permissive() -> Self {
        RecoveryOptions {
            max_corrupt_entries: 100,
            verbose: false,
        }
    }
}

// ============================================================================
// Recovery Result
// ============================================================================

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Records restored
    pub records_recovered: u64,
    /// Frames with a bad checksum
    pub corrupt_entries_skipped: u64,
    /// Frames that decoded but failed validation
    pub invalid_records_skipped: u64,
    /// Frames repeating an earlier record id
    pub duplicate_records_skipped: u64,
    /// Bytes of incomplete trailing frame
    pub torn_tail_bytes: u64,
    /// Length of the WAL prefix made of complete frames
    pub valid_len: u64,
    /// Total recovery time (microseconds)
    pub recovery_time_micros: u64,
}

impl RecoveryResult {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Recovery complete: {} records, {} corrupt, {} invalid, {} duplicate, {} torn bytes, {:.2}ms",
            self.records_recovered,
            self.corrupt_entries_skipped,
            self.invalid_records_skipped,
            self.duplicate_records_skipped,
            self.torn_tail_bytes,
            self.recovery_time_micros as f64 / 1000.0,
        )
    }

    /// Whether anything was skipped or truncated
    pub fn has_issues(&self) -> bool {
        self.corrupt_entries_skipped > 0
            || self.invalid_records_skipped > 0
            || self.duplicate_records_skipped > 0
            || self.torn_tail_bytes > 0
    }
}

// ============================================================================
// Recovery Error
// ============================================================================

/// Recovery errors
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Too many corrupt frames
    #[error("Too many corrupt entries: {0} (max allowed: {1})")]
    TooManyCorruptEntries(u64, usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RecoveryError> for EoError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::TooManyCorruptEntries(..) => EoError::Corruption(e.to_string()),
            RecoveryError::Io(io) => EoError::Io(io),
        }
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Replay the WAL at `wal_path`
///
/// A missing file recovers to an empty log.
pub fn recover(
    wal_path: &Path,
    options: &RecoveryOptions,
) -> Result<(Vec<OperationRecord>, RecoveryResult), RecoveryError> {
    let start = std::time::Instant::now();
    let mut result = RecoveryResult::default();

    if !wal_path.exists() {
        debug!("No WAL file found at {}", wal_path.display());
        return Ok((Vec::new(), result));
    }

    info!("Starting recovery from {}", wal_path.display());

    let image = std::fs::read(wal_path)?;
    let scan = scan_frames(&image);

    result.corrupt_entries_skipped = scan.corrupt;
    result.torn_tail_bytes = scan.torn_tail_bytes;
    result.valid_len = scan.valid_len;

    if scan.corrupt > options.max_corrupt_entries as u64 {
        return Err(RecoveryError::TooManyCorruptEntries(
            scan.corrupt,
            options.max_corrupt_entries,
        ));
    }

    if scan.torn_tail_bytes > 0 {
        warn!(
            "WAL {} ends with {} bytes of incomplete frame",
            wal_path.display(),
            scan.torn_tail_bytes
        );
    }

    let mut seen: HashSet<RecordId> = HashSet::with_capacity(scan.frames.len());
    let mut records = Vec::with_capacity(scan.frames.len());

    for (idx, payload) in scan.frames.iter().enumerate() {
        let record = match OperationRecord::from_json_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                result.invalid_records_skipped += 1;
                if options.verbose {
                    warn!("Skipping undecodable WAL frame {}: {}", idx, e);
                }
                continue;
            }
        };

        if let Err(e) = validate_record(&record) {
            result.invalid_records_skipped += 1;
            if options.verbose {
                warn!("Skipping invalid record {}: {}", record.id, e);
            }
            continue;
        }

        if !seen.insert(record.id.clone()) {
            result.duplicate_records_skipped += 1;
            if options.verbose {
                warn!("Skipping duplicate record {}", record.id);
            }
            continue;
        }

        records.push(record);
    }

    result.records_recovered = records.len() as u64;
    result.recovery_time_micros = start.elapsed().as_micros() as u64;

    if result.has_issues() {
        warn!("{}", result.summary());
    } else {
        info!("{}", result.summary());
    }

    Ok((records, result))
}

// ============================================================================
// Tests
// ============================================================================
