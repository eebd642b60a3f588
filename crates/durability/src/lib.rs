//! Durability layer for the EO operation log
//!
//! This crate persists records and brings them back after a restart:
//! - [`DurabilityMode`]: None, Strict, Batched (default)
//! - [`WalWriter`]: append-only file of CRC32-framed canonical JSON records
//! - [`recover`]: replay the WAL, tolerating a torn tail and a bounded
//!   number of corrupt frames
//!
//! Indexes are never persisted; the engine rebuilds them from recovered
//! records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mode;
pub mod recovery;
pub mod wal;

pub use mode::DurabilityMode;
pub use recovery::{recover, RecoveryError, RecoveryOptions, RecoveryResult};
pub use wal::{
    encode_frame, scan_frames, FrameScan, WalWriter, FRAME_HEADER_LEN, MAX_FRAME_LEN, WAL_FILE_NAME,
};
