//! Write-ahead log file
//!
//! ## Frame Layout
//!
//! ```text
//! +----------------+----------------+---------------------------+
//! | len: u32 LE    | crc32: u32 LE  | payload: len bytes (JSON) |
//! +----------------+----------------+---------------------------+
//! ```
//!
//! The payload is the canonical JSON encoding of one `OperationRecord`, at
//! most [`MAX_FRAME_LEN`] bytes. Frames are written in append-sequence order
//! and never rewritten.
//!
//! A frame whose header or payload runs past end-of-file is a torn tail
//! (crash mid-write) and ends the scan. A complete frame whose checksum does
//! not match is corrupt and is skipped. A header claiming more than
//! `MAX_FRAME_LEN` bytes was never written by [`WalWriter`]; the scan counts
//! it as corrupt and resumes at the next intact frame.

use crate::mode::DurabilityMode;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use eo_core::{EoError, OperationRecord};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// File name of the WAL inside a store directory
pub const WAL_FILE_NAME: &str = "eo.wal";

/// Bytes before each payload: length + checksum
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode one payload as a frame
///
/// # Errors
///
/// `Storage` if the payload exceeds [`MAX_FRAME_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, EoError> {
    let len = match u32::try_from(payload.len()) {
        Ok(len) if payload.len() <= MAX_FRAME_LEN => len,
        _ => {
            return Err(EoError::Storage(format!(
                "record encodes to {} bytes, WAL frame limit is {}",
                payload.len(),
                MAX_FRAME_LEN
            )))
        }
    };
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    // Writes into a Vec cannot fail.
    let _ = buf.write_u32::<LittleEndian>(len);
    let _ = buf.write_u32::<LittleEndian>(crc32fast::hash(payload));
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Result of scanning a WAL image
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameScan {
    /// Payloads of frames whose checksum matched, in file order
    pub frames: Vec<Vec<u8>>,
    /// Corrupt regions skipped: bad checksums and impossible headers
    pub corrupt: u64,
    /// Length of the prefix made of complete frames and skipped regions
    pub valid_len: u64,
    /// Bytes after `valid_len` (incomplete trailing frame)
    pub torn_tail_bytes: u64,
}

enum Header {
    /// Frame fits in the image
    Complete { len: usize, crc: u32 },
    /// Header or payload runs past the end
    Torn,
    /// Length exceeds `MAX_FRAME_LEN`
    Oversized(usize),
}

fn read_header(rest: &[u8]) -> Header {
    if rest.len() < FRAME_HEADER_LEN {
        return Header::Torn;
    }
    let len = LittleEndian::read_u32(&rest[0..4]) as usize;
    let crc = LittleEndian::read_u32(&rest[4..8]);
    if len > MAX_FRAME_LEN {
        Header::Oversized(len)
    } else if rest.len() < FRAME_HEADER_LEN + len {
        Header::Torn
    } else {
        Header::Complete { len, crc }
    }
}

/// First offset after `from` holding a frame with a matching checksum
fn resync(bytes: &[u8], from: usize) -> Option<usize> {
    (from + 1..bytes.len()).find(|&offset| match read_header(&bytes[offset..]) {
        Header::Complete { len, crc } => {
            let start = offset + FRAME_HEADER_LEN;
            crc32fast::hash(&bytes[start..start + len]) == crc
        }
        _ => false,
    })
}

/// Split a WAL image into frames
pub fn scan_frames(bytes: &[u8]) -> FrameScan {
    let mut scan = FrameScan::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match read_header(&bytes[offset..]) {
            Header::Torn => break,
            Header::Oversized(len) => {
                scan.corrupt += 1;
                match resync(bytes, offset) {
                    Some(next) => {
                        warn!(offset, len, skipped = next - offset, "WAL frame header impossible, resynced");
                        offset = next;
                    }
                    None => {
                        warn!(offset, len, "WAL frame header impossible, no intact frame follows");
                        offset = bytes.len();
                    }
                }
            }
            Header::Complete { len, crc } => {
                let payload = &bytes[offset + FRAME_HEADER_LEN..offset + FRAME_HEADER_LEN + len];
                if crc32fast::hash(payload) == crc {
                    scan.frames.push(payload.to_vec());
                } else {
                    warn!(offset, len, "WAL frame checksum mismatch, skipping");
                    scan.corrupt += 1;
                }
                offset += FRAME_HEADER_LEN + len;
            }
        }
    }

    scan.valid_len = offset as u64;
    scan.torn_tail_bytes = (bytes.len() - offset) as u64;
    scan
}

/// Appends records to the WAL file
///
/// Not internally synchronized; the caller serializes appends so that file
/// order equals sequence order.
///
/// Each frame goes to the file in a single write. If the write or the sync
/// that follows it fails, the file is cut back to its length before the
/// frame, so a rejected append never reappears on recovery. If the cut
/// itself fails the writer is poisoned and refuses further appends.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    mode: DurabilityMode,
    len: u64,
    pending: usize,
    last_sync: Instant,
    frames_written: u64,
    poisoned: bool,
}

impl WalWriter {
    /// Open (creating if needed) the WAL at `path` for appending
    ///
    /// When `valid_len` is given the file is first truncated to it, dropping
    /// a torn tail found by recovery.
    pub fn open(path: &Path, mode: DurabilityMode, valid_len: Option<u64>) -> Result<Self, EoError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut len = file.metadata()?.len();
        if let Some(valid_len) = valid_len {
            if len > valid_len {
                warn!(
                    path = %path.display(),
                    dropped = len - valid_len,
                    "Truncating torn WAL tail"
                );
                file.set_len(valid_len)?;
                file.sync_all()?;
                len = valid_len;
            }
        }

        debug!(path = %path.display(), mode = %mode, len, "Opened WAL");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
            len,
            pending: 0,
            last_sync: Instant::now(),
            frames_written: 0,
            poisoned: false,
        })
    }

    /// Append one record
    ///
    /// Returns once the frame is written and, depending on the mode, synced.
    /// On error the file holds no trace of the frame.
    pub fn append(&mut self, record: &OperationRecord) -> Result<(), EoError> {
        if self.poisoned {
            return Err(EoError::Storage(format!(
                "WAL {} is poisoned by an earlier failed write",
                self.path.display()
            )));
        }

        let frame = encode_frame(&record.to_json_bytes()?)?;
        let start = self.len;

        if let Err(e) = self.write_frame(&frame) {
            self.rollback(start);
            return Err(e);
        }

        self.len = start + frame.len() as u64;
        self.frames_written += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), EoError> {
        self.file.write_all(frame)?;

        let pending = self.pending + 1;
        let due = match self.mode {
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => {
                pending >= batch_size
                    || self.last_sync.elapsed() >= Duration::from_millis(interval_ms)
            }
            mode => mode.requires_immediate_fsync(),
        };
        if due {
            self.sync()
        } else {
            self.pending = pending;
            Ok(())
        }
    }

    /// Cut the file back to `len` after a failed append
    fn rollback(&mut self, len: u64) {
        let cut = self.file.set_len(len).and_then(|_| self.file.sync_all());
        match cut {
            Ok(()) => {
                warn!(path = %self.path.display(), len, "Rolled back failed WAL frame");
            }
            Err(e) => {
                self.poisoned = true;
                error!(path = %self.path.display(), len, error = %e, "WAL rollback failed, writer poisoned");
            }
        }
    }

    /// fsync frames written since the last sync
    pub fn sync(&mut self) -> Result<(), EoError> {
        self.file.sync_data()?;
        self.pending = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Frames appended since unsynced
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Frames appended through this writer
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Bytes of intact frames in the file
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file holds no frames
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a failed rollback left the file in an unknown state
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// WAL file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.pending > 0 && !self.poisoned {
            if let Err(e) = self.sync() {
                warn!(path = %self.path.display(), error = %e, "WAL sync on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for WalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalWriter")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("len", &self.len)
            .field("pending", &self.pending)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
