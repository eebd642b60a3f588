//! Unified error type for EO Store.
//!
//! This module provides a stable error type that wraps the internal errors
//! of the workspace crates and presents a consistent interface to users.

use eo_core::{EoError, ValidationError};
use thiserror::Error;

/// All EO Store errors.
///
/// Rejections are all-or-nothing: whenever `append` returns an error, the
/// log and its indexes are exactly as they were before the call.
#[derive(Debug, Error)]
pub enum Error {
    /// Record violates the operator taxonomy
    #[error("validation error: {0}")]
    Validation(ValidationError),

    /// Caller-supplied record id already exists
    #[error("duplicate record id: {0}")]
    DuplicateId(String),

    /// An entity is its own ancestor in provenance
    #[error("provenance cycle at {entity_id}: {}", .path.join(" -> "))]
    ProvenanceCycle {
        /// Entity that closed the cycle
        entity_id: String,
        /// Path from the traced root to the repeated entity
        path: Vec<String>,
    },

    /// Append attempted on a read-only store
    #[error("store is read-only")]
    ReadOnly,

    /// Persisted data failed integrity checks beyond the tolerated limit
    #[error("corruption: {0}")]
    Corruption(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for EO Store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error may succeed on retry (for example after reopening).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if the append was rejected by taxonomy validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if the append collided with an existing id.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateId(_))
    }

    /// Check if provenance traversal hit a cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Error::ProvenanceCycle { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::Storage(_))
    }
}

// Convert from the internal error type
impl From<EoError> for Error {
    fn from(e: EoError) -> Self {
        match e {
            EoError::Validation(v) => Error::Validation(v),
            EoError::DuplicateId(id) => Error::DuplicateId(id.into_string()),
            EoError::ProvenanceCycle { entity_id, path } => {
                Error::ProvenanceCycle { entity_id, path }
            }
            EoError::ReadOnly => Error::ReadOnly,
            EoError::Storage(msg) => Error::Storage(msg),
            EoError::Corruption(msg) => Error::Corruption(msg),
            EoError::Serialization(msg) => Error::Serialization(msg),
            EoError::Io(io) => Error::Io(io),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
