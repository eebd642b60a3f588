//! Internal error type shared by all EO crates
//!
//! The public crate maps these onto its own stable `Error` enum.

use crate::types::RecordId;
use crate::validation::ValidationError;
use thiserror::Error;

/// Errors raised by the log, the projection engine and the WAL
#[derive(Debug, Error)]
pub enum EoError {
    /// Candidate violates the operator taxonomy; nothing was stored
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Caller-supplied id already exists; nothing was stored
    #[error("duplicate record id: {0}")]
    DuplicateId(RecordId),

    /// An entity is listed as its own ancestor
    #[error("provenance cycle at {entity_id}: {}", .path.join(" -> "))]
    ProvenanceCycle {
        /// Entity that closed the cycle
        entity_id: String,
        /// Traversal path from the root down to the repeated entity
        path: Vec<String>,
    },

    /// Write attempted on a read-only store
    #[error("store is read-only")]
    ReadOnly,

    /// Log or index invariant broken
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted data failed integrity checks
    #[error("corruption: {0}")]
    Corruption(String),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for EO operations
pub type Result<T> = std::result::Result<T, EoError>;

impl From<serde_json::Error> for EoError {
    fn from(e: serde_json::Error) -> Self {
        EoError::Serialization(e.to_string())
    }
}

impl EoError {
    /// Whether the append was rejected by taxonomy validation
    pub fn is_validation(&self) -> bool {
        matches!(self, EoError::Validation(_))
    }

    /// Whether the append collided with an existing id
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EoError::DuplicateId(_))
    }

    /// Whether provenance traversal hit a cycle
    pub fn is_cycle(&self) -> bool {
        matches!(self, EoError::ProvenanceCycle { .. })
    }
}
