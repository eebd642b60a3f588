//! Public types for the EO Store API.
//!
//! This module re-exports types from the workspace crates with a clean
//! public interface.

// Record model
pub use eo_core::{
    Context, EntityKey, EntityState, EpistemicType, Fields, Frame, OperationRecord, Operator,
    ProvenanceRef, RecordDraft, RecordId, Sequence, Target, Timestamp, Triad, Value,
};

// Validation
pub use eo_core::{validate, ValidationError};

// Projections and provenance
pub use eo_engine::{AuditEvent, OperatorPattern, ProvenanceNode, ProvenanceTree, RecordSource};

// Configuration and statistics
pub use eo_engine::{
    AccessMode, CacheStats, DurabilityMode, IndexVerification, RecoveryOptions, RecoveryResult,
    StoreStats,
};
