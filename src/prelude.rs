//! Convenient imports for EO Store.
//!
//! ```ignore
//! use eostore::prelude::*;
//!
//! let store = EoStore::ephemeral()?;
//! store.append(RecordDraft::con("org_1", "campaign_1"))?;
//! ```

// Main entry point
pub use crate::database::{EoStore, EoStoreBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Core types
pub use crate::types::{
    AuditEvent, Context, EntityState, EpistemicType, Frame, OperationRecord, Operator,
    OperatorPattern, ProvenanceNode, ProvenanceRef, ProvenanceTree, RecordDraft, RecordId, Target,
    Timestamp, Value,
};

// Configuration
pub use crate::types::{DurabilityMode, RecoveryOptions};

// Re-export serde_json for convenience
pub use serde_json::json;
