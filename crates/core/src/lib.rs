//! Core types for the EO operation log
//!
//! This crate defines the canonical data model shared by every other crate:
//! - [`OperationRecord`]: the immutable unit of the log
//! - [`Operator`]: the nine-operator taxonomy
//! - [`validate`]: structural validation of candidate records
//! - [`EoError`]: the internal error type
//!
//! ## Design Principle
//!
//! - **eo-core** defines canonical semantic types (this crate)
//! - **eo-storage** holds the record arena and the index layer
//! - **eo-durability** persists records to the write-ahead log
//! - **eo-engine** orchestrates appends, replay and provenance

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod operator;
pub mod record;
pub mod types;
pub mod validation;

use std::collections::BTreeMap;

pub use error::{EoError, Result};
pub use operator::{Operator, Triad, UnknownOperator};
pub use record::{
    Context, EpistemicType, Fields, Frame, OperationRecord, ProvenanceRef, RecordDraft, Target,
};
pub use serde_json::Value;
pub use types::{EntityKey, RecordId, Sequence, Timestamp};
pub use validation::{validate, validate_record, ValidationError};

/// Reconstructed field state of one entity
///
/// Ordered by field name, so two reconstructions of the same history
/// serialize to identical bytes.
pub type EntityState = BTreeMap<String, Value>;
