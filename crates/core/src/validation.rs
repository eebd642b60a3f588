//! Structural validation against the operator taxonomy
//!
//! Validation is pure and only checks structure:
//! - the operator is one of the nine (guaranteed by the type, checked on the wire)
//! - `target.id` is non-empty
//! - `context.table` is present unless the operator may omit it
//! - the operator's required context keys are present
//! - keys the replay engine folds over have the right JSON kind
//! - `frame.certainty`, when present, lies in `[0, 1]`
//!
//! Payload contents are never checked against an entity shape.
//!
//! [`ValidationError::TimestampRegression`] depends on the log's history,
//! so the append path raises it rather than [`validate`].

use crate::operator::Operator;
use crate::record::{Context, Frame, OperationRecord, RecordDraft, Target};
use crate::types::Timestamp;
use serde_json::Value;
use thiserror::Error;

/// Why a candidate record was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Operator symbol outside the taxonomy
    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    /// `target.id` missing or empty
    #[error("{op}: target.id must not be empty")]
    EmptyTargetId {
        /// Operator of the rejected record
        op: Operator,
    },

    /// Caller-supplied record id is empty
    #[error("record id must not be empty")]
    EmptyRecordId,

    /// `context.table` missing or empty
    #[error("{op}: context.table is required")]
    MissingTable {
        /// Operator of the rejected record
        op: Operator,
    },

    /// A required context key is missing
    #[error("{op}: context.{field} is required")]
    MissingContextField {
        /// Operator of the rejected record
        op: Operator,
        /// Missing key
        field: &'static str,
    },

    /// A required context key has the wrong JSON kind
    #[error("{op}: context.{field} must be {expected}")]
    InvalidContextField {
        /// Operator of the rejected record
        op: Operator,
        /// Offending key
        field: &'static str,
        /// Expected kind
        expected: &'static str,
    },

    /// ALT without `target.field`
    #[error("{op}: target.field is required")]
    MissingTargetField {
        /// Operator of the rejected record
        op: Operator,
    },

    /// `frame.certainty` outside `[0, 1]`
    #[error("frame.certainty must be within [0, 1], got {0}")]
    CertaintyOutOfRange(f64),

    /// Caller-supplied timestamp sorts before a record already in the
    /// entity's history
    #[error("timestamp {ts} precedes {latest}, the latest record of {entity_id}")]
    TimestampRegression {
        /// Target entity
        entity_id: String,
        /// Rejected timestamp
        ts: Timestamp,
        /// Latest timestamp in the entity's history
        latest: Timestamp,
    },
}

/// Validate a candidate record
pub fn validate(draft: &RecordDraft) -> Result<(), ValidationError> {
    if let Some(id) = &draft.id {
        if id.as_str().is_empty() {
            return Err(ValidationError::EmptyRecordId);
        }
    }
    validate_parts(
        draft.operator,
        &draft.target,
        &draft.context,
        draft.frame.as_ref(),
    )
}

/// Validate a stored record (used when replaying a WAL)
pub fn validate_record(record: &OperationRecord) -> Result<(), ValidationError> {
    if record.id.as_str().is_empty() {
        return Err(ValidationError::EmptyRecordId);
    }
    validate_parts(
        record.operator,
        &record.target,
        &record.context,
        record.frame.as_ref(),
    )
}

fn validate_parts(
    op: Operator,
    target: &Target,
    context: &Context,
    frame: Option<&Frame>,
) -> Result<(), ValidationError> {
    if target.id.is_empty() {
        return Err(ValidationError::EmptyTargetId { op });
    }

    if op.requires_table() && context.table.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingTable { op });
    }

    for &field in op.required_context_fields() {
        if !context.contains(field) {
            return Err(ValidationError::MissingContextField { op, field });
        }
    }

    if op.requires_target_field() && target.field.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingTargetField { op });
    }

    match op {
        Operator::Ins => {
            if context.data().is_none() {
                return Err(ValidationError::InvalidContextField {
                    op,
                    field: "data",
                    expected: "an object",
                });
            }
        }
        Operator::Con => match context.get("related") {
            Some(Value::String(related)) if !related.is_empty() => {}
            _ => {
                return Err(ValidationError::InvalidContextField {
                    op,
                    field: "related",
                    expected: "a non-empty string",
                })
            }
        },
        Operator::Syn => {
            if context.inputs().is_none() {
                return Err(ValidationError::InvalidContextField {
                    op,
                    field: "inputs",
                    expected: "an array of entity ids",
                });
            }
        }
        _ => {}
    }

    if let Some(certainty) = frame.and_then(|f| f.certainty) {
        if !(0.0..=1.0).contains(&certainty) {
            return Err(ValidationError::CertaintyOutOfRange(certainty));
        }
    }

    Ok(())
}
