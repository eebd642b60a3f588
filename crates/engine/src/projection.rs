//! Projection engine: state, relationships and audit views by replay
//!
//! Every view here is a pure fold over records in total order
//! (`timestamp`, then append `sequence`). Nothing reads a clock or keeps
//! hidden state, so the same log always yields the same output.
//!
//! ## Fold Rules
//!
//! | Operator | Effect on state |
//! |----------|-----------------|
//! | INS | replace with `context.data` |
//! | ALT | set `target.field` to `context.new` |
//! | NUL | empty, and stop folding |
//! | other | none |
//!
//! Records after a NUL still appear in audit trails and operator patterns.

use eo_core::{
    Context, EntityKey, EntityState, OperationRecord, Operator, RecordId, Timestamp,
    UnknownOperator,
};
use eo_storage::{sort_total_order, SequencedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Record Source
// ============================================================================

/// Read access to ordered records
///
/// Implemented by the engine's `Database` over its indexes, and by plain
/// record slices for tests and offline replay.
///
/// ## Contract
///
/// - Every method returns records in total order
/// - Unknown ids yield an empty vector, never an error
pub trait RecordSource {
    /// Records whose `target.id` is `entity_id`, across tables
    fn records_for_target(&self, entity_id: &str) -> Vec<SequencedRecord>;

    /// Records addressing exactly `(table, id)`
    fn records_for_entity(&self, key: &EntityKey) -> Vec<SequencedRecord>;

    /// CON records naming `entity_id` as target or as `related`
    fn links_for(&self, entity_id: &str) -> Vec<SequencedRecord>;
}

impl RecordSource for [SequencedRecord] {
    fn records_for_target(&self, entity_id: &str) -> Vec<SequencedRecord> {
        ordered(self.iter().filter(|r| r.record.target.id == entity_id))
    }

    fn records_for_entity(&self, key: &EntityKey) -> Vec<SequencedRecord> {
        ordered(self.iter().filter(|r| {
            r.record.target.id == key.id && r.record.context.table == key.table
        }))
    }

    fn links_for(&self, entity_id: &str) -> Vec<SequencedRecord> {
        ordered(self.iter().filter(|r| {
            r.record.operator == Operator::Con
                && (r.record.target.id == entity_id
                    || r.record.context.related() == Some(entity_id))
        }))
    }
}

impl RecordSource for Vec<SequencedRecord> {
    fn records_for_target(&self, entity_id: &str) -> Vec<SequencedRecord> {
        self.as_slice().records_for_target(entity_id)
    }

    fn records_for_entity(&self, key: &EntityKey) -> Vec<SequencedRecord> {
        self.as_slice().records_for_entity(key)
    }

    fn links_for(&self, entity_id: &str) -> Vec<SequencedRecord> {
        self.as_slice().links_for(entity_id)
    }
}

fn ordered<'a>(records: impl Iterator<Item = &'a SequencedRecord>) -> Vec<SequencedRecord> {
    let mut out: Vec<SequencedRecord> = records.cloned().collect();
    sort_total_order(&mut out);
    out
}

// ============================================================================
// State
// ============================================================================

/// Fold ordered records into field state
pub fn fold_state<'a, I>(records: I) -> EntityState
where
    I: IntoIterator<Item = &'a OperationRecord>,
{
    let mut state = EntityState::new();
    for record in records.into_iter().filter(|r| r.operator.affects_state()) {
        match record.operator {
            Operator::Nul => return EntityState::new(),
            Operator::Ins => {
                state = record
                    .context
                    .data()
                    .map(|data| data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
            }
            Operator::Alt => {
                if let (Some(field), Some(new)) =
                    (record.target.field.as_ref(), record.context.new_value())
                {
                    state.insert(field.clone(), new.clone());
                }
            }
            _ => {}
        }
    }
    state
}

/// Current state of `entity_id`, across tables
pub fn reconstruct_state<S: RecordSource + ?Sized>(source: &S, entity_id: &str) -> EntityState {
    let records = source.records_for_target(entity_id);
    fold_state(records.iter().map(|r| r.record.as_ref()))
}

/// Current state of `(table, id)`
pub fn reconstruct_state_in<S: RecordSource + ?Sized>(
    source: &S,
    table: &str,
    entity_id: &str,
) -> EntityState {
    let records = source.records_for_entity(&EntityKey::new(table, entity_id));
    fold_state(records.iter().map(|r| r.record.as_ref()))
}

/// State of `entity_id` as of `as_of` (inclusive)
pub fn reconstruct_state_at<S: RecordSource + ?Sized>(
    source: &S,
    entity_id: &str,
    as_of: Timestamp,
) -> EntityState {
    let records = source.records_for_target(entity_id);
    fold_state(
        records
            .iter()
            .map(|r| r.record.as_ref())
            .take_while(|r| r.timestamp <= as_of),
    )
}

// ============================================================================
// Relationships
// ============================================================================

/// Entities linked to `entity_id` by CON records, in either direction
pub fn connections<S: RecordSource + ?Sized>(source: &S, entity_id: &str) -> BTreeSet<String> {
    source
        .links_for(entity_id)
        .iter()
        .filter_map(|r| {
            let related = r.record.context.related()?;
            if r.record.target.id == entity_id {
                Some(related.to_string())
            } else if related == entity_id {
                Some(r.record.target.id.clone())
            } else {
                None
            }
        })
        .collect()
}

// ============================================================================
// Audit
// ============================================================================

/// One entry of an entity's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Record that produced this entry
    pub record_id: RecordId,
    /// Record timestamp
    pub when: Timestamp,
    /// Operator
    pub op: Operator,
    /// Record context
    pub context: Context,
    /// `frame.actor`, when present
    pub actor: Option<String>,
}

impl From<&OperationRecord> for AuditEvent {
    fn from(record: &OperationRecord) -> Self {
        AuditEvent {
            record_id: record.id.clone(),
            when: record.timestamp,
            op: record.operator,
            context: record.context.clone(),
            actor: record.actor().map(str::to_string),
        }
    }
}

/// Every record targeting `entity_id`, in total order, NUL included
pub fn audit_trail<S: RecordSource + ?Sized>(source: &S, entity_id: &str) -> Vec<AuditEvent> {
    source
        .records_for_target(entity_id)
        .iter()
        .map(|r| AuditEvent::from(r.record.as_ref()))
        .collect()
}

/// Operators of the audit trail, in order
pub fn operator_pattern<S: RecordSource + ?Sized>(source: &S, entity_id: &str) -> OperatorPattern {
    source
        .records_for_target(entity_id)
        .iter()
        .map(|r| r.record.operator)
        .collect()
}

// ============================================================================
// Operator Pattern
// ============================================================================

/// Ordered operator sequence, e.g. `INS→ALT→ALT→NUL`
///
/// Compared as `u8` codes, never as strings.
///
/// ```
/// use eo_engine::OperatorPattern;
/// use eo_core::Operator;
///
/// let pattern: OperatorPattern = "INS->ALT->NUL".parse().unwrap();
/// assert!(pattern.contains(&[Operator::Alt, Operator::Nul]));
/// assert_eq!(pattern.to_string(), "INS→ALT→NUL");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorPattern(Vec<Operator>);

impl OperatorPattern {
    /// Wrap a sequence
    pub fn new(ops: Vec<Operator>) -> Self {
        Self(ops)
    }

    /// Operators in order
    pub fn as_slice(&self) -> &[Operator] {
        &self.0
    }

    /// Unwrap into the sequence
    pub fn into_vec(self) -> Vec<Operator> {
        self.0
    }

    /// Number of operators
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pattern is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `needle` occurs as a contiguous run
    ///
    /// The empty needle matches everything.
    pub fn contains(&self, needle: &[Operator]) -> bool {
        needle.is_empty() || self.0.windows(needle.len()).any(|w| w == needle)
    }

    /// Whether the pattern begins with `prefix`
    pub fn starts_with(&self, prefix: &[Operator]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Whether the pattern ends with `suffix`
    pub fn ends_with(&self, suffix: &[Operator]) -> bool {
        self.0.ends_with(suffix)
    }
}

impl fmt::Display for OperatorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("→")?;
            }
            f.write_str(op.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for OperatorPattern {
    type Err = UnknownOperator;

    /// Parse `INS→ALT`, `INS->ALT`, `INS>ALT` or `INS,ALT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace("->", "→").replace(['>', ','], "→");
        normalized
            .split('→')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Operator>)
            .collect::<Result<Vec<_>, _>>()
            .map(OperatorPattern)
    }
}

impl FromIterator<Operator> for OperatorPattern {
    fn from_iter<I: IntoIterator<Item = Operator>>(iter: I) -> Self {
        OperatorPattern(iter.into_iter().collect())
    }
}

impl From<Vec<Operator>> for OperatorPattern {
    fn from(ops: Vec<Operator>) -> Self {
        OperatorPattern(ops)
    }
}

impl PartialEq<[Operator]> for OperatorPattern {
    fn eq(&self, other: &[Operator]) -> bool {
        self.0 == other
    }
}

impl<const N: usize> PartialEq<[Operator; N]> for OperatorPattern {
    fn eq(&self, other: &[Operator; N]) -> bool {
        self.0 == other[..]
    }
}
