//! Operation record types
//!
//! These types define the structure of records in the append-only log.
//!
//! ## Wire Shape
//!
//! ```json
//! {
//!   "id": "op-…",
//!   "ts": 1700000000000,
//!   "op": "ALT",
//!   "target": {"id": "org_1", "field": "status"},
//!   "context": {"table": "organizations", "new": "verified", "old": "draft"},
//!   "frame": {"actor": "user_7"}
//! }
//! ```
//!
//! `context` and `frame` are open maps: only the keys the operator taxonomy
//! requires are known to the log, every other key is carried through
//! untouched. Maps serialize in key order, so serializing a deserialized
//! canonical record yields the same bytes.
//!
//! Canonical means the log's own output. Foreign JSON is normalized on the
//! way in: keys are re-sorted, and `frame.certainty` is a float, so
//! `"certainty":1` comes back as `"certainty":1.0`. An explicit empty
//! `"provenance":[]` is kept as given.

use crate::error::EoError;
use crate::operator::Operator;
use crate::types::{EntityKey, RecordId, Timestamp};
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value payload
pub type Fields = Map<String, Value>;

/// The thing a record acts upon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Entity identifier (required, non-empty)
    pub id: String,
    /// Field name, for single-field operators such as ALT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Aggregate descriptor: the set of ids a record addresses as a group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

impl Target {
    /// Target a whole entity
    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field: None,
            ids: None,
        }
    }

    /// Target one field of an entity
    pub fn field(id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field: Some(field.into()),
            ids: None,
        }
    }

    /// Target a group of entities under an aggregate id
    pub fn aggregate<I, S>(id: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            field: None,
            ids: Some(ids.into_iter().map(Into::into).collect()),
        }
    }
}

/// Where and how an operation occurred
///
/// `table` is the logical collection name (the record's `source_table`).
/// Everything else lives in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Logical collection name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Operator-specific payload
    #[serde(flatten)]
    pub fields: Fields,
}

impl Context {
    /// Empty context with no table
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty context inside a table
    pub fn in_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            fields: Fields::new(),
        }
    }

    /// Add a key, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a payload key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a payload key as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Whether the payload carries `key` (a `null` value counts as present)
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// `data` payload of a creation record
    pub fn data(&self) -> Option<&Fields> {
        self.fields.get("data").and_then(Value::as_object)
    }

    /// `related` entity of a CON record
    pub fn related(&self) -> Option<&str> {
        self.get_str("related")
    }

    /// `inputs` of a SYN record, in order
    ///
    /// Returns `None` when the key is missing or any element is not a string.
    pub fn inputs(&self) -> Option<Vec<&str>> {
        self.fields
            .get("inputs")?
            .as_array()?
            .iter()
            .map(Value::as_str)
            .collect()
    }

    /// `old` value of an ALT record
    pub fn old_value(&self) -> Option<&Value> {
        self.fields.get("old")
    }

    /// `new` value of an ALT record
    pub fn new_value(&self) -> Option<&Value> {
        self.fields.get("new")
    }
}

/// Epistemic classification of a datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EpistemicType {
    /// Observed directly
    Given,
    /// Interpreted by an actor
    Meant,
    /// Computed from other data
    Derived,
}

impl EpistemicType {
    /// Wire symbol
    pub const fn as_str(&self) -> &'static str {
        match self {
            EpistemicType::Given => "GIVEN",
            EpistemicType::Meant => "MEANT",
            EpistemicType::Derived => "DERIVED",
        }
    }
}

impl std::fmt::Display for EpistemicType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input in a provenance list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRef {
    /// Source entity id
    pub id: String,
    /// How the source is known
    pub epistemic_type: EpistemicType,
}

impl ProvenanceRef {
    /// Create a provenance entry
    pub fn new(id: impl Into<String>, epistemic_type: EpistemicType) -> Self {
        Self {
            id: id.into(),
            epistemic_type,
        }
    }

    /// Directly observed source
    pub fn given(id: impl Into<String>) -> Self {
        Self::new(id, EpistemicType::Given)
    }

    /// Interpreted source
    pub fn meant(id: impl Into<String>) -> Self {
        Self::new(id, EpistemicType::Meant)
    }

    /// Source that is itself derived
    pub fn derived(id: impl Into<String>) -> Self {
        Self::new(id, EpistemicType::Derived)
    }
}

/// Interpretive metadata attached to a record
///
/// Every field is optional. An absent frame conveys no interpretive
/// constraint. `validator` is advisory: the log never enforces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Schema or payload version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Identifier of the shape validator the writer applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    /// Start of the temporal validity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Timestamp>,
    /// End of the temporal validity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<Timestamp>,
    /// Certainty score in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
    /// Who performed the operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Free-text reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Epistemic classification of the record's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epistemic: Option<EpistemicType>,
    /// Input lineage, for derived records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Vec<ProvenanceRef>>,
    /// Any other interpretive keys
    #[serde(flatten)]
    pub extra: Fields,
}

impl Frame {
    /// Empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the actor
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the version
    pub fn version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the validator id
    pub fn validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    /// Set the validity window
    pub fn valid_between(mut self, from: Timestamp, to: Option<Timestamp>) -> Self {
        self.valid_from = Some(from);
        self.valid_to = to;
        self
    }

    /// Set the certainty score
    pub fn certainty(mut self, certainty: f64) -> Self {
        self.certainty = Some(certainty);
        self
    }

    /// Set the epistemic classification
    pub fn epistemic(mut self, epistemic: EpistemicType) -> Self {
        self.epistemic = Some(epistemic);
        self
    }

    /// Set the provenance list
    pub fn provenance(mut self, provenance: impl IntoIterator<Item = ProvenanceRef>) -> Self {
        self.provenance = Some(provenance.into_iter().collect());
        self
    }

    /// Provenance entries, empty when absent
    pub fn provenance_refs(&self) -> &[ProvenanceRef] {
        self.provenance.as_deref().unwrap_or_default()
    }

    /// Add an extra key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// An immutable record in the log
///
/// Each record has:
/// - A globally unique id
/// - A creation timestamp (primary ordering key)
/// - One of the nine operators
/// - A target, a context and an optional frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Unique record id
    pub id: RecordId,
    /// Creation time
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    /// Operation kind
    #[serde(rename = "op")]
    pub operator: Operator,
    /// Addressed entity
    pub target: Target,
    /// Where/how the operation occurred
    pub context: Context,
    /// Interpretive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
}

impl OperationRecord {
    /// `target.id`
    pub fn entity_id(&self) -> &str {
        &self.target.id
    }

    /// `context.table`
    pub fn source_table(&self) -> Option<&str> {
        self.context.table.as_deref()
    }

    /// `(source_table, entity_id)`
    pub fn entity_key(&self) -> EntityKey {
        EntityKey {
            table: self.context.table.clone(),
            id: self.target.id.clone(),
        }
    }

    /// `frame.actor`, if any
    pub fn actor(&self) -> Option<&str> {
        self.frame.as_ref().and_then(|f| f.actor.as_deref())
    }

    /// Whether the record synthesizes or derives data
    pub fn is_derivation(&self) -> bool {
        self.operator == Operator::Syn
            || self
                .frame
                .as_ref()
                .map_or(false, |f| f.epistemic == Some(EpistemicType::Derived))
    }

    /// Canonical JSON encoding
    pub fn to_json(&self) -> Result<String, EoError> {
        serde_json::to_string(self).map_err(EoError::from)
    }

    /// Canonical JSON encoding as bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EoError> {
        serde_json::to_vec(self).map_err(EoError::from)
    }

    /// Decode a record, rejecting unknown operators as validation errors
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, EoError> {
        let value: Value = serde_json::from_slice(bytes)?;
        check_operator_symbol(&value)?;
        serde_json::from_value(value).map_err(EoError::from)
    }
}

/// A candidate record submitted to `append`
///
/// The caller supplies `operator`, `target`, `context` and optionally
/// `frame`. `id` and `timestamp` are assigned by the log when absent.
///
/// Use the per-operator constructors to get the required context keys right:
///
/// ```
/// use eo_core::{RecordDraft, Operator};
/// use serde_json::json;
///
/// let draft = RecordDraft::alt("organizations", "org_1", "status", json!("draft"), json!("verified"));
/// assert_eq!(draft.operator, Operator::Alt);
/// assert_eq!(draft.target.field.as_deref(), Some("status"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    /// Caller-supplied id (must be unique)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Caller-supplied timestamp
    #[serde(rename = "ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Operation kind
    #[serde(rename = "op")]
    pub operator: Operator,
    /// Addressed entity
    pub target: Target,
    /// Where/how the operation occurred
    pub context: Context,
    /// Interpretive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
}

impl RecordDraft {
    /// Generic constructor
    pub fn new(operator: Operator, target: Target, context: Context) -> Self {
        Self {
            id: None,
            timestamp: None,
            operator,
            target,
            context,
            frame: None,
        }
    }

    /// NUL: logical deletion
    pub fn nul(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(Operator::Nul, Target::entity(id), Context::in_table(table))
    }

    /// DES: naming / defining
    pub fn des(table: impl Into<String>, id: impl Into<String>, definition: impl Into<Value>) -> Self {
        Self::new(
            Operator::Des,
            Target::entity(id),
            Context::in_table(table).with("definition", definition),
        )
    }

    /// INS: creation with full initial data
    pub fn ins(table: impl Into<String>, id: impl Into<String>, data: Fields) -> Self {
        Self::new(
            Operator::Ins,
            Target::entity(id),
            Context::in_table(table).with("data", Value::Object(data)),
        )
    }

    /// SEG: filtering / partitioning
    pub fn seg(table: impl Into<String>, id: impl Into<String>, filter: impl Into<Value>) -> Self {
        Self::new(
            Operator::Seg,
            Target::entity(id),
            Context::in_table(table).with("filter", filter),
        )
    }

    /// CON: relate `id` and `related`
    ///
    /// No table is set; use [`RecordDraft::in_table`] to scope the link.
    pub fn con(id: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(
            Operator::Con,
            Target::entity(id),
            Context::new().with("related", related.into()),
        )
    }

    /// SYN: synthesize `id` from ordered `inputs`
    pub fn syn<I, S>(table: impl Into<String>, id: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs: Vec<Value> = inputs.into_iter().map(|s| Value::String(s.into())).collect();
        Self::new(
            Operator::Syn,
            Target::entity(id),
            Context::in_table(table).with("inputs", Value::Array(inputs)),
        )
    }

    /// ALT: set `field` from `old` to `new`
    pub fn alt(
        table: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        old: impl Into<Value>,
        new: impl Into<Value>,
    ) -> Self {
        Self::new(
            Operator::Alt,
            Target::field(id, field),
            Context::in_table(table).with("old", old).with("new", new),
        )
    }

    /// SUP: contextual overlay
    pub fn sup(table: impl Into<String>, id: impl Into<String>, overlay: impl Into<Value>) -> Self {
        Self::new(
            Operator::Sup,
            Target::entity(id),
            Context::in_table(table).with("overlay", overlay),
        )
    }

    /// REC: reconfiguration with a rationale
    pub fn rec(table: impl Into<String>, id: impl Into<String>, rationale: impl Into<Value>) -> Self {
        Self::new(
            Operator::Rec,
            Target::entity(id),
            Context::in_table(table).with("rationale", rationale),
        )
    }

    /// Supply the record id
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Supply the timestamp
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a frame
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Set `context.table`
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.context.table = Some(table.into());
        self
    }

    /// Add a context key
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.fields.insert(key.into(), value.into());
        self
    }

    /// Seal into a stored record
    pub fn into_record(self, id: RecordId, timestamp: Timestamp) -> OperationRecord {
        OperationRecord {
            id,
            timestamp,
            operator: self.operator,
            target: self.target,
            context: self.context,
            frame: self.frame,
        }
    }

    /// Decode a candidate from JSON
    ///
    /// An `op` outside the taxonomy is a [`ValidationError::UnknownOperator`],
    /// not a serialization error.
    pub fn from_json(json: &str) -> Result<Self, EoError> {
        let value: Value = serde_json::from_str(json)?;
        check_operator_symbol(&value)?;
        serde_json::from_value(value).map_err(EoError::from)
    }
}

impl From<OperationRecord> for RecordDraft {
    fn from(record: OperationRecord) -> Self {
        Self {
            id: Some(record.id),
            timestamp: Some(record.timestamp),
            operator: record.operator,
            target: record.target,
            context: record.context,
            frame: record.frame,
        }
    }
}

fn check_operator_symbol(value: &Value) -> Result<(), EoError> {
    match value.get("op") {
        Some(Value::String(symbol)) if Operator::from_symbol(symbol).is_some() => Ok(()),
        Some(Value::String(symbol)) => Err(ValidationError::UnknownOperator(symbol.clone()).into()),
        Some(other) => Err(ValidationError::UnknownOperator(other.to_string()).into()),
        None => Err(ValidationError::UnknownOperator(String::new()).into()),
    }
}
