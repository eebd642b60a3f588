//! Core identifier and time types for the operation log
//!
//! This module defines the fundamental types used throughout the system:
//! - [`RecordId`]: Globally unique identifier of an operation record
//! - [`Timestamp`]: Creation time, the primary ordering key
//! - [`EntityKey`]: `(source_table, entity_id)` pair addressing one entity
//! - [`Sequence`]: Append position, the ordering tie-breaker

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append position of a record in the log.
///
/// Assigned once, strictly increasing, never reused.
pub type Sequence = u64;

/// Unique identifier for an operation record
///
/// Assigned at append time when the caller does not supply one. Generated ids
/// have the form `op-{uuid}`; caller-supplied ids may be any non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new random RecordId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use eo_core::types::RecordId;
    ///
    /// let id1 = RecordId::new();
    /// let id2 = RecordId::new();
    /// assert_ne!(id1, id2);
    /// assert!(id1.as_str().starts_with("op-"));
    /// ```
    pub fn new() -> Self {
        RecordId(format!("op-{}", Uuid::new_v4()))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Milliseconds since the Unix epoch
///
/// Used as the primary ordering key of the log. Ties between records with the
/// same timestamp are broken by append [`Sequence`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Unix epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }

    /// Create from milliseconds since the epoch
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Milliseconds since the epoch
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Timestamp(millis)
    }
}

/// Address of one entity: `(source_table, entity_id)`
///
/// `table` is `None` for cross-cutting records (typically `CON`) that omit
/// `context.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Logical collection name
    pub table: Option<String>,
    /// Entity identifier
    pub id: String,
}

impl EntityKey {
    /// Key for an entity inside a table
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            id: id.into(),
        }
    }

    /// Key for a record that carries no table
    pub fn untabled(id: impl Into<String>) -> Self {
        Self {
            table: None,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    /// Display as `table/id`, or just `id` when untabled
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}/{}", table, self.id),
            None => f.write_str(&self.id),
        }
    }
}
