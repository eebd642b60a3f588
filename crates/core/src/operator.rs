//! Operator taxonomy
//!
//! Every mutation in the system is recorded as exactly one of nine operators,
//! organized in three triads.
//!
//! ## The Nine Operators
//!
//! | Operator | Code | Triad | Meaning | Required context |
//! |----------|------|-------|---------|------------------|
//! | NUL | 0 | Identity | absence / deletion | `table` |
//! | DES | 1 | Identity | naming / defining | `table`, `definition` |
//! | INS | 2 | Identity | creation | `table`, `data` |
//! | SEG | 3 | Structure | filtering / partitioning | `table`, `filter` |
//! | CON | 4 | Structure | relating two entities | `related` |
//! | SYN | 5 | Structure | merging / synthesizing | `table`, `inputs` |
//! | ALT | 6 | Interpretation | field transition | `table`, `old`, `new` |
//! | SUP | 7 | Interpretation | contextual overlay | `table`, `overlay` |
//! | REC | 8 | Interpretation | reconfiguration | `table`, `rationale` |
//!
//! The set is closed and ordered. Each operator has a fixed `u8` code so
//! causal patterns are plain sequences of small enum values.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The nine operation kinds
///
/// ## Invariant
///
/// This enum MUST have exactly 9 variants. Records carrying any other
/// operator symbol are rejected at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Operator {
    /// Absence / deletion. Terminates state reconstruction.
    Nul = 0,
    /// Naming / defining
    Des = 1,
    /// Creation. Replaces working state with `context.data`.
    Ins = 2,
    /// Filtering / partitioning
    Seg = 3,
    /// Relating two entities (`target.id` and `context.related`)
    Con = 4,
    /// Merging / synthesizing from `context.inputs`
    Syn = 5,
    /// Single-field transition from `context.old` to `context.new`
    Alt = 6,
    /// Contextual overlay, never replaces base data
    Sup = 7,
    /// Reconfiguration / adaptive update
    Rec = 8,
}

/// The three triads the operators are organized in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Triad {
    /// NUL, DES, INS
    Identity,
    /// SEG, CON, SYN
    Structure,
    /// ALT, SUP, REC
    Interpretation,
}

impl Operator {
    /// All operators in code order
    pub const ALL: [Operator; 9] = [
        Operator::Nul,
        Operator::Des,
        Operator::Ins,
        Operator::Seg,
        Operator::Con,
        Operator::Syn,
        Operator::Alt,
        Operator::Sup,
        Operator::Rec,
    ];

    /// Get all operators as a slice
    pub fn all() -> &'static [Operator] {
        &Self::ALL
    }

    /// Three-letter wire symbol
    pub const fn symbol(&self) -> &'static str {
        match self {
            Operator::Nul => "NUL",
            Operator::Des => "DES",
            Operator::Ins => "INS",
            Operator::Seg => "SEG",
            Operator::Con => "CON",
            Operator::Syn => "SYN",
            Operator::Alt => "ALT",
            Operator::Sup => "SUP",
            Operator::Rec => "REC",
        }
    }

    /// Parse from the wire symbol
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "NUL" => Some(Operator::Nul),
            "DES" => Some(Operator::Des),
            "INS" => Some(Operator::Ins),
            "SEG" => Some(Operator::Seg),
            "CON" => Some(Operator::Con),
            "SYN" => Some(Operator::Syn),
            "ALT" => Some(Operator::Alt),
            "SUP" => Some(Operator::Sup),
            "REC" => Some(Operator::Rec),
            _ => None,
        }
    }

    /// Fixed-width numeric code
    pub const fn code(&self) -> u8 {
        *self as u8
    }

    /// Inverse of [`Operator::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Triad this operator belongs to
    pub const fn triad(&self) -> Triad {
        match self {
            Operator::Nul | Operator::Des | Operator::Ins => Triad::Identity,
            Operator::Seg | Operator::Con | Operator::Syn => Triad::Structure,
            Operator::Alt | Operator::Sup | Operator::Rec => Triad::Interpretation,
        }
    }

    /// Whether `context.table` must be present
    ///
    /// Only `CON` may omit it: relationships are cross-cutting.
    pub const fn requires_table(&self) -> bool {
        !matches!(self, Operator::Con)
    }

    /// Context keys (besides `table`) the operator requires
    pub const fn required_context_fields(&self) -> &'static [&'static str] {
        match self {
            Operator::Nul => &[],
            Operator::Des => &["definition"],
            Operator::Ins => &["data"],
            Operator::Seg => &["filter"],
            Operator::Con => &["related"],
            Operator::Syn => &["inputs"],
            Operator::Alt => &["old", "new"],
            Operator::Sup => &["overlay"],
            Operator::Rec => &["rationale"],
        }
    }

    /// Whether the record must name `target.field`
    pub const fn requires_target_field(&self) -> bool {
        matches!(self, Operator::Alt)
    }

    /// Whether this operator changes reconstructed scalar state
    ///
    /// NUL, INS and ALT do. Everything else affects relationships or
    /// interpretation only.
    pub const fn affects_state(&self) -> bool {
        matches!(self, Operator::Nul | Operator::Ins | Operator::Alt)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned when parsing an unknown operator symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl std::fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown operator: {:?}", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::from_symbol(s.trim()).ok_or_else(|| UnknownOperator(s.to_string()))
    }
}
