//! # EO Store
//!
//! Append-only epistemic operation log.
//!
//! Every change to an entity is recorded as an immutable operation record
//! carrying one of nine operators. Current state, relationships, audit
//! trails and provenance are never stored; they are derived by replaying
//! the log.
//!
//! ## Quick Start
//!
//! ```ignore
//! use eostore::prelude::*;
//!
//! let store = EoStore::open("./eo-data")?;
//!
//! store.append(RecordDraft::ins(
//!     "organizations",
//!     "org_1",
//!     json!({"name": "A", "status": "draft"}).as_object().cloned().unwrap(),
//! ))?;
//! store.append(RecordDraft::alt("organizations", "org_1", "status", "draft", "verified"))?;
//! store.append(RecordDraft::con("org_1", "campaign_1"))?;
//!
//! assert_eq!(store.reconstruct_state("org_1")["status"], json!("verified"));
//! assert!(store.connections("campaign_1").contains("org_1"));
//! assert_eq!(store.operator_pattern("org_1").to_string(), "INS→ALT→CON");
//!
//! store.close()?;
//! ```
//!
//! ## Operators
//!
//! | Triad | Operators |
//! |-------|-----------|
//! | Identity | `NUL`, `DES`, `INS` |
//! | Structure | `SEG`, `CON`, `SYN` |
//! | Interpretation | `ALT`, `SUP`, `REC` |
//!
//! Only `INS`, `ALT` and `NUL` change reconstructed state.

#![warn(missing_docs)]

mod database;
mod error;
mod types;

pub mod prelude;

// Re-export main entry points
pub use database::{EoStore, EoStoreBuilder};
pub use error::{Error, Result};

// Re-export types
pub use types::*;
