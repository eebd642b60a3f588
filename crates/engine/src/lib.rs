//! Engine for the EO operation log
//!
//! This crate orchestrates the lower layers:
//! - [`Database`]: append path, reads, maintenance
//! - [`projection`]: state, relationship and audit views by replay
//! - [`provenance`]: derivation trees with cycle detection
//! - [`cache`]: validated cache of reconstructed state
//!
//! The projection and provenance functions are generic over
//! [`RecordSource`], so they run equally over a live `Database` or a plain
//! slice of records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod database;
pub mod projection;
pub mod provenance;

pub use cache::{CacheStats, ProjectionCache};
pub use database::{AccessMode, Database, DatabaseBuilder, IndexVerification, StoreStats};
pub use eo_durability::{DurabilityMode, RecoveryOptions, RecoveryResult};
pub use projection::{
    audit_trail, connections, fold_state, operator_pattern, reconstruct_state,
    reconstruct_state_at, reconstruct_state_in, AuditEvent, OperatorPattern, RecordSource,
};
pub use provenance::{trace_provenance, ProvenanceNode, ProvenanceTree};
