//! # trailseal-contracts
//!
//! Shared types and error contracts for the trailseal audit trail.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod entry;
pub mod error;
pub mod verify;

pub use entry::{AuditEntry, ChainHead, EventInput, HashScheme, GENESIS_HASH, SYSTEM_ACTOR};
pub use error::{AuditError, AuditResult};
pub use verify::{BreakReason, IntegrityAlert, VerifyReport, VerifyRequest};
