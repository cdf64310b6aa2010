//! # trailseal-core
//!
//! The chain logic of the trailseal audit trail.
//!
//! This crate provides:
//! - The trust-boundary traits (`AuditStore`, `AlertSink`)
//! - The hasher (`chain::compute_link`)
//! - The `Sequencer`, which serializes appends and owns the chain head
//! - Recovery of the head from storage on startup
//! - The `Verifier`, which walks the stored chain and reports the first break
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trailseal_core::{Sequencer, SequencerOptions, TracingAlertSink, Verifier};
//!
//! let sequencer = Sequencer::bootstrap(store.clone(), Arc::new(TracingAlertSink), SequencerOptions::default())?;
//! let entry = sequencer.record_event(EventInput::new("u1", "complaint.submit", "complaint", "c-100"))?;
//! let report = Verifier::new(store, Arc::new(TracingAlertSink)).verify(&VerifyRequest::full())?;
//! ```

pub mod chain;
pub mod recovery;
pub mod sequencer;
pub mod traits;
pub mod verifier;

pub use chain::{compute_link, recompute, LinkFields};
pub use sequencer::{Sequencer, SequencerOptions};
pub use traits::{AlertSink, AuditStore, EntryStream, TracingAlertSink, SECURITY_TARGET};
pub use verifier::{verify_entries, ChainWalker, Verifier};

// ── Tests ─────────────────────────────────────────────────────────────────────
