//! Trait definitions at the trailseal trust boundary.
//!
//! - `AuditStore` is durable, append-only storage for chain entries
//! - `AlertSink` is the operator-visible channel for integrity failures
//!
//! The sequencer and verifier only ever talk to storage through `AuditStore`,
//! so the chain logic is identical for every backend.

use tracing::error;

use trailseal_contracts::{
    entry::AuditEntry,
    error::AuditResult,
    verify::IntegrityAlert,
};

/// A lazy, ordered sequence of stored entries.
pub type EntryStream<'a> = Box<dyn Iterator<Item = AuditResult<AuditEntry>> + Send + 'a>;

/// Append-only durable storage for audit entries.
///
/// Implementations must never expose a partially written entry and must
/// refuse (with `AuditError::SequenceConflict`) any append whose
/// `sequence_index` is not the store's next index.  That check is what keeps
/// a stale writer from forking the chain.
pub trait AuditStore: Send + Sync {
    /// Durably persist one entry, in full or not at all.
    ///
    /// A failure here must be surfaced, never swallowed: a silently dropped
    /// entry breaks continuity for every later entry.
    fn append(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// The entry with the highest `sequence_index`, or `None` for a store that
    /// has never been written.
    ///
    /// Returns `AuditError::BootstrapAmbiguity` when the store cannot tell
    /// which entry is the latest.
    fn latest(&self) -> AuditResult<Option<AuditEntry>>;

    /// Entries with `sequence_index >= index`, ascending.
    ///
    /// Each call starts a fresh stream.  The stream ends at whatever was
    /// committed when it was opened; appends made afterwards are not seen.
    fn stream_from(&self, index: u64) -> AuditResult<EntryStream<'_>>;

    /// Short description for log lines, e.g. `file:/var/lib/audit.jsonl`.
    fn describe(&self) -> String;
}

/// Receives integrity failures.  Must be distinct from ordinary logging.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &IntegrityAlert);
}

/// Tracing target integrity alerts are emitted on.
pub const SECURITY_TARGET: &str = "trailseal::security";

/// Default `AlertSink`: an `error!` event on the `trailseal::security` target,
/// which subscribers can route away from application logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: &IntegrityAlert) {
        error!(
            target: SECURITY_TARGET,
            source = %alert.source,
            sequence_index = ?alert.sequence_index,
            detected_at = %alert.detected_at,
            reason = %alert.reason,
            "audit chain integrity failure"
        );
    }
}
