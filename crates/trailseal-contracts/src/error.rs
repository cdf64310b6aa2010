//! Error types for the trailseal audit trail.
//!
//! Every fallible operation returns `AuditResult<T>`.  Variants fall into two
//! families: write-path failures the caller may retry, and integrity failures
//! that must reach an operator and are never retried automatically.

use thiserror::Error;

/// The unified error type for the trailseal crates.
#[derive(Debug, Error)]
pub enum AuditError {
    /// An append or read failed for a recoverable reason (I/O error,
    /// temporary unavailability).  The chain head is unchanged.
    #[error("transient store error: {reason}")]
    TransientStore { reason: String },

    /// The chain head could not be acquired within the allowed time.
    /// Nothing was written and the head is unchanged.
    #[error("timed out after {waited_ms}ms waiting for the chain head")]
    Timeout { waited_ms: u64 },

    /// The store refused an append because its next index differs from the
    /// one the writer assumed.  Another writer got there first.
    #[error("sequence conflict: store expects index {expected}, writer offered {offered}")]
    SequenceConflict { expected: u64, offered: u64 },

    /// A `prev_hash` or `sequence_index` does not line up with its predecessor.
    #[error("chain continuity broken at index {index}: {reason}")]
    ChainContinuity { index: u64, reason: String },

    /// A stored `curr_hash` does not reproduce from the entry's own fields.
    #[error("hash mismatch at index {index}: stored {stored}, recomputed {recomputed}")]
    HashMismatch {
        index: u64,
        stored: String,
        recomputed: String,
    },

    /// The store's view of the latest entry cannot be trusted.
    ///
    /// Startup halts rather than guessing which entry is authoritative.
    #[error("bootstrap ambiguity: {reason}")]
    BootstrapAmbiguity { reason: String },

    /// The event submitted to `record_event` is malformed.
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// A verification range cannot be honoured as requested.
    #[error("invalid verification range: {reason}")]
    InvalidRange { reason: String },

    /// An entry names a hashing scheme this build does not implement.
    #[error("unsupported hash scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl AuditError {
    /// True for write-path failures after which the caller may retry the
    /// same event.  The head is guaranteed unchanged for all of them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::TransientStore { .. }
                | AuditError::Timeout { .. }
                | AuditError::SequenceConflict { .. }
        )
    }

    /// True for failures that indicate possible tampering.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            AuditError::ChainContinuity { .. }
                | AuditError::HashMismatch { .. }
                | AuditError::BootstrapAmbiguity { .. }
        )
    }

    /// Shorthand for wrapping an I/O or backend failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        AuditError::TransientStore {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        AuditError::TransientStore {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the trailseal crates.
pub type AuditResult<T> = Result<T, AuditError>;
