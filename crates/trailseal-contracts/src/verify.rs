//! Verification requests, reports and integrity alerts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which part of the chain to verify.
///
/// The default request covers the whole stored chain.  A request starting
/// past the first stored entry must carry a `seed`: the `curr_hash` of the
/// entry at `from - 1`, taken from an earlier successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// First index to check.  `None` starts at the first stored entry.
    pub from: Option<u64>,
    /// Last index to check, inclusive.  `None` stops at the latest entry seen
    /// when verification starts.
    pub to: Option<u64>,
    /// Expected `prev_hash` of the entry at `from`.
    pub seed: Option<String>,
}

impl VerifyRequest {
    /// Verify everything that is stored.
    pub fn full() -> Self {
        Self::default()
    }

    /// Verify from `from` onward, trusting a previously verified `seed`.
    pub fn seeded(from: u64, seed: impl Into<String>) -> Self {
        Self {
            from: Some(from),
            to: None,
            seed: Some(seed.into()),
        }
    }

    pub fn until(mut self, to: u64) -> Self {
        self.to = Some(to);
        self
    }
}

/// Why verification stopped at a given entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// `sequence_index` is not the predecessor's index + 1.
    SequenceGap,
    /// `prev_hash` differs from the predecessor's `curr_hash` (or the seed).
    PrevHashMismatch,
    /// `curr_hash` does not reproduce from the entry's own fields.
    HashMismatch,
    /// `timestamp` is earlier than the predecessor's.
    TimestampRegression,
    /// The chain starts past index 0 without a checkpoint to anchor it.
    MissingCheckpoint,
    /// The entry names a hashing scheme this build cannot apply.
    UnsupportedScheme,
}

impl BreakReason {
    /// Whether the break is a broken link (as opposed to a bad entry).
    pub fn is_continuity(&self) -> bool {
        matches!(
            self,
            BreakReason::SequenceGap
                | BreakReason::PrevHashMismatch
                | BreakReason::TimestampRegression
                | BreakReason::MissingCheckpoint
        )
    }
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakReason::SequenceGap => "sequence gap",
            BreakReason::PrevHashMismatch => "prev_hash does not match predecessor",
            BreakReason::HashMismatch => "curr_hash does not reproduce",
            BreakReason::TimestampRegression => "timestamp earlier than predecessor",
            BreakReason::MissingCheckpoint => "purged prefix without checkpoint",
            BreakReason::UnsupportedScheme => "unsupported hash scheme",
        };
        f.write_str(s)
    }
}

/// Outcome of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub valid: bool,
    /// Entries that passed every check.
    pub entries_checked: u64,
    /// Index of the first entry that failed, if any.
    pub broken_at: Option<u64>,
    pub reason: Option<BreakReason>,
    /// Human-readable detail for the break.
    pub detail: Option<String>,
    /// `(index, curr_hash)` of the last entry that passed.  Feed it back as
    /// `VerifyRequest::seeded(index + 1, curr_hash)` to continue later.
    pub last_verified: Option<(u64, String)>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// An integrity failure raised to the operator channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAlert {
    /// Where the failure was found: `"bootstrap"`, `"verify"` or `"append"`.
    pub source: String,
    pub sequence_index: Option<u64>,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

impl IntegrityAlert {
    pub fn new(source: impl Into<String>, sequence_index: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sequence_index,
            reason: reason.into(),
            detected_at: Utc::now(),
        }
    }
}
