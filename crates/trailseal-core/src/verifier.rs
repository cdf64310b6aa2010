//! Chain verification.
//!
//! The verifier walks stored entries in ascending index order and checks,
//! per entry and in this order:
//!
//! 1. **Contiguity**: `sequence_index` is the predecessor's index + 1.
//! 2. **Scheme**: the entry's hash scheme is one this build implements.
//! 3. **Link**: `prev_hash` equals the predecessor's `curr_hash` (or the seed,
//!    or `GENESIS_HASH` at index 0).  A chain whose first stored entry is past
//!    index 0 must start with a checkpoint naming its own predecessor.
//! 4. **Hash**: `curr_hash` reproduces from the entry's own fields.
//! 5. **Time**: `timestamp` is not earlier than the predecessor's.
//!
//! Because the hash check of entry *k* runs before the link check of entry
//! *k + 1*, editing a field of entry *k* in storage is reported at *k* as
//! `BreakReason::HashMismatch`.
//!
//! Verification only reads.  It never takes the sequencer's lock and tolerates
//! a tail that keeps growing: the range ends at whatever `latest()` returned
//! when the run started.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use trailseal_contracts::{
    entry::{AuditEntry, HashScheme, GENESIS_HASH},
    error::{AuditError, AuditResult},
    verify::{BreakReason, IntegrityAlert, VerifyReport, VerifyRequest},
};

use crate::{
    chain::recompute,
    traits::{AlertSink, AuditStore},
};

/// A detected break: where, why, and a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub index: u64,
    pub reason: BreakReason,
    pub detail: String,
    /// `(stored, recomputed)` for hash mismatches.
    pub hashes: Option<(String, String)>,
}

impl ChainBreak {
    fn new(index: u64, reason: BreakReason, detail: impl Into<String>) -> Self {
        Self {
            index,
            reason,
            detail: detail.into(),
            hashes: None,
        }
    }

    /// The matching `AuditError` for callers that must fail hard.
    pub fn into_error(self) -> AuditError {
        match self.reason {
            BreakReason::HashMismatch => {
                let (stored, recomputed) = self.hashes.unwrap_or_default();
                AuditError::HashMismatch {
                    index: self.index,
                    stored,
                    recomputed,
                }
            }
            BreakReason::UnsupportedScheme => AuditError::UnsupportedScheme {
                scheme: self.detail,
            },
            _ => AuditError::ChainContinuity {
                index: self.index,
                reason: format!("{}: {}", self.reason, self.detail),
            },
        }
    }
}

/// Incremental checker: feed entries in order, get the first break.
#[derive(Debug, Clone)]
pub struct ChainWalker {
    expected_index: u64,
    /// `None` means the first entry must anchor itself as a checkpoint.
    expected_prev: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    checked: u64,
    last_verified: Option<(u64, String)>,
}

impl ChainWalker {
    /// Walk a chain from index 0.
    pub fn from_genesis() -> Self {
        Self::seeded(0, GENESIS_HASH)
    }

    /// Walk from `index`, trusting `seed` as the predecessor's `curr_hash`.
    pub fn seeded(index: u64, seed: impl Into<String>) -> Self {
        Self {
            expected_index: index,
            expected_prev: Some(seed.into()),
            last_timestamp: None,
            checked: 0,
            last_verified: None,
        }
    }

    /// Walk a chain whose prefix before `index` was purged.
    pub fn from_checkpoint(index: u64) -> Self {
        Self {
            expected_index: index,
            expected_prev: None,
            last_timestamp: None,
            checked: 0,
            last_verified: None,
        }
    }

    /// Index the next entry must carry.
    pub fn expected_index(&self) -> u64 {
        self.expected_index
    }

    /// Check one entry and advance on success.
    pub fn check(&mut self, entry: &AuditEntry) -> Result<(), ChainBreak> {
        let index = entry.sequence_index;

        if index != self.expected_index {
            return Err(ChainBreak::new(
                index,
                BreakReason::SequenceGap,
                format!("expected index {}, found {}", self.expected_index, index),
            ));
        }

        if entry.hash_scheme == HashScheme::Unrecognized {
            return Err(ChainBreak::new(
                index,
                BreakReason::UnsupportedScheme,
                entry.hash_scheme.to_string(),
            ));
        }

        match &self.expected_prev {
            Some(expected) if entry.prev_hash != *expected => {
                return Err(ChainBreak::new(
                    index,
                    BreakReason::PrevHashMismatch,
                    format!("expected prev_hash {}, found {}", expected, entry.prev_hash),
                ));
            }
            Some(_) => {}
            None => {
                // checked_sub: a planted target of u64::MAX must not overflow.
                let anchored = entry.checkpoint_target().is_some_and(|(i, h)| {
                    index.checked_sub(1) == Some(i) && h == entry.prev_hash
                });
                if !anchored {
                    return Err(ChainBreak::new(
                        index,
                        BreakReason::MissingCheckpoint,
                        "first stored entry is not a checkpoint sealing its predecessor",
                    ));
                }
            }
        }

        let recomputed = recompute(entry).map_err(|e| {
            ChainBreak::new(index, BreakReason::UnsupportedScheme, e.to_string())
        })?;
        if recomputed != entry.curr_hash {
            let mut brk = ChainBreak::new(
                index,
                BreakReason::HashMismatch,
                format!("stored {}, recomputed {}", entry.curr_hash, recomputed),
            );
            brk.hashes = Some((entry.curr_hash.clone(), recomputed));
            return Err(brk);
        }

        if let Some(last) = self.last_timestamp {
            if entry.timestamp < last {
                return Err(ChainBreak::new(
                    index,
                    BreakReason::TimestampRegression,
                    format!("{} is earlier than {}", entry.timestamp, last),
                ));
            }
        }

        self.expected_index = index + 1;
        self.expected_prev = Some(entry.curr_hash.clone());
        self.last_timestamp = Some(entry.timestamp);
        self.checked += 1;
        self.last_verified = Some((index, entry.curr_hash.clone()));
        Ok(())
    }

    pub fn valid_report(&self) -> VerifyReport {
        VerifyReport {
            valid: true,
            entries_checked: self.checked,
            broken_at: None,
            reason: None,
            detail: None,
            last_verified: self.last_verified.clone(),
        }
    }

    pub fn broken_report(&self, brk: &ChainBreak) -> VerifyReport {
        VerifyReport {
            valid: false,
            entries_checked: self.checked,
            broken_at: Some(brk.index),
            reason: Some(brk.reason),
            detail: Some(brk.detail.clone()),
            last_verified: self.last_verified.clone(),
        }
    }
}

/// Verify an in-memory slice of entries, e.g. an export read back from disk.
///
/// `seed` is the expected `prev_hash` of the first entry; `None` means the
/// slice starts at genesis (or at a checkpoint when its first index is > 0).
pub fn verify_entries(entries: &[AuditEntry], seed: Option<&str>) -> VerifyReport {
    let mut walker = match (entries.first(), seed) {
        (None, _) => return ChainWalker::from_genesis().valid_report(),
        (Some(first), Some(seed)) => ChainWalker::seeded(first.sequence_index, seed),
        (Some(first), None) if first.sequence_index == 0 => ChainWalker::from_genesis(),
        (Some(first), None) => ChainWalker::from_checkpoint(first.sequence_index),
    };
    for entry in entries {
        if let Err(brk) = walker.check(entry) {
            return walker.broken_report(&brk);
        }
    }
    walker.valid_report()
}

/// Streams the stored chain and reports the first break.
pub struct Verifier {
    store: Arc<dyn AuditStore>,
    alerts: Arc<dyn AlertSink>,
}

enum Outcome {
    Valid(VerifyReport),
    Broken(VerifyReport, ChainBreak),
}

impl Verifier {
    pub fn new(store: Arc<dyn AuditStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    /// Verify the requested range.
    ///
    /// Integrity breaks come back as `Ok` with `valid == false` and are also
    /// raised on the alert sink.  Store read failures come back as `Err`.
    pub fn verify(&self, request: &VerifyRequest) -> AuditResult<VerifyReport> {
        match self.walk(request)? {
            Outcome::Valid(report) | Outcome::Broken(report, _) => Ok(report),
        }
    }

    /// Like `verify`, but a break is returned as the matching integrity error
    /// (`ChainContinuity`, `HashMismatch` or `UnsupportedScheme`).
    pub fn verify_strict(&self, request: &VerifyRequest) -> AuditResult<VerifyReport> {
        match self.walk(request)? {
            Outcome::Valid(report) => Ok(report),
            Outcome::Broken(_, brk) => Err(brk.into_error()),
        }
    }

    fn walk(&self, request: &VerifyRequest) -> AuditResult<Outcome> {
        let Some(latest) = self.store.latest()? else {
            debug!(store = %self.store.describe(), "verifying empty chain");
            return Ok(Outcome::Valid(ChainWalker::from_genesis().valid_report()));
        };
        let end = request
            .to
            .map_or(latest.sequence_index, |to| to.min(latest.sequence_index));

        let first_index = match self.store.stream_from(0)?.next().transpose()? {
            Some(first) => first.sequence_index,
            None => return Ok(Outcome::Valid(ChainWalker::from_genesis().valid_report())),
        };
        let start = request.from.unwrap_or(first_index);

        if start < first_index {
            return Err(AuditError::InvalidRange {
                reason: format!(
                    "entries before index {} were purged; start at the checkpoint",
                    first_index
                ),
            });
        }

        let mut walker = match &request.seed {
            Some(seed) => ChainWalker::seeded(start, seed.clone()),
            None if start > first_index => {
                return Err(AuditError::InvalidRange {
                    reason: format!(
                        "verification from index {} needs a previously verified seed hash",
                        start
                    ),
                });
            }
            None if start == 0 => ChainWalker::from_genesis(),
            None => ChainWalker::from_checkpoint(start),
        };

        if start > end {
            return Ok(Outcome::Valid(walker.valid_report()));
        }

        debug!(
            store = %self.store.describe(),
            from = start,
            to = end,
            seeded = request.seed.is_some(),
            "verifying chain"
        );

        for item in self.store.stream_from(start)? {
            let entry = item.inspect_err(|e| {
                if e.is_integrity() {
                    self.alerts
                        .raise(&IntegrityAlert::new("verify", None, e.to_string()));
                }
            })?;
            if let Err(brk) = walker.check(&entry) {
                return Ok(self.broken(&walker, brk));
            }
            if entry.sequence_index == end {
                break;
            }
        }

        if walker.expected_index() <= end {
            let brk = ChainBreak::new(
                walker.expected_index(),
                BreakReason::SequenceGap,
                format!("store ended before index {} reported by latest()", end),
            );
            return Ok(self.broken(&walker, brk));
        }

        let report = walker.valid_report();
        info!(
            entries_checked = report.entries_checked,
            from = start,
            to = end,
            "audit chain verified"
        );
        Ok(Outcome::Valid(report))
    }

    fn broken(&self, walker: &ChainWalker, brk: ChainBreak) -> Outcome {
        warn!(
            sequence_index = brk.index,
            reason = %brk.reason,
            "audit chain verification failed"
        );
        self.alerts.raise(&IntegrityAlert::new(
            "verify",
            Some(brk.index),
            format!("{}: {}", brk.reason, brk.detail),
        ));
        Outcome::Broken(walker.broken_report(&brk), brk)
    }
}
