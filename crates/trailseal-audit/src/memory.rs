//! In-memory implementation of `AuditStore`.
//!
//! `MemoryStore` keeps all entries in a `Vec` behind an `RwLock`.  It is the
//! backend for tests and for deployments that only need a chain for the life
//! of the process.  Besides the trait it offers two administrative hooks:
//! `fail_next_appends` to exercise transient failures, and `purge_before`
//! to drop a prefix that has been sealed by a checkpoint.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{info, warn};

use trailseal_contracts::{
    entry::AuditEntry,
    error::{AuditError, AuditResult},
};
use trailseal_core::traits::{AuditStore, EntryStream};

/// An append-only, in-memory entry store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) entries: RwLock<Vec<AuditEntry>>,
    /// Number of upcoming appends that will fail with `TransientStore`.
    failures: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail as if the backend were unavailable.
    pub fn fail_next_appends(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Administrative retention purge: drop every entry before `index`.
    ///
    /// The entry at `index` must be a checkpoint sealing its predecessor, so
    /// the verifier can treat it as the chain's new anchor.  Returns the number
    /// of entries removed.
    pub fn purge_before(&self, index: u64) -> AuditResult<usize> {
        let mut entries = self.entries.write();
        let anchor = entries
            .iter()
            .find(|e| e.sequence_index == index)
            .ok_or_else(|| AuditError::InvalidRange {
                reason: format!("no entry at index {}", index),
            })?;
        match anchor.checkpoint_target() {
            Some((sealed, _)) if index.checked_sub(1) == Some(sealed) => {}
            Some((sealed, _)) => {
                return Err(AuditError::InvalidRange {
                    reason: format!(
                        "checkpoint at {} seals index {}, not its predecessor",
                        index, sealed
                    ),
                });
            }
            None => {
                return Err(AuditError::InvalidRange {
                    reason: format!("entry {} is not a checkpoint", index),
                });
            }
        }

        let before = entries.len();
        entries.retain(|e| e.sequence_index >= index);
        let removed = before - entries.len();
        info!(removed, anchor = index, "purged audit prefix");
        Ok(removed)
    }

    /// Rewrite a stored entry in place, bypassing the append-only contract.
    #[cfg(test)]
    pub(crate) fn tamper(&self, index: u64, f: impl FnOnce(&mut AuditEntry)) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.sequence_index == index) {
            f(entry);
        }
    }
}

impl AuditStore for MemoryStore {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            warn!(sequence_index = entry.sequence_index, "injected append failure");
            return Err(AuditError::transient("memory store unavailable"));
        }

        let mut entries = self.entries.write();
        let expected = entries.last().map_or(0, |e| e.sequence_index + 1);
        if entry.sequence_index != expected {
            return Err(AuditError::SequenceConflict {
                expected,
                offered: entry.sequence_index,
            });
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn latest(&self) -> AuditResult<Option<AuditEntry>> {
        Ok(self.entries.read().last().cloned())
    }

    fn stream_from(&self, index: u64) -> AuditResult<EntryStream<'_>> {
        // Snapshot the tail so the read lock is not held while the caller
        // iterates; appends after this point are not part of the stream.
        let entries = self.entries.read();
        let start = entries.partition_point(|e| e.sequence_index < index);
        let tail = entries[start..].to_vec();
        Ok(Box::new(tail.into_iter().map(Ok)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
