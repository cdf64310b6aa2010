//! The sequencer: the single serialization point for appends.
//!
//! Every append runs as one critical section under the head mutex:
//!
//!   lock head → read (last_hash, last_index) → hash → store.append → advance head
//!
//! The head advances only after the store confirms the append.  If the append
//! fails, or the lock cannot be taken in time, the head is left exactly as it
//! was.  Two callers can therefore never build on the same head, and the head
//! never runs ahead of what is durable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use trailseal_contracts::{
    entry::{
        checkpoint_entity_id, truncate_to_micros, AuditEntry, ChainHead, EventInput, HashScheme,
        CHECKPOINT_ACTION, CHECKPOINT_ENTITY,
    },
    error::{AuditError, AuditResult},
};

use crate::{
    chain::{compute_link, LinkFields},
    recovery::{recover_head, trusted_head},
    traits::{AlertSink, AuditStore},
};

/// Startup and locking behaviour of a `Sequencer`.
#[derive(Debug, Clone, Default)]
pub struct SequencerOptions {
    /// Longest a caller waits for the head before getting `Timeout`.
    /// `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,
    /// Verify the whole stored chain before accepting writes.
    pub verify_on_startup: bool,
}

/// Owns the chain head and appends entries one at a time.
pub struct Sequencer {
    store: Arc<dyn AuditStore>,
    alerts: Arc<dyn AlertSink>,
    pub(crate) head: Mutex<ChainHead>,
    lock_timeout: Option<Duration>,
}

impl Sequencer {
    /// Recover the head from `store` and return a ready sequencer.
    ///
    /// Fails, and must not be retried blindly, when recovery finds an
    /// integrity problem (`HashMismatch`, `ChainContinuity`,
    /// `BootstrapAmbiguity`).
    pub fn bootstrap(
        store: Arc<dyn AuditStore>,
        alerts: Arc<dyn AlertSink>,
        options: SequencerOptions,
    ) -> AuditResult<Self> {
        let head = recover_head(&store, &alerts, options.verify_on_startup)?;
        Ok(Self {
            store,
            alerts,
            head: Mutex::new(head),
            lock_timeout: options.lock_timeout,
        })
    }

    /// A snapshot of the current head.
    pub fn head(&self) -> ChainHead {
        self.head.lock().clone()
    }

    /// Append one event, waiting at most the configured lock timeout.
    pub fn record_event(&self, input: EventInput) -> AuditResult<AuditEntry> {
        self.record(input, self.lock_timeout)
    }

    /// Append one event, waiting at most `timeout` for the head.
    pub fn record_event_within(
        &self,
        input: EventInput,
        timeout: Duration,
    ) -> AuditResult<AuditEntry> {
        self.record(input, Some(timeout))
    }

    /// Append a checkpoint sealing the current head.
    ///
    /// The checkpoint's entity id is `"{index}:{hash}"` of the entry it
    /// follows.  Once written, the prefix before it may be purged by an
    /// administrator and the checkpoint serves as the chain's new anchor.
    pub fn record_checkpoint(&self, actor_id: &str) -> AuditResult<AuditEntry> {
        let mut head = self.lock_head(self.lock_timeout)?;
        let Some(last_index) = head.last_sequence_index else {
            return Err(AuditError::InvalidEvent {
                reason: "cannot checkpoint an empty chain".to_string(),
            });
        };
        let input = EventInput::new(
            actor_id,
            CHECKPOINT_ACTION,
            CHECKPOINT_ENTITY,
            checkpoint_entity_id(last_index, &head.last_hash),
        );
        input.validate()?;
        let entry = self.append_locked(&mut head, &input)?;
        info!(
            sequence_index = entry.sequence_index,
            sealed_index = last_index,
            "checkpoint recorded"
        );
        Ok(entry)
    }

    fn record(&self, input: EventInput, timeout: Option<Duration>) -> AuditResult<AuditEntry> {
        input.validate()?;
        let mut head = self.lock_head(timeout)?;
        self.append_locked(&mut head, &input)
    }

    fn lock_head(&self, timeout: Option<Duration>) -> AuditResult<MutexGuard<'_, ChainHead>> {
        match timeout {
            None => Ok(self.head.lock()),
            Some(limit) => self.head.try_lock_for(limit).ok_or_else(|| {
                warn!(waited_ms = limit.as_millis() as u64, "timed out waiting for chain head");
                AuditError::Timeout {
                    waited_ms: limit.as_millis() as u64,
                }
            }),
        }
    }

    /// The critical section.  `head` is held for the whole call.
    fn append_locked(&self, head: &mut ChainHead, input: &EventInput) -> AuditResult<AuditEntry> {
        let now = truncate_to_micros(Utc::now());
        let timestamp = head.last_timestamp.map_or(now, |last| last.max(now));

        let prev_hash = head.last_hash.clone();
        let sequence_index = head.next_index();
        let curr_hash = compute_link(&prev_hash, &LinkFields::from_input(input, timestamp));

        let entry = AuditEntry {
            id: Uuid::new_v4(),
            sequence_index,
            actor_id: input.actor_id.clone(),
            action: input.action.clone(),
            entity_type: input.entity_type.clone(),
            entity_id: input.entity_id.clone(),
            prev_hash,
            curr_hash,
            timestamp,
            hash_scheme: HashScheme::CURRENT,
        };

        match self.store.append(&entry) {
            Ok(()) => {
                *head = ChainHead::from_entry(&entry);
                debug!(
                    sequence_index,
                    action = %entry.action,
                    curr_hash = %entry.curr_hash,
                    "audit entry appended"
                );
                Ok(entry)
            }
            Err(err @ AuditError::SequenceConflict { .. }) => {
                warn!(
                    sequence_index,
                    error = %err,
                    store = %self.store.describe(),
                    "store moved past our head, resynchronising"
                );
                self.resync(head)?;
                Err(err)
            }
            Err(err) => {
                warn!(
                    sequence_index,
                    action = %entry.action,
                    error = %err,
                    "audit append failed, head unchanged"
                );
                Err(err)
            }
        }
    }

    /// Reload the head after another writer appended behind our back.
    fn resync(&self, head: &mut ChainHead) -> AuditResult<()> {
        *head = match self.store.latest()? {
            Some(latest) => trusted_head(&latest, self.alerts.as_ref(), "append")?,
            None => ChainHead::genesis(),
        };
        Ok(())
    }
}
