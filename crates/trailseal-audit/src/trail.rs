//! The audit trail facade handed to collaborators.
//!
//! `AuditTrail` wires one store, one sequencer and one verifier together and
//! exposes the narrow surface the rest of the application uses:
//!
//! - `record_event` after a state-changing operation commits
//! - `verify_chain` for operators and scheduled jobs
//! - `export_entries` / `write_export` for compliance export

use std::io::Write;
use std::sync::Arc;

use tracing::{error, info};

use trailseal_contracts::{
    entry::{AuditEntry, ChainHead, EventInput},
    error::{AuditError, AuditResult},
    verify::{IntegrityAlert, VerifyReport, VerifyRequest},
};
use trailseal_core::{
    sequencer::{Sequencer, SequencerOptions},
    traits::{AlertSink, AuditStore, EntryStream, TracingAlertSink},
    verifier::Verifier,
};

use crate::config::TrailConfig;

/// A bootstrapped, ready-to-write audit trail.
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    sequencer: Sequencer,
    verifier: Verifier,
}

impl AuditTrail {
    /// Open the configured store and recover the chain head from it.
    ///
    /// Integrity alerts go to the `trailseal::security` tracing target.
    pub fn open(config: &TrailConfig) -> AuditResult<Self> {
        Self::open_with_alerts(config, Arc::new(TracingAlertSink))
    }

    pub fn open_with_alerts(config: &TrailConfig, alerts: Arc<dyn AlertSink>) -> AuditResult<Self> {
        let store = config.store.open().inspect_err(|e| {
            error!(error = %e, "audit store failed to open");
            if e.is_integrity() {
                alerts.raise(&IntegrityAlert::new("open", None, e.to_string()));
            }
        })?;
        Self::with_store(store, alerts, config.sequencer.options())
    }

    /// Build a trail over an already-open store.
    pub fn with_store(
        store: Arc<dyn AuditStore>,
        alerts: Arc<dyn AlertSink>,
        options: SequencerOptions,
    ) -> AuditResult<Self> {
        let sequencer = Sequencer::bootstrap(Arc::clone(&store), Arc::clone(&alerts), options)
            .inspect_err(|e| {
                error!(store = %store.describe(), error = %e, "audit trail failed to start");
            })?;
        let verifier = Verifier::new(Arc::clone(&store), alerts);
        info!(
            store = %store.describe(),
            next_index = sequencer.head().next_index(),
            "audit trail ready"
        );
        Ok(Self {
            store,
            sequencer,
            verifier,
        })
    }

    /// Record one security-relevant action.
    ///
    /// Call at most once per logical event, after the action itself has
    /// committed.  On a retryable error (`is_retryable()`) nothing was
    /// recorded and the same event may be submitted again.
    pub fn record_event(
        &self,
        actor_id: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> AuditResult<AuditEntry> {
        self.sequencer
            .record_event(EventInput::new(actor_id, action, entity_type, entity_id))
    }

    /// Record a prepared `EventInput`.
    pub fn record(&self, input: EventInput) -> AuditResult<AuditEntry> {
        self.sequencer.record_event(input)
    }

    /// Append a checkpoint sealing the current head.
    pub fn record_checkpoint(&self, actor_id: &str) -> AuditResult<AuditEntry> {
        self.sequencer.record_checkpoint(actor_id)
    }

    /// Verify from `from` (or the first stored entry), optionally seeded with
    /// the previously verified `curr_hash` of the entry at `from - 1`.
    pub fn verify_chain(&self, from: Option<u64>, seed: Option<&str>) -> AuditResult<VerifyReport> {
        self.verify(&VerifyRequest {
            from,
            to: None,
            seed: seed.map(str::to_string),
        })
    }

    pub fn verify(&self, request: &VerifyRequest) -> AuditResult<VerifyReport> {
        self.verifier.verify(request)
    }

    /// Stored entries from `from` onward, exactly as persisted.
    pub fn export_entries(&self, from: u64) -> AuditResult<EntryStream<'_>> {
        self.store.stream_from(from)
    }

    /// Write entries from `from` onward as JSON Lines.  Returns the count.
    ///
    /// Each line carries the entry's `hash_scheme`, so the export can be
    /// re-verified without this process.
    pub fn write_export<W: Write>(&self, from: u64, mut out: W) -> AuditResult<u64> {
        let mut written = 0u64;
        for entry in self.export_entries(from)? {
            let entry = entry?;
            serde_json::to_writer(&mut out, &entry)
                .map_err(|e| AuditError::transient(format!("failed to write export: {}", e)))?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;
        info!(from, entries = written, "audit entries exported");
        Ok(written)
    }

    pub fn head(&self) -> ChainHead {
        self.sequencer.head()
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }
}
