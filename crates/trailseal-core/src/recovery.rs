//! Recovery of the chain head on process start.
//!
//! The head is rebuilt from the store's latest entry, never assumed empty.
//! Starting from genesis while entries exist would silently begin a second,
//! disconnected chain.

use std::sync::Arc;

use tracing::{info, warn};

use trailseal_contracts::{
    entry::{AuditEntry, ChainHead},
    error::{AuditError, AuditResult},
    verify::{IntegrityAlert, VerifyRequest},
};

use crate::{
    chain::recompute,
    traits::{AlertSink, AuditStore},
    verifier::Verifier,
};

/// Rebuild the chain head from durable storage.
///
/// - An empty store yields the genesis head.
/// - The latest entry's hash must reproduce, else `HashMismatch`.
/// - With `verify_on_startup`, the whole chain is verified first and the
///   first break is returned as an integrity error.
/// - `BootstrapAmbiguity` from the store halts startup.
///
/// Every integrity failure is also raised on `alerts`.
pub fn recover_head(
    store: &Arc<dyn AuditStore>,
    alerts: &Arc<dyn AlertSink>,
    verify_on_startup: bool,
) -> AuditResult<ChainHead> {
    let latest = store.latest().inspect_err(|e| {
        if e.is_integrity() {
            alerts.raise(&IntegrityAlert::new("bootstrap", None, e.to_string()));
        }
    })?;

    let Some(latest) = latest else {
        info!(store = %store.describe(), "empty audit store, chain starts at genesis");
        return Ok(ChainHead::genesis());
    };

    if verify_on_startup {
        let report = Verifier::new(Arc::clone(store), Arc::clone(alerts))
            .verify_strict(&VerifyRequest::full())?;
        info!(
            entries_checked = report.entries_checked,
            "startup verification passed"
        );
    }

    let head = trusted_head(&latest, alerts.as_ref(), "bootstrap")?;
    info!(
        store = %store.describe(),
        sequence_index = latest.sequence_index,
        last_hash = %head.last_hash,
        "chain head recovered from store"
    );
    Ok(head)
}

/// Accept `latest` as the head only if its own hash reproduces.
pub(crate) fn trusted_head(
    latest: &AuditEntry,
    alerts: &dyn AlertSink,
    source: &str,
) -> AuditResult<ChainHead> {
    let recomputed = recompute(latest)?;
    if recomputed != latest.curr_hash {
        warn!(
            sequence_index = latest.sequence_index,
            "latest entry does not reproduce its hash"
        );
        let err = AuditError::HashMismatch {
            index: latest.sequence_index,
            stored: latest.curr_hash.clone(),
            recomputed,
        };
        alerts.raise(&IntegrityAlert::new(
            source,
            Some(latest.sequence_index),
            err.to_string(),
        ));
        return Err(err);
    }
    Ok(ChainHead::from_entry(latest))
}
