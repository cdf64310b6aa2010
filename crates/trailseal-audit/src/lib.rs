//! # trailseal-audit
//!
//! Durable, append-only store adapters and the audit trail facade.
//!
//! ## Overview
//!
//! Every security-relevant action (login exchange, complaint submission,
//! profile or settings change) is recorded through `AuditTrail::record_event`
//! as an `AuditEntry` that links to the previous entry via its SHA-256 hash.
//! Editing, removing or reordering stored entries breaks the chain, and
//! `AuditTrail::verify_chain` reports the first entry where it breaks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trailseal_audit::{AuditTrail, TrailConfig};
//!
//! let trail = AuditTrail::open(&TrailConfig::file("var/audit.jsonl"))?;
//! trail.record_event("u1", "complaint.submit", "complaint", "c-100")?;
//!
//! let report = trail.verify_chain(None, None)?;
//! assert!(report.valid);
//! ```

pub mod config;
pub mod file;
pub mod memory;
pub mod trail;

pub use config::{SequencerConfig, StoreConfig, TrailConfig};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use trail::AuditTrail;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use trailseal_contracts::{
        entry::{AuditEntry, GENESIS_HASH},
        error::AuditError,
        verify::{BreakReason, IntegrityAlert},
    };
    use trailseal_core::{
        chain::{compute_link, LinkFields},
        sequencer::SequencerOptions,
        traits::{AlertSink, AuditStore},
        verifier::verify_entries,
    };

    use super::{AuditTrail, FileStore, MemoryStore, TrailConfig};

    // ── Helpers ───────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct CollectingSink {
        alerts: Mutex<Vec<IntegrityAlert>>,
    }

    impl CollectingSink {
        fn count(&self) -> usize {
            self.alerts.lock().unwrap().len()
        }
    }

    impl AlertSink for CollectingSink {
        fn raise(&self, alert: &IntegrityAlert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    fn open_file_trail(path: &Path) -> AuditTrail {
        AuditTrail::open(&TrailConfig::file(path)).unwrap()
    }

    fn memory_trail() -> (Arc<MemoryStore>, Arc<CollectingSink>, AuditTrail) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::default());
        let trail =
            AuditTrail::with_store(store.clone(), sink.clone(), SequencerOptions::default())
                .unwrap();
        (store, sink, trail)
    }

    fn read_lines(path: &Path) -> Vec<AuditEntry> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn write_lines(path: &Path, entries: &[AuditEntry]) {
        let mut out = String::new();
        for e in entries {
            out.push_str(&serde_json::to_string(e).unwrap());
            out.push('\n');
        }
        std::fs::write(path, out).unwrap();
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    /// `record_event` on an empty chain produces index 0 linked to genesis.
    #[test]
    fn test_example_scenario() {
        let (_, _, trail) = memory_trail();
        let entry = trail
            .record_event("u1", "complaint.submit", "complaint", "c-100")
            .unwrap();

        assert_eq!(entry.sequence_index, 0);
        assert_eq!(entry.prev_hash, GENESIS_HASH);
        assert_eq!(
            entry.curr_hash,
            compute_link(GENESIS_HASH, &LinkFields::of(&entry))
        );
    }

    /// Failed appends never show up in the store and never advance the head.
    #[test]
    fn test_no_lost_advances() {
        let (store, _, trail) = memory_trail();
        trail.record_event("u1", "login", "session", "s-1").unwrap();
        let before = store.latest().unwrap();

        store.fail_next_appends(2);
        for _ in 0..2 {
            let err = trail
                .record_event("u1", "settings.update", "settings", "u1")
                .unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(store.latest().unwrap(), before);
        assert_eq!(store.len(), 1);

        let retried = trail
            .record_event("u1", "settings.update", "settings", "u1")
            .unwrap();
        assert_eq!(retried.sequence_index, 1);
        assert!(trail.verify_chain(Some(0), None).unwrap().valid);
    }

    /// Concurrent writers through the facade yield one contiguous chain.
    #[test]
    fn test_concurrent_record_event() {
        let (store, _, trail) = memory_trail();
        std::thread::scope(|s| {
            for t in 0..6 {
                let trail = &trail;
                s.spawn(move || {
                    for i in 0..20 {
                        trail
                            .record_event(&format!("u{}", t), "complaint.submit", "complaint", &format!("c-{}-{}", t, i))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(store.len(), 120);
        let report = trail.verify_chain(Some(0), None).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 120);
    }

    // ── File store ────────────────────────────────────────────────────────────

    /// Record 3, reopen the file, record 2: one valid chain of 5 on disk.
    #[test]
    fn test_file_restart_continuity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let trail = open_file_trail(&path);
            for i in 0..3 {
                trail
                    .record_event("u1", "complaint.submit", "complaint", &format!("c-{}", i))
                    .unwrap();
            }
        }

        let trail = open_file_trail(&path);
        assert_eq!(trail.head().next_index(), 3);
        trail.record_event("u2", "profile.update", "user", "u2").unwrap();
        trail.record_event("u2", "logout", "session", "s-7").unwrap();

        let entries = read_lines(&path);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[3].prev_hash, entries[2].curr_hash);

        let report = trail.verify_chain(Some(0), None).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 5);
    }

    /// A half-written final line is discarded on open and writing resumes.
    #[test]
    fn test_torn_trailing_line_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let trail = open_file_trail(&path);
            trail.record_event("u1", "login", "session", "s-1").unwrap();
            trail.record_event("u1", "complaint.submit", "complaint", "c-1").unwrap();
        }
        let clean_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(br#"{"id":"5c0e","sequence_index":2,"actor"#).unwrap();
        }

        let trail = open_file_trail(&path);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);
        let next = trail.record_event("u1", "logout", "session", "s-1").unwrap();
        assert_eq!(next.sequence_index, 2);
        assert!(trail.verify_chain(None, None).unwrap().valid);
    }

    /// Editing entry 2 on disk is reported at 2 and raised as an alert.
    #[test]
    fn test_file_tamper_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let trail = open_file_trail(&path);
            for i in 0..5 {
                trail
                    .record_event("u1", "complaint.submit", "complaint", &format!("c-{}", i))
                    .unwrap();
            }
        }

        let mut entries = read_lines(&path);
        entries[2].action = "complaint.delete".to_string();
        write_lines(&path, &entries);

        let sink = Arc::new(CollectingSink::default());
        let trail = AuditTrail::open_with_alerts(&TrailConfig::file(&path), sink.clone()).unwrap();
        let report = trail.verify_chain(Some(0), None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.broken_at, Some(2));
        assert_eq!(report.reason, Some(BreakReason::HashMismatch));
        assert_eq!(sink.count(), 1);
    }

    /// Startup verification refuses to open a tampered file.
    #[test]
    fn test_file_verify_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let trail = open_file_trail(&path);
            for i in 0..3 {
                trail.record_event("u1", "login", "session", &format!("s-{}", i)).unwrap();
            }
        }
        let mut entries = read_lines(&path);
        entries[0].actor_id = "u9".to_string();
        write_lines(&path, &entries);

        let mut config = TrailConfig::file(&path);
        config.sequencer.verify_on_startup = true;
        let err = AuditTrail::open(&config).err().unwrap();
        assert!(err.is_integrity());
    }

    /// Two lines claiming the highest index halt startup.
    #[test]
    fn test_duplicate_head_is_bootstrap_ambiguity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let trail = open_file_trail(&path);
            trail.record_event("u1", "login", "session", "s-1").unwrap();
            trail.record_event("u1", "logout", "session", "s-1").unwrap();
        }
        let mut entries = read_lines(&path);
        let mut fork = entries[1].clone();
        fork.entity_id = "s-2".to_string();
        entries.push(fork);
        write_lines(&path, &entries);

        let sink = Arc::new(CollectingSink::default());
        let err = AuditTrail::open_with_alerts(&TrailConfig::file(&path), sink.clone())
            .err()
            .unwrap();
        assert!(matches!(err, AuditError::BootstrapAmbiguity { .. }));
        assert_eq!(sink.count(), 1);

        // The store still opens for inspection; only latest/append refuse.
        let store = FileStore::open(&path, true).unwrap();
        assert!(store.latest().is_err());
        assert_eq!(store.stream_from(0).unwrap().count(), 3);
    }

    /// A corrupt line in the middle of the file is a continuity error.
    #[test]
    fn test_garbage_line_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let trail = open_file_trail(&path);
            trail.record_event("u1", "login", "session", "s-1").unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"not json at all\n").unwrap();
        }
        let err = FileStore::open(&path, true).err().unwrap();
        assert!(matches!(err, AuditError::ChainContinuity { index: 1, .. }));

        let sink = Arc::new(CollectingSink::default());
        let err = AuditTrail::open_with_alerts(&TrailConfig::file(&path), sink.clone())
            .err()
            .unwrap();
        assert!(err.is_integrity());
        assert_eq!(sink.count(), 1);
    }

    /// A second store over the same file is refused once it falls behind.
    #[test]
    fn test_file_store_refuses_stale_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let trail = open_file_trail(&path);
        let first = trail.record_event("u1", "login", "session", "s-1").unwrap();

        let err = trail.store().append(&first).unwrap_err();
        assert!(matches!(
            err,
            AuditError::SequenceConflict { expected: 1, offered: 0 }
        ));
        assert_eq!(read_lines(&path).len(), 1);
    }

    // ── Export ────────────────────────────────────────────────────────────────

    /// Export reproduces stored values verbatim and re-verifies offline.
    #[test]
    fn test_export_is_verbatim_and_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let trail = open_file_trail(&path);
        for i in 0..4 {
            trail
                .record_event("u1", "evidence.upload", "evidence", &format!("e-{}", i))
                .unwrap();
        }

        let mut buf = Vec::new();
        assert_eq!(trail.write_export(0, &mut buf).unwrap(), 4);
        let exported: Vec<AuditEntry> = String::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(exported, read_lines(&path));
        assert!(String::from_utf8(std::fs::read(&path).unwrap())
            .unwrap()
            .contains("\"hash_scheme\":\"sha256-v1\""));
        assert!(verify_entries(&exported, None).valid);

        let tail: Vec<AuditEntry> = trail
            .export_entries(2)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert!(verify_entries(&tail, Some(&exported[1].curr_hash)).valid);
    }

    // ── Checkpoint and purge ──────────────────────────────────────────────────

    /// Purging up to a checkpoint keeps the chain verifiable.
    #[test]
    fn test_purge_behind_checkpoint() {
        let (store, _, trail) = memory_trail();
        for i in 0..4 {
            trail.record_event("u1", "login", "session", &format!("s-{}", i)).unwrap();
        }
        let checkpoint = trail.record_checkpoint("retention-job").unwrap();
        trail.record_event("u1", "logout", "session", "s-3").unwrap();

        let err = store.purge_before(2).unwrap_err();
        assert!(matches!(err, AuditError::InvalidRange { .. }));

        // A checkpoint whose target is not its predecessor cannot anchor a purge.
        store.tamper(checkpoint.sequence_index, |e| {
            e.entity_id = format!("1:{}", e.prev_hash);
        });
        let err = store.purge_before(checkpoint.sequence_index).unwrap_err();
        assert!(matches!(err, AuditError::InvalidRange { .. }));
        assert_eq!(store.len(), 6);
        store.tamper(checkpoint.sequence_index, |e| {
            e.entity_id = checkpoint.entity_id.clone();
        });

        assert_eq!(store.purge_before(checkpoint.sequence_index).unwrap(), 4);
        let report = trail.verify_chain(None, None).unwrap();
        assert!(report.valid, "report: {:?}", report);
        assert_eq!(report.entries_checked, 2);

        // Writing continues after the purge.
        let next = trail.record_event("u1", "login", "session", "s-9").unwrap();
        assert_eq!(next.sequence_index, 6);
    }

    /// Tampering with an in-memory entry is caught like a file edit.
    #[test]
    fn test_memory_tamper_detection() {
        let (store, sink, trail) = memory_trail();
        for i in 0..5 {
            trail.record_event("u1", "login", "session", &format!("s-{}", i)).unwrap();
        }
        store.tamper(2, |e| e.action = "login.forged".to_string());

        let report = trail.verify_chain(Some(0), None).unwrap();
        assert_eq!(report.broken_at, Some(2));
        assert_eq!(sink.count(), 1);
    }
}
