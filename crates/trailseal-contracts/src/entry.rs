//! Audit entry, event input and chain head types.
//!
//! `AuditEntry` is one immutable link in the chain.  `EventInput` is what a
//! collaborator hands to `record_event`.  `ChainHead` is the sequencer's only
//! mutable state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// The `prev_hash` of the very first entry of a chain: 64 hex zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Actor identifier used when no human principal is involved.
pub const SYSTEM_ACTOR: &str = "system";

/// Action name of checkpoint entries.
pub const CHECKPOINT_ACTION: &str = "chain.checkpoint";

/// Entity type of checkpoint entries.
pub const CHECKPOINT_ENTITY: &str = "chain";

/// Versioned canonicalization and digest rule used to compute `curr_hash`.
///
/// Stored in every entry so verifiers years from now know which rule to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashScheme {
    /// SHA-256 over length-prefixed fields and a microsecond timestamp.
    #[serde(rename = "sha256-v1")]
    Sha256V1,
    /// A scheme written by a newer build.  Entries carrying it cannot be
    /// re-hashed here and fail verification as unsupported.
    #[serde(other)]
    Unrecognized,
}

impl HashScheme {
    /// The scheme new entries are written with.
    pub const CURRENT: HashScheme = HashScheme::Sha256V1;

    pub fn as_str(&self) -> &'static str {
        match self {
            HashScheme::Sha256V1 => "sha256-v1",
            HashScheme::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for HashScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security-relevant action reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInput {
    /// Principal performing the action (`SYSTEM_ACTOR` when none).
    pub actor_id: String,
    /// Short symbolic operation name, e.g. `complaint.submit`.
    pub action: String,
    /// Type of the targeted resource.
    pub entity_type: String,
    /// Identifier of the targeted resource.
    pub entity_id: String,
}

impl EventInput {
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Reject events that would produce a meaningless record.
    pub fn validate(&self) -> AuditResult<()> {
        if self.actor_id.trim().is_empty() {
            return Err(AuditError::InvalidEvent {
                reason: "actor_id must not be empty".to_string(),
            });
        }
        if self.action.trim().is_empty() {
            return Err(AuditError::InvalidEvent {
                reason: "action must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One immutable entry of the audit chain.
///
/// Modifying any hashed field invalidates `curr_hash`, and removing or
/// reordering entries breaks the `prev_hash` linkage of the successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Opaque unique identifier, never reused.
    pub id: Uuid,

    /// Gapless position in the chain, starting at 0.
    pub sequence_index: u64,

    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,

    /// `curr_hash` of the entry at `sequence_index - 1`, or `GENESIS_HASH`.
    pub prev_hash: String,

    /// Digest of `(prev_hash, actor_id, action, entity_type, entity_id,
    /// timestamp)` under `hash_scheme`.
    pub curr_hash: String,

    /// Event time, microsecond precision, non-decreasing along the chain.
    pub timestamp: DateTime<Utc>,

    pub hash_scheme: HashScheme,
}

impl AuditEntry {
    pub fn is_checkpoint(&self) -> bool {
        self.action == CHECKPOINT_ACTION && self.entity_type == CHECKPOINT_ENTITY
    }

    /// For a checkpoint, the `(index, hash)` of the entry it seals.
    ///
    /// Returns `None` for ordinary entries and for checkpoints whose entity id
    /// is not of the form `"{index}:{hash}"`.
    pub fn checkpoint_target(&self) -> Option<(u64, &str)> {
        if !self.is_checkpoint() {
            return None;
        }
        let (index, hash) = self.entity_id.split_once(':')?;
        Some((index.parse().ok()?, hash))
    }
}

/// Build the entity id a checkpoint uses to name the entry it follows.
pub fn checkpoint_entity_id(index: u64, hash: &str) -> String {
    format!("{}:{}", index, hash)
}

/// Drop sub-microsecond precision so the stored timestamp re-hashes exactly.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// The most recently appended entry's hash, index and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub last_hash: String,
    /// `None` while the chain is empty.
    pub last_sequence_index: Option<u64>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl ChainHead {
    /// The head of a chain with no entries.
    pub fn genesis() -> Self {
        Self {
            last_hash: GENESIS_HASH.to_string(),
            last_sequence_index: None,
            last_timestamp: None,
        }
    }

    pub fn from_entry(entry: &AuditEntry) -> Self {
        Self {
            last_hash: entry.curr_hash.clone(),
            last_sequence_index: Some(entry.sequence_index),
            last_timestamp: Some(entry.timestamp),
        }
    }

    /// Index the next appended entry must carry.
    pub fn next_index(&self) -> u64 {
        self.last_sequence_index.map_or(0, |i| i + 1)
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}
