//! Hash-chain primitives: link hashing.
//!
//! Hash input layout for `sha256-v1` (bytes, in order):
//!   1. the ASCII domain tag `trailseal/sha256-v1`
//!   2. prev_hash, actor_id, action, entity_type, entity_id, each as an
//!      8-byte big-endian length followed by its UTF-8 bytes
//!   3. timestamp as 8-byte big-endian signed microseconds since the epoch
//!
//! Length prefixes make the encoding unambiguous: `("ab", "c")` and
//! `("a", "bc")` hash differently.  Nothing here depends on locale, map
//! ordering or clock precision beyond the stored microsecond timestamp.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use trailseal_contracts::{
    entry::{AuditEntry, EventInput, HashScheme},
    error::{AuditError, AuditResult},
};

const SHA256_V1_TAG: &[u8] = b"trailseal/sha256-v1";

/// The hashed fields of an entry, apart from `prev_hash`.
#[derive(Debug, Clone, Copy)]
pub struct LinkFields<'a> {
    pub actor_id: &'a str,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl<'a> LinkFields<'a> {
    pub fn from_input(input: &'a EventInput, timestamp: DateTime<Utc>) -> Self {
        Self {
            actor_id: &input.actor_id,
            action: &input.action,
            entity_type: &input.entity_type,
            entity_id: &input.entity_id,
            timestamp,
        }
    }

    pub fn of(entry: &'a AuditEntry) -> Self {
        Self {
            actor_id: &entry.actor_id,
            action: &entry.action,
            entity_type: &entry.entity_type,
            entity_id: &entry.entity_id,
            timestamp: entry.timestamp,
        }
    }
}

/// Compute `curr_hash` for a new link with the current scheme.
///
/// Returns a lowercase 64-character hex string.
pub fn compute_link(prev_hash: &str, fields: &LinkFields<'_>) -> String {
    sha256_v1(prev_hash, fields)
}

/// Compute a link hash under an explicit scheme.
pub fn compute_link_with(
    scheme: HashScheme,
    prev_hash: &str,
    fields: &LinkFields<'_>,
) -> AuditResult<String> {
    match scheme {
        HashScheme::Sha256V1 => Ok(sha256_v1(prev_hash, fields)),
        HashScheme::Unrecognized => Err(AuditError::UnsupportedScheme {
            scheme: scheme.to_string(),
        }),
    }
}

/// Re-derive a stored entry's `curr_hash` from its own fields.
pub fn recompute(entry: &AuditEntry) -> AuditResult<String> {
    compute_link_with(entry.hash_scheme, &entry.prev_hash, &LinkFields::of(entry))
}

fn sha256_v1(prev_hash: &str, fields: &LinkFields<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SHA256_V1_TAG);
    for part in [
        prev_hash,
        fields.actor_id,
        fields.action,
        fields.entity_type,
        fields.entity_id,
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update(fields.timestamp.timestamp_micros().to_be_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use trailseal_contracts::GENESIS_HASH;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn link_is_deterministic_hex() {
        let input = EventInput::new("u1", "complaint.submit", "complaint", "c-100");
        let a = compute_link(GENESIS_HASH, &LinkFields::from_input(&input, ts()));
        let b = compute_link(GENESIS_HASH, &LinkFields::from_input(&input, ts()));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, GENESIS_HASH);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let left = EventInput::new("u1", "ab", "c", "x");
        let right = EventInput::new("u1", "a", "bc", "x");
        assert_ne!(
            compute_link(GENESIS_HASH, &LinkFields::from_input(&left, ts())),
            compute_link(GENESIS_HASH, &LinkFields::from_input(&right, ts())),
        );
    }

    #[test]
    fn every_input_changes_the_hash() {
        let base = EventInput::new("u1", "profile.update", "user", "u1");
        let reference = compute_link(GENESIS_HASH, &LinkFields::from_input(&base, ts()));

        let other_prev = "11".repeat(32);
        assert_ne!(
            reference,
            compute_link(&other_prev, &LinkFields::from_input(&base, ts()))
        );

        let later = ts() + chrono::Duration::microseconds(1);
        assert_ne!(
            reference,
            compute_link(GENESIS_HASH, &LinkFields::from_input(&base, later))
        );

        for changed in [
            EventInput::new("u2", "profile.update", "user", "u1"),
            EventInput::new("u1", "profile.delete", "user", "u1"),
            EventInput::new("u1", "profile.update", "account", "u1"),
            EventInput::new("u1", "profile.update", "user", "u2"),
        ] {
            assert_ne!(
                reference,
                compute_link(GENESIS_HASH, &LinkFields::from_input(&changed, ts())),
                "changing {:?} must change the hash",
                changed
            );
        }
    }

    #[test]
    fn unrecognized_scheme_cannot_be_recomputed() {
        let input = EventInput::new("u1", "login", "session", "s1");
        let err = compute_link_with(
            HashScheme::Unrecognized,
            GENESIS_HASH,
            &LinkFields::from_input(&input, ts()),
        )
        .unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedScheme { .. }));
    }
}
