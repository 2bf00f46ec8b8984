//! Snapshot Hashing
//!
//! SHA-256 digests used to detect corrupted or hand-edited snapshots.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for persisted session snapshots.
pub const SNAPSHOT_DOMAIN: &[u8] = b"GUESS_HISTORY_SNAPSHOT_V1";

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex checksum of serialized snapshot bytes.
pub fn snapshot_checksum(data: &[u8]) -> String {
    hex::encode(hash_with_domain(SNAPSHOT_DOMAIN, data))
}

/// Compare a stored checksum against freshly serialized bytes.
pub fn verify_snapshot_checksum(data: &[u8], expected: &str) -> bool {
    snapshot_checksum(data).eq_ignore_ascii_case(expected)
}
