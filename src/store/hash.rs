//! SHA-256 helpers for change detection and derived ids.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First `len` hex characters of the SHA-256 of `bytes`.
#[must_use]
pub fn short_hash(bytes: &[u8], len: usize) -> String {
    let mut hex = sha256_hex(bytes);
    hex.truncate(len);
    hex
}

/// Whether content changed relative to a previously stored hash.
///
/// No stored hash counts as changed.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
