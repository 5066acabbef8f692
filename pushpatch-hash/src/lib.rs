//! Content hashing for the artifact digests in the run report.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of optional file contents; `None` stays `None` (file absent).
pub fn sha256_hex_opt(bytes: Option<&[u8]>) -> Option<String> {
    bytes.map(sha256_hex)
}
