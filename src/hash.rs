//! Content hashing using SHA-256.
//!
//! Every content address in warren — file blobs, manifests, snapshot IDs —
//! is a 64-character lowercase hex SHA-256 digest.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of arbitrary bytes, returned as a hex string.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

/// Compute the SHA-256 hash of a string.
#[must_use]
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Compute the SHA-256 hash of a file's content, streaming in 64 KiB chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Encode raw bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Returns true if `s` looks like a content hash (64 lowercase hex chars).
#[must_use]
pub fn is_content_hash(s: &str) -> bool {
    s.len() == 64
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}
