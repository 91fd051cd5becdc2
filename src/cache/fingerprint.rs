//! Stable track fingerprints

use crate::types::FileMetadata;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::path::Path;

/// Fingerprint a file from its normalized path, mtime and size
///
/// Any change to the file's location, modification time or length yields
/// a new fingerprint.
pub fn fingerprint(path: &Path, metadata: &FileMetadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_path_for_hash(path).as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.mtime_ns.to_le_bytes());
    hasher.update(metadata.size.to_le_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Normalize a path string for consistent hashing across platforms
fn normalize_path_for_hash(path: &Path) -> String {
    let path_str = path.to_string_lossy();

    // Convert backslashes to forward slashes
    let normalized = path_str.replace('\\', "/");

    // Lowercase for case-insensitive filesystems
    normalized.to_lowercase()
}
