//! Streaming SHA-256 content hashing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Digest and byte count of a hashed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Lowercase hex SHA-256.
    pub sha256: String,
    /// Number of bytes read.
    pub size: u64,
}

/// Hash everything `reader` yields.
///
/// Input is streamed through a fixed-size buffer. A read error aborts the
/// whole computation; no digest is produced for a partial read.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let size = io::copy(&mut reader, &mut hasher)?;
    Ok(ContentDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

/// Hash a file on disk.
pub fn hash_file(path: &Path) -> io::Result<ContentDigest> {
    hash_reader(File::open(path)?)
}

/// Compute SHA-256 of bytes and return hex string
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
