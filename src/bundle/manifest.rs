//! Bundle manifest
//!
//! Records every file included in a directory bundle with its content hash.
//! The manifest digest is the bundle's identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

/// Manifest file name; always excluded from bundling.
pub const MANIFEST_FILENAME: &str = ".notary.manifest.json";

/// Current manifest schema version
pub const SCHEMA_VERSION: u32 = 1;

/// A single bundled file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// POSIX path relative to the bundle root
    pub path: String,

    /// SHA-256 of file contents
    pub hash: String,

    /// Size in bytes
    pub size: u64,
}

/// Sorted list of bundled files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    descriptors: Vec<Descriptor>,
}

impl Manifest {
    /// Build a manifest; descriptors are sorted by path bytes.
    pub fn new(mut descriptors: Vec<Descriptor>) -> Self {
        descriptors.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
        Self {
            schema_version: SCHEMA_VERSION,
            descriptors,
        }
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// SHA-256 over `path NUL hash NUL size LF` for each descriptor, in order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for d in &self.descriptors {
            hasher.update(d.path.as_bytes());
            hasher.update([0u8]);
            hasher.update(d.hash.as_bytes());
            hasher.update([0u8]);
            hasher.update(d.size.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Get total size of all files
    pub fn total_size(&self) -> u64 {
        self.descriptors.iter().map(|d| d.size).sum()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Find a descriptor by path
    pub fn find(&self, path: &str) -> Option<&Descriptor> {
        self.descriptors
            .binary_search_by(|d| d.path.as_bytes().cmp(path.as_bytes()))
            .ok()
            .map(|idx| &self.descriptors[idx])
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON; ordering is re-established on load.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let parsed: Self = serde_json::from_str(json)?;
        let mut manifest = Self::new(parsed.descriptors);
        manifest.schema_version = parsed.schema_version;
        Ok(manifest)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }
}
