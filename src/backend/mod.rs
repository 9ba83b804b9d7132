//! Notarization backend collaborators
//!
//! The trust resolver and signing orchestrator only see these traits. The
//! [`local`] module provides a file-backed ledger implementing both.

pub mod keystore;
pub mod local;

pub use keystore::{FileKeystore, KeyMaterial, KeyStore, KeystoreError};
pub use local::LocalLedger;

use notary_protocol::{Organisation, SignerId, Status, VerificationRecord, Visibility};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use crate::extract::{Artifact, Kind, Metadata};

/// Errors reported by a backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    pub fn is_wrong_passphrase(&self) -> bool {
        matches!(self, BackendError::WrongPassphrase)
    }
}

/// Read side of the backend.
pub trait VerificationBackend {
    /// Highest-level record for `hash` from any signer.
    ///
    /// Returns [`VerificationRecord::unknown`] when nothing matches.
    fn highest(&self, hash: &str) -> Result<VerificationRecord, BackendError>;

    /// Highest-level record for `hash` signed by one of `keys`.
    ///
    /// Returns [`VerificationRecord::unknown`] when nothing matches.
    fn highest_matching(
        &self,
        hash: &str,
        keys: &BTreeSet<SignerId>,
    ) -> Result<VerificationRecord, BackendError>;

    /// Look up an organisation and its member keys.
    fn organisation(&self, id: &str) -> Result<Organisation, BackendError>;

    /// Artifact details stored alongside a record, if visible.
    fn load_artifact(
        &self,
        hash: &str,
        meta_hash: &str,
    ) -> Result<Option<ArtifactRecord>, BackendError>;
}

/// A single signing call.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub artifact: &'a Artifact,
    pub status: Status,
    pub visibility: Visibility,
    pub key: &'a KeyMaterial,
    pub passphrase: &'a str,
}

/// Write side of the backend.
pub trait SigningBackend {
    /// Bind `request.status` to the artifact hash under the caller's key.
    ///
    /// Fails with [`BackendError::WrongPassphrase`] when the passphrase does
    /// not unlock the key.
    fn sign(&self, request: &SignRequest<'_>) -> Result<VerificationRecord, BackendError>;
}

/// Artifact as stored next to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    pub name: String,
    pub hash: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub visibility: Visibility,

    /// Digest of the canonical JSON of every other field
    #[serde(default)]
    pub meta_hash: String,
}

#[derive(Serialize)]
struct MetaView<'a> {
    kind: &'a Option<Kind>,
    name: &'a str,
    hash: &'a str,
    size: u64,
    content_type: &'a str,
    metadata: &'a Metadata,
    visibility: Visibility,
}

impl ArtifactRecord {
    /// Build the stored form of an artifact and compute its meta hash.
    pub fn new(artifact: &Artifact, visibility: Visibility) -> Result<Self, BackendError> {
        let mut record = Self {
            kind: artifact.kind,
            name: artifact.name.clone(),
            hash: artifact.hash.clone(),
            size: artifact.size,
            content_type: artifact.content_type.clone(),
            metadata: artifact.metadata.clone(),
            visibility,
            meta_hash: String::new(),
        };
        record.meta_hash = record.compute_meta_hash()?;
        Ok(record)
    }

    /// SHA-256 over the JCS form of the record, excluding `meta_hash`.
    pub fn compute_meta_hash(&self) -> Result<String, BackendError> {
        let view = MetaView {
            kind: &self.kind,
            name: &self.name,
            hash: &self.hash,
            size: self.size,
            content_type: &self.content_type,
            metadata: &self.metadata,
            visibility: self.visibility,
        };
        let jcs_bytes = serde_json_canonicalizer::to_vec(&view)?;
        Ok(hex::encode(Sha256::digest(&jcs_bytes)))
    }

    pub fn into_artifact(self) -> Artifact {
        Artifact {
            kind: self.kind,
            name: self.name,
            hash: self.hash,
            size: self.size,
            content_type: self.content_type,
            metadata: self.metadata,
        }
    }
}
