//! File-backed local ledger
//!
//! Keeps notarization records in a single JSON document. Every record is
//! signed with the signer's Ed25519 key; entries whose signature does not
//! verify are ignored on read. The document is rewritten atomically after
//! each change.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, Verifier};
use notary_protocol::{Level, Organisation, SignerId, VerificationRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::keystore::KeyMaterial;
use super::{ArtifactRecord, BackendError, SignRequest, SigningBackend, VerificationBackend};

/// Schema version for the ledger file
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    hash: String,
    record: VerificationRecord,
    /// Base64 Ed25519 public key of the signer
    public_key: String,
    /// Base64 signature over the JCS form of `{hash, record}`
    signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerState {
    schema_version: u32,
    #[serde(default)]
    entries: Vec<LedgerEntry>,
    /// Keyed by `<hash>:<meta_hash>`
    #[serde(default)]
    artifacts: BTreeMap<String, ArtifactRecord>,
    #[serde(default)]
    organisations: BTreeMap<String, Organisation>,
    #[serde(default)]
    levels: BTreeMap<SignerId, Level>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries: Vec::new(),
            artifacts: BTreeMap::new(),
            organisations: BTreeMap::new(),
            levels: BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
struct SignedPayload<'a> {
    hash: &'a str,
    record: &'a VerificationRecord,
}

/// Local notarization ledger
#[derive(Debug)]
pub struct LocalLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl LocalLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: PathBuf) -> Result<Self, BackendError> {
        let state = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => LedgerState::default(),
            Err(source) => return Err(BackendError::Io { path, source }),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register (or replace) an organisation.
    pub fn add_organisation(&self, organisation: Organisation) -> Result<(), BackendError> {
        self.update(|state| {
            state
                .organisations
                .insert(organisation.id.clone(), organisation);
            Ok(())
        })
    }

    /// Set the level recorded on future records by `signer`.
    pub fn set_signer_level(&self, signer: &SignerId, level: Level) -> Result<(), BackendError> {
        self.update(|state| {
            state.levels.insert(signer.clone(), level);
            Ok(())
        })
    }

    /// Number of stored records, verified or not.
    pub fn len(&self) -> Result<usize, BackendError> {
        Ok(self.lock()?.entries.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Unreachable("ledger lock poisoned".to_string()))
    }

    /// Apply `change` to a copy of the state; the copy replaces the live
    /// state only once it is on disk.
    fn update<T, F>(&self, change: F) -> Result<T, BackendError>
    where
        F: FnOnce(&mut LedgerState) -> Result<T, BackendError>,
    {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }

    /// Write atomically to file (write-then-rename)
    fn persist(&self, state: &LedgerState) -> Result<(), BackendError> {
        let io_err = |source| BackendError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Best verified record for `hash` among signers accepted by `accept`.
    fn best<F>(&self, hash: &str, accept: F) -> Result<VerificationRecord, BackendError>
    where
        F: Fn(&SignerId) -> bool,
    {
        let state = self.lock()?;
        let best = state
            .entries
            .iter()
            .filter(|e| e.hash == hash)
            .filter(|e| e.record.signer_id.as_ref().is_some_and(&accept))
            .filter(|e| {
                let valid = verify_entry(e);
                if !valid {
                    warn!(hash, signer = ?e.record.signer_id, "ledger entry signature invalid, skipped");
                }
                valid
            })
            .max_by_key(|e| (e.record.level, e.record.timestamp))
            .map(|e| e.record.clone());

        debug!(hash, found = best.is_some(), "ledger query");
        Ok(best.unwrap_or_else(VerificationRecord::unknown))
    }
}

fn signed_bytes(hash: &str, record: &VerificationRecord) -> Result<Vec<u8>, BackendError> {
    Ok(serde_json_canonicalizer::to_vec(&SignedPayload { hash, record })?)
}

fn verify_entry(entry: &LedgerEntry) -> bool {
    let check = || -> Option<()> {
        let material = KeyMaterial {
            signer_id: entry.record.signer_id.clone()?,
            public_key: entry.public_key.clone(),
            sealed_secret: None,
            salt: String::new(),
        };
        let key = material.verifying_key().ok()?;
        if super::keystore::signer_id_for(&key).ok()? != material.signer_id {
            return None;
        }
        let sig_bytes = STANDARD.decode(&entry.signature).ok()?;
        let signature = Signature::from_slice(&sig_bytes).ok()?;
        let payload = signed_bytes(&entry.hash, &entry.record).ok()?;
        key.verify(&payload, &signature).ok()
    };
    check().is_some()
}

impl VerificationBackend for LocalLedger {
    fn highest(&self, hash: &str) -> Result<VerificationRecord, BackendError> {
        self.best(hash, |_| true)
    }

    fn highest_matching(
        &self,
        hash: &str,
        keys: &BTreeSet<SignerId>,
    ) -> Result<VerificationRecord, BackendError> {
        self.best(hash, |signer| keys.contains(signer))
    }

    fn organisation(&self, id: &str) -> Result<Organisation, BackendError> {
        self.lock()?
            .organisations
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("organisation '{}'", id)))
    }

    fn load_artifact(
        &self,
        hash: &str,
        meta_hash: &str,
    ) -> Result<Option<ArtifactRecord>, BackendError> {
        let key = format!("{}:{}", hash, meta_hash);
        Ok(self.lock()?.artifacts.get(&key).cloned())
    }
}

impl SigningBackend for LocalLedger {
    fn sign(&self, request: &SignRequest<'_>) -> Result<VerificationRecord, BackendError> {
        if request.key.is_offline() {
            return Err(BackendError::Rejected(
                "offline key material cannot sign locally".to_string(),
            ));
        }
        let signing_key = request
            .key
            .unseal(request.passphrase)
            .ok_or(BackendError::WrongPassphrase)?;

        let artifact = ArtifactRecord::new(request.artifact, request.visibility)?;

        let signer_id = request.key.signer_id.clone();
        let record = self.update(|state| {
            let level = state
                .levels
                .get(&signer_id)
                .copied()
                .unwrap_or(Level::UNKNOWN);

            let record = VerificationRecord {
                signer_id: Some(signer_id.clone()),
                status: request.status,
                level,
                meta_hash: artifact.meta_hash.clone(),
                timestamp: Some(Utc::now()),
            };

            let payload = signed_bytes(&artifact.hash, &record)?;
            let signature = signing_key.sign(&payload);

            state.entries.push(LedgerEntry {
                hash: artifact.hash.clone(),
                record: record.clone(),
                public_key: request.key.public_key.clone(),
                signature: STANDARD.encode(signature.to_bytes()),
            });
            state.artifacts.insert(
                format!("{}:{}", artifact.hash, artifact.meta_hash),
                artifact.clone(),
            );
            Ok(record)
        })?;

        debug!(status = %record.status, "ledger record appended");
        Ok(record)
    }
}
