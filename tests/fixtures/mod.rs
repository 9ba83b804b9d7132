//! Shared test fixtures
//!
//! - A recording stub backend with scripted records and organisations
//! - Keystores and passphrase sources with fixed behavior
//! - Directory tree helpers for bundle tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use asset_notary::backend::{
    ArtifactRecord, BackendError, KeyMaterial, KeyStore, KeystoreError, SignRequest,
    SigningBackend, VerificationBackend,
};
use asset_notary::signing::{Passphrase, PassphraseSource};
use notary_protocol::{Level, Organisation, SignerId, Status, VerificationRecord};

/// `sha256("hello")`
pub const HELLO_HASH: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Digest of a bundle holding `a.txt = "hello"` and `b.txt = "world"`
pub const HELLO_WORLD_BUNDLE: &str =
    "96f2fee0016a7fee427ee0983f16c24e0dbbcdfa5bae407405b8b99b3b5fa346";

/// Signer ID made of one repeated hex character.
pub fn key(c: char) -> SignerId {
    SignerId::parse(&c.to_string().repeat(40)).unwrap()
}

pub fn record(signer: &SignerId, status: Status, level: Level) -> VerificationRecord {
    VerificationRecord {
        signer_id: Some(signer.clone()),
        status,
        level,
        meta_hash: format!("meta-{}", signer),
        timestamp: None,
    }
}

/// Backend call, as seen by [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Highest,
    HighestMatching(BTreeSet<SignerId>),
    Organisation(String),
    LoadArtifact(String),
    Sign(u32),
}

/// Serves a fixed set of records and logs every call.
#[derive(Default)]
pub struct RecordingBackend {
    pub records: Vec<VerificationRecord>,
    pub organisations: BTreeMap<String, Vec<SignerId>>,
    pub calls: RefCell<Vec<Call>>,
    /// Sign calls answered with a wrong passphrase before succeeding
    pub wrong_passphrases: u32,
    /// Record queries fail as if the backend were down
    pub unreachable: bool,
    sign_calls: Cell<u32>,
}

impl RecordingBackend {
    pub fn with_records(records: Vec<VerificationRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_organisation(mut self, id: &str, members: Vec<SignerId>) -> Self {
        self.organisations.insert(id.to_string(), members);
        self
    }

    pub fn rejecting_passphrases(failures: u32) -> Self {
        Self {
            wrong_passphrases: failures,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn sign_calls(&self) -> u32 {
        self.sign_calls.get()
    }

    fn best<'a>(
        &self,
        mut records: impl Iterator<Item = &'a VerificationRecord>,
    ) -> VerificationRecord {
        let first = match records.next() {
            Some(first) => first,
            None => return VerificationRecord::unknown(),
        };
        records
            .fold(first, |best, r| if r.level >= best.level { r } else { best })
            .clone()
    }
}

impl VerificationBackend for RecordingBackend {
    fn highest(&self, _hash: &str) -> Result<VerificationRecord, BackendError> {
        self.calls.borrow_mut().push(Call::Highest);
        if self.unreachable {
            return Err(BackendError::Unreachable("stub offline".to_string()));
        }
        Ok(self.best(self.records.iter()))
    }

    fn highest_matching(
        &self,
        _hash: &str,
        keys: &BTreeSet<SignerId>,
    ) -> Result<VerificationRecord, BackendError> {
        self.calls
            .borrow_mut()
            .push(Call::HighestMatching(keys.clone()));
        if self.unreachable {
            return Err(BackendError::Unreachable("stub offline".to_string()));
        }
        Ok(self.best(
            self.records
                .iter()
                .filter(|r| r.signer_id.as_ref().is_some_and(|s| keys.contains(s))),
        ))
    }

    fn organisation(&self, id: &str) -> Result<Organisation, BackendError> {
        self.calls
            .borrow_mut()
            .push(Call::Organisation(id.to_string()));
        match self.organisations.get(id) {
            Some(members) => Ok(Organisation {
                id: id.to_string(),
                members: members.clone(),
            }),
            None => Err(BackendError::NotFound(format!("organisation {}", id))),
        }
    }

    fn load_artifact(
        &self,
        _hash: &str,
        meta_hash: &str,
    ) -> Result<Option<ArtifactRecord>, BackendError> {
        self.calls
            .borrow_mut()
            .push(Call::LoadArtifact(meta_hash.to_string()));
        Ok(None)
    }
}

impl SigningBackend for RecordingBackend {
    fn sign(&self, request: &SignRequest<'_>) -> Result<VerificationRecord, BackendError> {
        let n = self.sign_calls.get() + 1;
        self.sign_calls.set(n);
        self.calls.borrow_mut().push(Call::Sign(n));
        if n <= self.wrong_passphrases {
            return Err(BackendError::WrongPassphrase);
        }
        Ok(record(&request.key.signer_id, request.status, Level::UNKNOWN))
    }
}

/// Keystore returning one fixed key
pub struct FixedKeystore(pub KeyMaterial);

impl FixedKeystore {
    pub fn generated(passphrase: &str) -> Self {
        Self(KeyMaterial::generate(passphrase).unwrap())
    }

    /// Public key only; no secret to sign with.
    pub fn offline() -> Self {
        let online = KeyMaterial::generate("pw").unwrap();
        let verifying = online.verifying_key().unwrap();
        Self(KeyMaterial::offline(&verifying).unwrap())
    }
}

impl KeyStore for FixedKeystore {
    fn load(&self) -> Result<KeyMaterial, KeystoreError> {
        Ok(self.0.clone())
    }
}

/// Hands out the same passphrase every time and counts prompts.
pub struct ScriptedPassphrase {
    value: String,
    interactive: bool,
    pub prompts: u32,
}

impl ScriptedPassphrase {
    pub fn interactive(value: &str) -> Self {
        Self {
            value: value.to_string(),
            interactive: true,
            prompts: 0,
        }
    }

    pub fn from_env(value: &str) -> Self {
        Self {
            value: value.to_string(),
            interactive: false,
            prompts: 0,
        }
    }
}

impl PassphraseSource for ScriptedPassphrase {
    fn provide(&mut self, _attempt: u32) -> io::Result<Passphrase> {
        self.prompts += 1;
        Ok(Passphrase::new(self.value.clone(), self.interactive))
    }
}

/// Write `(relative path, contents)` pairs under `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}
