//! Signing key storage
//!
//! Keys are Ed25519. The secret half is sealed with ChaCha20-Poly1305
//! under a key derived from the passphrase with Argon2id. The stored form
//! is `nonce (12 bytes) || ciphertext || tag (16 bytes)`; a tag that fails
//! to verify means the passphrase is wrong. Key material without a sealed
//! secret lives on an offline device and cannot sign here.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::{SigningKey, VerifyingKey};
use notary_protocol::SignerId;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SALT_LEN: usize = 16;
/// Size of ChaCha20-Poly1305 nonce in bytes
const NONCE_SIZE: usize = 12;
/// Size of the derived sealing key in bytes
const SEAL_KEY_SIZE: usize = 32;

/// Errors for keystore operations
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("no key found at {0} (run `notary keygen` first)")]
    Missing(PathBuf),

    #[error("a key already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("keystore I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("keystore JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid key: {0}")]
    Invalid(String),

    #[error("unable to seal key: {0}")]
    Seal(String),
}

/// Stored key material for one signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub signer_id: SignerId,

    /// Base64 Ed25519 public key
    pub public_key: String,

    /// Base64 sealed secret; absent for offline keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_secret: Option<String>,

    /// Base64 Argon2 salt for the sealing key
    #[serde(default)]
    pub salt: String,
}

impl KeyMaterial {
    /// Generate a fresh key sealed under `passphrase`.
    pub fn generate(passphrase: &str) -> Result<Self, KeystoreError> {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let sealed = seal(&signing_key.to_bytes(), &salt, passphrase)?;
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signer_id: signer_id_for(&verifying_key)?,
            public_key: STANDARD.encode(verifying_key.as_bytes()),
            sealed_secret: Some(STANDARD.encode(sealed)),
            salt: STANDARD.encode(salt),
        })
    }

    /// Public-only material for a key held elsewhere.
    pub fn offline(verifying_key: &VerifyingKey) -> Result<Self, KeystoreError> {
        Ok(Self {
            signer_id: signer_id_for(verifying_key)?,
            public_key: STANDARD.encode(verifying_key.as_bytes()),
            sealed_secret: None,
            salt: String::new(),
        })
    }

    pub fn is_offline(&self) -> bool {
        self.sealed_secret.is_none()
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, KeystoreError> {
        let bytes: [u8; 32] = STANDARD
            .decode(&self.public_key)?
            .try_into()
            .map_err(|_| KeystoreError::Invalid("public key must be 32 bytes".to_string()))?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| KeystoreError::Invalid(e.to_string()))
    }

    /// Unseal the secret key.
    ///
    /// Returns `None` for offline material or when `passphrase` is wrong.
    pub fn unseal(&self, passphrase: &str) -> Option<SigningKey> {
        let sealed = STANDARD.decode(self.sealed_secret.as_ref()?).ok()?;
        let salt = STANDARD.decode(&self.salt).ok()?;
        let secret: [u8; 32] = open(&sealed, &salt, passphrase)?.try_into().ok()?;

        let signing_key = SigningKey::from_bytes(&secret);
        let expected = self.verifying_key().ok()?;
        (signing_key.verifying_key() == expected).then_some(signing_key)
    }
}

/// Signer ID of a public key: `0x` + last 20 bytes of its SHA-256.
pub fn signer_id_for(key: &VerifyingKey) -> Result<SignerId, KeystoreError> {
    let digest = Sha256::digest(key.as_bytes());
    SignerId::parse(&hex::encode(&digest[12..])).map_err(|e| KeystoreError::Invalid(e.to_string()))
}

fn derive_key(salt: &[u8], passphrase: &str) -> Result<[u8; SEAL_KEY_SIZE], KeystoreError> {
    let mut key = [0u8; SEAL_KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| KeystoreError::Seal(e.to_string()))?;
    Ok(key)
}

fn seal(secret: &[u8], salt: &[u8], passphrase: &str) -> Result<Vec<u8>, KeystoreError> {
    let key = derive_key(salt, passphrase)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, secret)
        .map_err(|_| KeystoreError::Seal("encrypt error".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// `None` when the tag does not verify under `passphrase`.
fn open(sealed: &[u8], salt: &[u8], passphrase: &str) -> Option<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return None;
    }
    let key = derive_key(salt, passphrase).ok()?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

/// Source of the caller's key material.
pub trait KeyStore {
    fn load(&self) -> Result<KeyMaterial, KeystoreError>;
}

/// Key material kept in a JSON file
#[derive(Debug, Clone)]
pub struct FileKeystore {
    path: PathBuf,
}

impl FileKeystore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Generate and store a new key; refuses to replace an existing one.
    pub fn create(&self, passphrase: &str) -> Result<KeyMaterial, KeystoreError> {
        if self.exists() {
            return Err(KeystoreError::AlreadyExists(self.path.clone()));
        }
        let material = KeyMaterial::generate(passphrase)?;
        self.save(&material)?;
        Ok(material)
    }

    /// Write atomically to file (write-then-rename)
    pub fn save(&self, material: &KeyMaterial) -> Result<(), KeystoreError> {
        let io_err = |source| KeystoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(material)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyStore for FileKeystore {
    fn load(&self) -> Result<KeyMaterial, KeystoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(KeystoreError::Missing(self.path.clone()))
            }
            Err(source) => {
                return Err(KeystoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unseal_with_correct_passphrase() {
        let material = KeyMaterial::generate("correct horse").unwrap();
        let key = material.unseal("correct horse").unwrap();
        assert_eq!(signer_id_for(&key.verifying_key()).unwrap(), material.signer_id);
        assert!(!material.is_offline());
    }

    #[test]
    fn test_unseal_with_wrong_passphrase() {
        let material = KeyMaterial::generate("correct horse").unwrap();
        assert!(material.unseal("battery staple").is_none());
    }

    #[test]
    fn test_tampered_seal_is_rejected() {
        let mut material = KeyMaterial::generate("correct horse").unwrap();
        let mut sealed = STANDARD
            .decode(material.sealed_secret.as_ref().unwrap())
            .unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        material.sealed_secret = Some(STANDARD.encode(&sealed));

        assert!(material.unseal("correct horse").is_none());
    }

    #[test]
    fn test_sealed_secret_layout() {
        let material = KeyMaterial::generate("pw").unwrap();
        let sealed = STANDARD
            .decode(material.sealed_secret.as_ref().unwrap())
            .unwrap();
        // nonce + 32-byte secret + tag
        assert_eq!(sealed.len(), NONCE_SIZE + 32 + 16);
        assert_eq!(STANDARD.decode(&material.salt).unwrap().len(), SALT_LEN);
    }

    #[test]
    fn test_offline_material_cannot_unseal() {
        let key = SigningKey::generate(&mut rand::thread_rng());
        let material = KeyMaterial::offline(&key.verifying_key()).unwrap();
        assert!(material.is_offline());
        assert!(material.unseal("anything").is_none());
    }

    #[test]
    fn test_signer_id_format() {
        let material = KeyMaterial::generate("pw").unwrap();
        let id = material.signer_id.as_str();
        assert!(id.starts_with("0x"));
        assert_eq!(id.len(), 42);
    }

    #[test]
    fn test_file_keystore_create_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileKeystore::new(dir.path().join("keys/key.json"));

        let created = store.create("pw").unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(created, loaded);

        let again = store.create("pw");
        assert!(matches!(again, Err(KeystoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_file_keystore_missing() {
        let dir = TempDir::new().unwrap();
        let store = FileKeystore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(KeystoreError::Missing(_))));
    }
}
