//! Signing orchestrator
//!
//! Signing state machine:
//! AWAIT_PASSPHRASE → ATTEMPTING → {SUCCEEDED | RETRYABLE_PASSPHRASE_FAILURE | FATAL_FAILURE}
//! with RETRYABLE_PASSPHRASE_FAILURE looping back to AWAIT_PASSPHRASE.
//!
//! Only a wrong passphrase typed at the terminal is retried, and at most
//! [`MAX_ATTEMPTS`] signing calls are made in total.

pub mod passphrase;

pub use passphrase::{
    default_source, EnvPassphrase, Passphrase, PassphraseSource, TerminalPassphrase,
    PASSPHRASE_ENV,
};

use notary_protocol::{SignerId, Status, VerificationRecord, Visibility};
use std::io;
use tracing::{debug, info, warn};

use crate::backend::{
    ArtifactRecord, BackendError, KeyMaterial, KeyStore, KeystoreError, SignRequest,
    SigningBackend, VerificationBackend,
};
use crate::extract::{Artifact, ExtractError, Extractor, Metadata};

/// Signing calls allowed per run
pub const MAX_ATTEMPTS: u32 = 3;

/// Errors for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("incorrect notarization password")]
    WrongPassphrase,

    #[error("offline secret is not supported for local signing")]
    OfflineSecret,

    #[error("too many failed attempts: {source}")]
    TooManyAttempts {
        attempts: u32,
        #[source]
        source: Box<SignError>,
    },

    #[error("signing failed: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot read passphrase: {0}")]
    Passphrase(#[from] io::Error),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error("please set an asset name, by using --name")]
    MissingName,

    #[error("invalid hash '{0}': expected 64 hex characters")]
    InvalidHash(String),

    #[error("unable to process the input asset provided: {0}")]
    Extract(#[from] ExtractError),
}

/// Desired status and visibility for a signing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignIntent {
    pub status: Status,
    pub visibility: Visibility,
}

impl SignIntent {
    pub fn notarize() -> Self {
        Self {
            status: Status::Trusted,
            visibility: Visibility::Private,
        }
    }

    pub fn untrust() -> Self {
        Self {
            status: Status::Untrusted,
            visibility: Visibility::Private,
        }
    }

    pub fn unsupport() -> Self {
        Self {
            status: Status::Unsupported,
            visibility: Visibility::Private,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// What to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetInput {
    /// An asset reference, extracted locally
    Reference(String),
    /// A bare content hash
    Hash(String),
}

/// Post-extraction overrides
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub attributes: Metadata,
}

/// Build the artifact to sign.
///
/// For a bare hash the artifact last stored by `own_key` is reused when the
/// backend has one; otherwise a name override is mandatory.
pub fn prepare_artifact(
    input: &AssetInput,
    overrides: Overrides,
    extractor: &Extractor,
    backend: &dyn VerificationBackend,
    own_key: &SignerId,
) -> Result<Artifact, SignError> {
    let mut artifact = match input {
        AssetInput::Reference(reference) => extractor.extract(reference)?,
        AssetInput::Hash(raw) => {
            let hash = raw.trim().to_ascii_lowercase();
            if !notary_protocol::is_content_hash(&hash) {
                return Err(SignError::InvalidHash(raw.clone()));
            }
            match load_own_artifact(&hash, backend, own_key)? {
                Some(stored) => stored.into_artifact(),
                None if overrides.name.is_none() => return Err(SignError::MissingName),
                None => Artifact::from_hash(&hash),
            }
        }
    };

    if let Some(name) = overrides.name {
        artifact.set_name(name);
    }
    artifact.merge_metadata(overrides.attributes);
    Ok(artifact)
}

fn load_own_artifact(
    hash: &str,
    backend: &dyn VerificationBackend,
    own_key: &SignerId,
) -> Result<Option<ArtifactRecord>, BackendError> {
    let own = [own_key.clone()].into_iter().collect();
    let record = backend.highest_matching(hash, &own)?;
    if !record.is_signed_by(own_key) {
        return Ok(None);
    }
    backend.load_artifact(hash, &record.meta_hash)
}

/// Signing state
#[derive(Debug)]
pub enum SigningState {
    AwaitPassphrase {
        attempt: u32,
    },
    Attempting {
        attempt: u32,
        passphrase: Passphrase,
        key: KeyMaterial,
    },
    Succeeded(VerificationRecord),
    RetryablePassphraseFailure {
        attempt: u32,
        error: BackendError,
    },
    FatalFailure(SignError),
}

impl SigningState {
    pub fn initial() -> Self {
        SigningState::AwaitPassphrase { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SigningState::Succeeded(_) | SigningState::FatalFailure(_)
        )
    }
}

/// Drives one signing run
pub struct SigningOrchestrator<'a> {
    backend: &'a dyn SigningBackend,
    keystore: &'a dyn KeyStore,
    passphrases: &'a mut dyn PassphraseSource,
}

impl<'a> SigningOrchestrator<'a> {
    pub fn new(
        backend: &'a dyn SigningBackend,
        keystore: &'a dyn KeyStore,
        passphrases: &'a mut dyn PassphraseSource,
    ) -> Self {
        Self {
            backend,
            keystore,
            passphrases,
        }
    }

    /// Advance the state machine by one transition.
    ///
    /// Terminal states are returned unchanged.
    pub fn step(
        &mut self,
        state: SigningState,
        artifact: &Artifact,
        intent: SignIntent,
    ) -> SigningState {
        match state {
            SigningState::AwaitPassphrase { attempt } => {
                let key = match self.keystore.load() {
                    Ok(key) => key,
                    Err(e) => return SigningState::FatalFailure(e.into()),
                };
                if key.is_offline() {
                    return SigningState::FatalFailure(SignError::OfflineSecret);
                }
                match self.passphrases.provide(attempt) {
                    Ok(passphrase) => SigningState::Attempting {
                        attempt,
                        passphrase,
                        key,
                    },
                    Err(e) => SigningState::FatalFailure(e.into()),
                }
            }

            SigningState::Attempting {
                attempt,
                passphrase,
                key,
            } => {
                debug!(attempt, hash = %artifact.hash, "signing attempt");
                let request = SignRequest {
                    artifact,
                    status: intent.status,
                    visibility: intent.visibility,
                    key: &key,
                    passphrase: passphrase.expose(),
                };

                let error = match self.backend.sign(&request) {
                    Ok(record) => return SigningState::Succeeded(record),
                    Err(e) => e,
                };

                let wrong = error.is_wrong_passphrase();
                if wrong && passphrase.is_interactive() && attempt < MAX_ATTEMPTS {
                    return SigningState::RetryablePassphraseFailure { attempt, error };
                }

                let failure = if wrong {
                    SignError::WrongPassphrase
                } else {
                    SignError::Backend(error)
                };
                if attempt >= MAX_ATTEMPTS {
                    return SigningState::FatalFailure(SignError::TooManyAttempts {
                        attempts: attempt,
                        source: Box::new(failure),
                    });
                }
                SigningState::FatalFailure(failure)
            }

            SigningState::RetryablePassphraseFailure { attempt, error } => {
                warn!(attempt, "{}, please try again", error);
                SigningState::AwaitPassphrase {
                    attempt: attempt + 1,
                }
            }

            terminal => terminal,
        }
    }

    /// Run the state machine to completion.
    pub fn run(
        &mut self,
        artifact: &Artifact,
        intent: SignIntent,
    ) -> Result<VerificationRecord, SignError> {
        let mut state = SigningState::initial();
        loop {
            state = match self.step(state, artifact, intent) {
                SigningState::Succeeded(record) => {
                    info!(
                        hash = %artifact.hash,
                        status = %record.status,
                        "artifact signed"
                    );
                    return Ok(record);
                }
                SigningState::FatalFailure(e) => return Err(e),
                next => next,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KeyMaterial;
    use std::cell::Cell;

    struct FixedKey(KeyMaterial);

    impl KeyStore for FixedKey {
        fn load(&self) -> Result<KeyMaterial, KeystoreError> {
            Ok(self.0.clone())
        }
    }

    /// Fails with a wrong passphrase `failures` times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: Cell<u32>,
    }

    impl SigningBackend for Flaky {
        fn sign(&self, request: &SignRequest<'_>) -> Result<VerificationRecord, BackendError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.failures {
                return Err(BackendError::WrongPassphrase);
            }
            Ok(VerificationRecord {
                signer_id: Some(request.key.signer_id.clone()),
                status: request.status,
                level: notary_protocol::Level::UNKNOWN,
                meta_hash: String::new(),
                timestamp: None,
            })
        }
    }

    struct Typed;

    impl PassphraseSource for Typed {
        fn provide(&mut self, _attempt: u32) -> io::Result<Passphrase> {
            Ok(Passphrase::new("typed", true))
        }
    }

    fn artifact() -> Artifact {
        Artifact::from_hash("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    }

    #[test]
    fn test_step_transitions() {
        let keystore = FixedKey(KeyMaterial::generate("pw").unwrap());
        let backend = Flaky {
            failures: 1,
            calls: Cell::new(0),
        };
        let mut source = Typed;
        let mut orchestrator = SigningOrchestrator::new(&backend, &keystore, &mut source);
        let artifact = artifact();
        let intent = SignIntent::notarize();

        let state = orchestrator.step(SigningState::initial(), &artifact, intent);
        assert!(matches!(state, SigningState::Attempting { attempt: 1, .. }));

        let state = orchestrator.step(state, &artifact, intent);
        assert!(matches!(
            state,
            SigningState::RetryablePassphraseFailure { attempt: 1, .. }
        ));

        let state = orchestrator.step(state, &artifact, intent);
        assert!(matches!(state, SigningState::AwaitPassphrase { attempt: 2 }));

        let state = orchestrator.step(state, &artifact, intent);
        let state = orchestrator.step(state, &artifact, intent);
        assert!(matches!(state, SigningState::Succeeded(_)));

        let state = orchestrator.step(state, &artifact, intent);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_intents() {
        assert_eq!(SignIntent::notarize().status, Status::Trusted);
        assert_eq!(SignIntent::untrust().status, Status::Untrusted);
        assert_eq!(SignIntent::unsupport().status, Status::Unsupported);
        assert_eq!(
            SignIntent::notarize()
                .with_visibility(Visibility::Public)
                .visibility,
            Visibility::Public
        );
    }

    #[test]
    fn test_too_many_attempts_message() {
        let err = SignError::TooManyAttempts {
            attempts: 3,
            source: Box::new(SignError::WrongPassphrase),
        };
        assert_eq!(
            err.to_string(),
            "too many failed attempts: incorrect notarization password"
        );
    }
}
