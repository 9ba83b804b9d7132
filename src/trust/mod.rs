//! Trust resolution
//!
//! Picks the verification record that applies to a hash under the caller's
//! constraints. Branches are evaluated in strict priority order:
//!
//! 1. explicit signer IDs or organisation members
//! 2. the caller's own key, falling back to the best record from anyone
//! 3. the best record from anyone
//!
//! Only a `TRUSTED` record passes; every other status fails the verdict.

use notary_protocol::{KeyFormatError, SignerId, Status, VerificationRecord};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

use crate::backend::{ArtifactRecord, BackendError, VerificationBackend};
use crate::extract::{Artifact, ExtractError, Extractor};

/// Errors for trust resolution
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error(transparent)]
    KeyFormat(#[from] KeyFormatError),

    #[error("cannot constrain by both an organisation and signer IDs")]
    ConflictingConstraints,

    #[error("invalid hash '{0}': expected 64 hex characters")]
    InvalidHash(String),

    #[error("unable to authenticate the hash: {0}")]
    Backend(#[from] BackendError),

    #[error("unable to process the input asset provided: {0}")]
    Extract(#[from] ExtractError),

    #[error("{hash} {label}{scope}")]
    NotTrusted {
        hash: String,
        status: Status,
        label: &'static str,
        scope: ScopeLabel,
    },
}

impl TrustError {
    pub fn is_not_trusted(&self) -> bool {
        matches!(self, TrustError::NotTrusted { .. })
    }
}

/// Constraint part of a not-trusted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeLabel {
    Anyone,
    Organisation(String),
    Key(SignerId),
    AnyOf(Vec<SignerId>),
}

impl fmt::Display for ScopeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLabel::Anyone => Ok(()),
            ScopeLabel::Organisation(org) => write!(f, " by \"{}\"", org),
            ScopeLabel::Key(key) => write!(f, " by {}", key),
            ScopeLabel::AnyOf(keys) => {
                let joined: Vec<&str> = keys.iter().map(SignerId::as_str).collect();
                write!(f, " by any of {}", joined.join(", "))
            }
        }
    }
}

/// Signer constraints shared by every asset of one request.
///
/// Either explicit signer IDs or an organisation, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    keys: BTreeSet<SignerId>,
    org: Option<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain to explicit signer IDs, normalizing each one.
    ///
    /// Every ID is validated before anything else happens.
    pub fn with_signer_ids<S: AsRef<str>>(mut self, raw: &[S]) -> Result<Self, TrustError> {
        let keys = SignerId::parse_all(raw)?;
        if keys.is_empty() {
            return Ok(self);
        }
        if self.org.is_some() {
            return Err(TrustError::ConflictingConstraints);
        }
        self.keys.extend(keys);
        Ok(self)
    }

    /// Constrain to the members of organisation `org`.
    pub fn with_organisation(
        mut self,
        org: &str,
        backend: &dyn VerificationBackend,
    ) -> Result<Self, TrustError> {
        if !self.keys.is_empty() || self.org.is_some() {
            return Err(TrustError::ConflictingConstraints);
        }
        let organisation = backend.organisation(org)?;
        debug!(org, members = organisation.members.len(), "organisation expanded");
        self.keys = organisation.members.into_iter().collect();
        self.org = Some(org.to_string());
        Ok(self)
    }

    pub fn keys(&self) -> &BTreeSet<SignerId> {
        &self.keys
    }

    pub fn organisation(&self) -> Option<&str> {
        self.org.as_deref()
    }

    /// Whether any signer key restricts the lookup. An organisation
    /// without members leaves the scope open.
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    fn label(&self) -> ScopeLabel {
        if let Some(org) = &self.org {
            return ScopeLabel::Organisation(org.clone());
        }
        let mut keys = self.keys.iter().cloned();
        match (keys.next(), keys.next()) {
            (None, _) => ScopeLabel::Anyone,
            (Some(only), None) => ScopeLabel::Key(only),
            _ => ScopeLabel::AnyOf(self.keys.iter().cloned().collect()),
        }
    }
}

/// A verification request for one hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustQuery {
    hash: String,
    scope: Scope,
}

impl TrustQuery {
    /// Build an unconstrained query; the hash is lowercased and validated.
    pub fn new(hash: &str) -> Result<Self, TrustError> {
        let hash = hash.trim().to_ascii_lowercase();
        if !notary_protocol::is_content_hash(&hash) {
            return Err(TrustError::InvalidHash(hash));
        }
        Ok(Self {
            hash,
            scope: Scope::default(),
        })
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_signer_ids<S: AsRef<str>>(mut self, raw: &[S]) -> Result<Self, TrustError> {
        self.scope = self.scope.with_signer_ids(raw)?;
        Ok(self)
    }

    pub fn with_organisation(
        mut self,
        org: &str,
        backend: &dyn VerificationBackend,
    ) -> Result<Self, TrustError> {
        self.scope = self.scope.with_organisation(org, backend)?;
        Ok(self)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Branch the resolver took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionBranch {
    /// Constrained by explicit keys or organisation members
    MatchingKeys,
    /// A record signed by the caller's own key was found
    OwnKey,
    /// The caller's key had no record; best record from anyone
    Fallback,
    /// No constraint and no caller key
    Unconstrained,
}

/// A resolved record and how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: VerificationRecord,
    pub branch: ResolutionBranch,
}

impl Resolution {
    pub fn is_trusted(&self) -> bool {
        self.record.is_trusted()
    }

    /// `Ok` only for a trusted record.
    pub fn verdict(&self, query: &TrustQuery) -> Result<(), TrustError> {
        if self.is_trusted() {
            return Ok(());
        }
        Err(TrustError::NotTrusted {
            hash: query.hash.clone(),
            status: self.record.status,
            label: self.record.status.failure_label(),
            scope: query.scope.label(),
        })
    }
}

/// Trust resolver over a verification backend
pub struct TrustResolver<'a> {
    backend: &'a dyn VerificationBackend,
}

impl<'a> TrustResolver<'a> {
    pub fn new(backend: &'a dyn VerificationBackend) -> Self {
        Self { backend }
    }

    /// Resolve the record for `query`.
    ///
    /// `own_key` is the caller's signer ID; it is consulted only when the
    /// query carries no signer keys.
    pub fn resolve(
        &self,
        query: &TrustQuery,
        own_key: Option<&SignerId>,
    ) -> Result<Resolution, BackendError> {
        let hash = query.hash();
        let scope = query.scope();

        if scope.has_keys() {
            return Ok(Resolution {
                record: self.backend.highest_matching(hash, scope.keys())?,
                branch: ResolutionBranch::MatchingKeys,
            });
        }

        if let Some(key) = own_key {
            let own: BTreeSet<SignerId> = [key.clone()].into_iter().collect();
            let record = self.backend.highest_matching(hash, &own)?;
            if record.is_signed_by(key) {
                return Ok(Resolution {
                    record,
                    branch: ResolutionBranch::OwnKey,
                });
            }
            debug!(hash, "no record from own key, falling back");
            return Ok(Resolution {
                record: self.backend.highest(hash)?,
                branch: ResolutionBranch::Fallback,
            });
        }

        Ok(Resolution {
            record: self.backend.highest(hash)?,
            branch: ResolutionBranch::Unconstrained,
        })
    }
}

/// Result of authenticating one asset
#[derive(Debug, Clone)]
pub struct Outcome {
    pub artifact: Artifact,
    pub query: TrustQuery,
    pub resolution: Resolution,
    /// Artifact details stored by the backend with the record
    pub stored: Option<ArtifactRecord>,
}

impl Outcome {
    pub fn verdict(&self) -> Result<(), TrustError> {
        self.resolution.verdict(&self.query)
    }
}

/// Authenticates assets one after another, stopping at the first failure.
pub struct Authenticator<'a> {
    backend: &'a dyn VerificationBackend,
    extractor: &'a Extractor,
    own_key: Option<SignerId>,
}

impl<'a> Authenticator<'a> {
    pub fn new(backend: &'a dyn VerificationBackend, extractor: &'a Extractor) -> Self {
        Self {
            backend,
            extractor,
            own_key: None,
        }
    }

    /// Use the caller's own key for unconstrained queries.
    pub fn with_own_key(mut self, key: Option<SignerId>) -> Self {
        self.own_key = key;
        self
    }

    /// Resolve one already-extracted artifact.
    pub fn authenticate_artifact(
        &self,
        artifact: Artifact,
        scope: &Scope,
    ) -> Result<Outcome, TrustError> {
        let query = TrustQuery::new(&artifact.hash)?.with_scope(scope.clone());
        let resolution = TrustResolver::new(self.backend).resolve(&query, self.own_key.as_ref())?;

        let stored = if resolution.record.is_unknown() {
            None
        } else {
            self.backend
                .load_artifact(query.hash(), &resolution.record.meta_hash)?
        };

        info!(
            hash = query.hash(),
            status = %resolution.record.status,
            branch = ?resolution.branch,
            "asset authenticated"
        );

        Ok(Outcome {
            artifact,
            query,
            resolution,
            stored,
        })
    }

    /// Resolve a bare hash.
    pub fn authenticate_hash(&self, hash: &str, scope: &Scope) -> Result<Outcome, TrustError> {
        let query = TrustQuery::new(hash)?;
        self.authenticate_artifact(Artifact::from_hash(query.hash()), scope)
    }

    /// Authenticate each reference in order.
    ///
    /// `on_outcome` sees every resolved asset. Processing stops at the first
    /// extraction or backend error, or at the first asset that is not
    /// trusted; that asset's verdict is returned as the error. Returns the
    /// number of trusted assets.
    pub fn authenticate<S, F>(
        &self,
        references: &[S],
        scope: &Scope,
        mut on_outcome: F,
    ) -> Result<usize, TrustError>
    where
        S: AsRef<str>,
        F: FnMut(&Outcome),
    {
        let mut trusted = 0;
        for reference in references {
            let artifact = self.extractor.extract(reference.as_ref())?;
            let outcome = self.authenticate_artifact(artifact, scope)?;
            on_outcome(&outcome);
            outcome.verdict()?;
            trusted += 1;
        }
        Ok(trusted)
    }
}
