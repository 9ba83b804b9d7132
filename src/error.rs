//! Crate-level error

use notary_protocol::KeyFormatError;

use crate::backend::{BackendError, KeystoreError};
use crate::bundle::{BundleError, IgnoreError};
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::signing::SignError;
use crate::trust::TrustError;

/// Any failure surfaced by the `notary` binary
#[derive(Debug, thiserror::Error)]
pub enum NotaryError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Ignore(#[from] IgnoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    KeyFormat(#[from] KeyFormatError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid attribute {0:?}, expected key=value")]
    InvalidAttribute(String),
}

impl NotaryError {
    /// True when the run completed but an asset was not trusted.
    pub fn is_not_trusted(&self) -> bool {
        matches!(self, NotaryError::Trust(e) if e.is_not_trusted())
    }
}

pub type Result<T> = std::result::Result<T, NotaryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use notary_protocol::SignerId;

    #[test]
    fn test_messages_pass_through() {
        let err: NotaryError = SignError::WrongPassphrase.into();
        assert_eq!(err.to_string(), "incorrect notarization password");

        let err: NotaryError = SignerId::parse("nope").unwrap_err().into();
        assert_eq!(err.to_string(), "invalid public address format: nope");
    }

    #[test]
    fn test_not_trusted_detection() {
        let err: NotaryError = TrustError::ConflictingConstraints.into();
        assert!(!err.is_not_trusted());
    }
}
