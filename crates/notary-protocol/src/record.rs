//! Verification records returned by the notarization backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signer::SignerId;
use crate::status::{Level, Status};

/// A notarization entry for a content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Signer of the record (absent for the `Unknown` sentinel).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<SignerId>,

    /// Status bound to the hash.
    pub status: Status,

    /// Signer level at notarization time.
    pub level: Level,

    /// Digest of the artifact metadata stored alongside the record.
    #[serde(default)]
    pub meta_hash: String,

    /// When the record was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    /// The "no matching record" sentinel.
    pub fn unknown() -> Self {
        Self {
            signer_id: None,
            status: Status::Unknown,
            level: Level::UNKNOWN,
            meta_hash: String::new(),
            timestamp: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.status == Status::Unknown
    }

    /// Trusted only when the backend explicitly says so; the level does
    /// not matter.
    pub fn is_trusted(&self) -> bool {
        self.status.is_trusted()
    }

    /// Whether this record was signed by `signer`.
    pub fn is_signed_by(&self, signer: &SignerId) -> bool {
        self.signer_id.as_ref() == Some(signer)
    }
}

/// An organisation registered on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    /// Organisation identifier.
    pub id: String,

    /// Signer IDs of the organisation members.
    #[serde(default)]
    pub members: Vec<SignerId>,
}

impl Organisation {
    pub fn member_ids(&self) -> &[SignerId] {
        &self.members
    }
}
