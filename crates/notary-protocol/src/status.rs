//! Status, level and visibility of notarization records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status bound to a hash by a notarization record.
///
/// `Unknown` is the sentinel for "no matching record" and is never stored
/// by a backend as the result of a signing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Trusted,
    Untrusted,
    Unknown,
    Unsupported,
}

impl Status {
    /// Only an explicit `Trusted` counts as trusted.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Status::Trusted)
    }

    /// Phrase used when explaining why a hash is not trusted.
    pub fn failure_label(&self) -> &'static str {
        match self {
            Status::Trusted => "is trusted",
            Status::Untrusted => "is untrusted",
            Status::Unknown => "was not notarized",
            Status::Unsupported => "is unsupported",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Trusted => write!(f, "TRUSTED"),
            Status::Untrusted => write!(f, "UNTRUSTED"),
            Status::Unknown => write!(f, "UNKNOWN"),
            Status::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// Trust level of the signer at the time a record was written.
///
/// Levels are totally ordered; a higher level wins when several records
/// exist for the same hash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Level(pub i64);

impl Level {
    pub const DISABLED: Level = Level(-1);
    pub const UNKNOWN: Level = Level(0);
    pub const EMAIL_VERIFIED: Level = Level(1);
    pub const SOCIAL_VERIFIED: Level = Level(2);
    pub const ID_VERIFIED: Level = Level(3);
    pub const LOCATION_VERIFIED: Level = Level(4);
    pub const VCHAIN: Level = Level(99);

    /// Human-readable level name.
    pub fn name(&self) -> &'static str {
        match *self {
            Level::DISABLED => "DISABLED",
            Level::UNKNOWN => "UNKNOWN",
            Level::EMAIL_VERIFIED => "EMAIL_VERIFIED",
            Level::SOCIAL_VERIFIED => "SOCIAL_VERIFIED",
            Level::ID_VERIFIED => "ID_VERIFIED",
            Level::LOCATION_VERIFIED => "LOCATION_VERIFIED",
            Level::VCHAIN => "VCHAIN",
            _ => "CUSTOM",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Whether the artifact name and metadata are visible to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    /// Map a `--public` style flag to a visibility.
    pub fn for_flag(public: bool) -> Self {
        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_trusted_is_trusted() {
        assert!(Status::Trusted.is_trusted());
        assert!(!Status::Untrusted.is_trusted());
        assert!(!Status::Unknown.is_trusted());
        assert!(!Status::Unsupported.is_trusted());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::Unsupported).unwrap();
        assert_eq!(json, "\"UNSUPPORTED\"");
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::VCHAIN > Level::ID_VERIFIED);
        assert!(Level::EMAIL_VERIFIED > Level::UNKNOWN);
        assert!(Level::DISABLED < Level::UNKNOWN);
        assert_eq!(Level(42).name(), "CUSTOM");
        assert_eq!(serde_json::to_string(&Level(3)).unwrap(), "3");
    }

    #[test]
    fn test_visibility_for_flag() {
        assert_eq!(Visibility::for_flag(true), Visibility::Public);
        assert_eq!(Visibility::for_flag(false), Visibility::Private);
    }
}
