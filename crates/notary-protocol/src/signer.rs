//! Signer identities.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix carried by every normalized signer ID.
pub const SIGNER_ID_PREFIX: &str = "0x";

/// Number of hex characters after the prefix.
pub const SIGNER_ID_HEX_LEN: usize = 40;

/// A signer ID that does not normalize to `0x` + 40 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid public address format: {input}")]
pub struct KeyFormatError {
    /// The raw value as supplied by the caller.
    pub input: String,
}

/// Normalized public identity of a signing key.
///
/// Always lowercase, `0x`-prefixed, exactly 40 hex characters after the
/// prefix. The only way to build one is through [`SignerId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SignerId(String);

impl SignerId {
    /// Normalize and validate a raw signer ID.
    ///
    /// Adds the `0x` prefix when missing and lowercases the value.
    pub fn parse(raw: &str) -> Result<Self, KeyFormatError> {
        let trimmed = raw.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let normalized = if lowered.starts_with(SIGNER_ID_PREFIX) {
            lowered
        } else {
            format!("{}{}", SIGNER_ID_PREFIX, lowered)
        };

        let hex = &normalized[SIGNER_ID_PREFIX.len()..];
        let valid = hex.len() == SIGNER_ID_HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(KeyFormatError {
                input: raw.to_string(),
            });
        }

        Ok(Self(normalized))
    }

    /// Normalize a list of raw signer IDs, failing on the first malformed one.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>, KeyFormatError> {
        raw.iter().map(|k| Self::parse(k.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SignerId {
    type Err = KeyFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SignerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SignerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SignerId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
