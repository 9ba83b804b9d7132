//! Notary Protocol Types
//!
//! Defines the records exchanged between the notary client and the
//! backend that stores notarizations.

pub mod record;
pub mod signer;
pub mod status;

pub use record::{Organisation, VerificationRecord};
pub use signer::{KeyFormatError, SignerId, SIGNER_ID_HEX_LEN, SIGNER_ID_PREFIX};
pub use status::{Level, Status, Visibility};

/// Length of a content hash in hex characters (SHA-256).
pub const HASH_HEX_LEN: usize = 64;

/// Check that a string is a lowercase hex SHA-256 digest.
pub fn is_content_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_content_hash() {
        assert!(is_content_hash(
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        ));
        assert!(!is_content_hash(
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
        ));
        assert!(!is_content_hash("abc"));
        assert!(!is_content_hash(""));
    }
}
