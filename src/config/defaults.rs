//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory used when no home directory is known
const FALLBACK_DIR: &str = ".notary";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Local ledger file (default: ~/.local/share/notary/ledger.json)
    pub ledger_path: PathBuf,

    /// Keystore file (default: ~/.local/share/notary/key.json)
    pub keystore_path: PathBuf,

    /// Write a default ignore file into notarized directories (default: true)
    pub ignore_file_init: bool,
}

impl BuiltinDefaults {
    /// Defaults rooted at `home`, or at `./.notary` without one.
    pub fn for_home(home: Option<&Path>) -> Self {
        let data_dir = match home {
            Some(home) => home.join(".local").join("share").join("notary"),
            None => PathBuf::from(FALLBACK_DIR),
        };
        Self {
            ledger_path: data_dir.join("ledger.json"),
            keystore_path: data_dir.join("key.json"),
            ignore_file_init: true,
        }
    }

    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "ledger_path": self.ledger_path.to_string_lossy(),
            "keystore_path": self.keystore_path.to_string_lossy(),
            "ignore_file_init": self.ignore_file_init,
            "signer_ids": [],
        })
    }
}
