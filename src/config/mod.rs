//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (~/.config/notary/config.toml)
//! 3. Environment (NOTARY_LEDGER, NOTARY_KEYSTORE, NOTARY_SIGNER_ID, NOTARY_ORG)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    default_config_path, env_layer, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
    NotaryConfig, ENV_KEYSTORE, ENV_LEDGER, ENV_ORG, ENV_SIGNER_ID,
};
pub use merge::{deep_merge, merge_layers};
