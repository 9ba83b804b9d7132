//! Effective configuration with provenance
//!
//! Merges the layers and deserializes the result into a typed
//! [`NotaryConfig`], remembering where each contributing layer came from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Environment variable overriding the ledger path
pub const ENV_LEDGER: &str = "NOTARY_LEDGER";
/// Environment variable overriding the keystore path
pub const ENV_KEYSTORE: &str = "NOTARY_KEYSTORE";
/// Comma-separated signer IDs to constrain verification by
pub const ENV_SIGNER_ID: &str = "NOTARY_SIGNER_ID";
/// Organisation to constrain verification by
pub const ENV_ORG: &str = "NOTARY_ORG";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Env,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (user layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (user layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Typed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryConfig {
    pub ledger_path: PathBuf,
    pub keystore_path: PathBuf,
    pub ignore_file_init: bool,

    /// Default signer constraint for verification
    #[serde(default)]
    pub signer_ids: Vec<String>,

    /// Default organisation constraint for verification
    #[serde(default)]
    pub org: Option<String>,
}

/// Merged configuration plus its sources
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: NotaryConfig,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge builtin defaults, the user file, the environment layer and CLI
    /// overrides, in that order.
    pub fn build(
        defaults: &BuiltinDefaults,
        user_config_path: Option<&Path>,
        env: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![defaults.to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = user_config_path.filter(|p| p.exists()) {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::User,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        for (origin, layer) in [(ConfigOrigin::Env, env), (ConfigOrigin::Cli, cli_overrides)] {
            if let Some(value) = layer.filter(|v| v.as_object().is_some_and(|m| !m.is_empty())) {
                layers.push(value);
                sources.push(ConfigSource {
                    origin,
                    path: None,
                    digest: None,
                });
            }
        }

        let merged = merge_layers(layers);
        let config: NotaryConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::Parse(format!("invalid configuration: {}", e)))?;
        validate_config(&config)?;

        Ok(Self { config, sources })
    }

    /// Build using the process environment and the default user file.
    pub fn load(cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let defaults = BuiltinDefaults::for_home(home.as_deref());
        let user_path = default_config_path();
        let env = env_layer(|key| std::env::var(key).ok());
        Self::build(&defaults, user_path.as_deref(), Some(env), cli_overrides)
    }
}

/// `$XDG_CONFIG_HOME/notary/config.toml`, else `~/.config/notary/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("notary").join("config.toml"))
}

/// Build the environment layer from a variable lookup.
pub fn env_layer<F>(lookup: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut map = Map::new();
    let set = |v: &Option<String>| v.as_ref().is_some_and(|s| !s.trim().is_empty());

    let ledger = lookup(ENV_LEDGER);
    if set(&ledger) {
        map.insert("ledger_path".to_string(), Value::from(ledger));
    }
    let keystore = lookup(ENV_KEYSTORE);
    if set(&keystore) {
        map.insert("keystore_path".to_string(), Value::from(keystore));
    }
    let org = lookup(ENV_ORG);
    if set(&org) {
        map.insert("org".to_string(), Value::from(org));
    }
    if let Some(ids) = lookup(ENV_SIGNER_ID).filter(|s| !s.trim().is_empty()) {
        let ids: Vec<Value> = ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect();
        map.insert("signer_ids".to_string(), Value::Array(ids));
    }
    Value::Object(map)
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::Parse(format!("Invalid UTF-8: {}", e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Validate configuration values
fn validate_config(config: &NotaryConfig) -> Result<(), ConfigError> {
    if config.ledger_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("ledger_path must not be empty".to_string()));
    }
    if config.keystore_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "keystore_path must not be empty".to_string(),
        ));
    }
    if config.org.as_deref().is_some_and(|o| o.trim().is_empty()) {
        return Err(ConfigError::Validation("org must not be empty".to_string()));
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
