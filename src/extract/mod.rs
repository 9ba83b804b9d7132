//! Asset extraction
//!
//! Turns an asset reference (`<scheme>://<target>` or a bare path) into a
//! canonical, content-addressed [`Artifact`]. Files and directories are
//! handled in-process; repositories and container images are delegated to
//! [`SchemeExtractor`] implementations.

pub mod external;
pub mod file;
pub mod hasher;
pub mod sniff;
pub mod version;

pub use external::{GitExtractor, ImageExtractor, SchemeExtractor};
pub use hasher::{hash_bytes, hash_file, hash_reader, ContentDigest};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::bundle::{BundleError, Bundler};

/// Ordered artifact metadata.
pub type Metadata = BTreeMap<String, Value>;

/// Scheme used when a reference carries none.
pub const DEFAULT_SCHEME: &str = "file";

/// Kind of asset an artifact was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    File,
    Dir,
    Git,
    Docker,
    Podman,
}

impl Kind {
    pub fn scheme(&self) -> &'static str {
        match self {
            Kind::File => "file",
            Kind::Dir => "dir",
            Kind::Git => "git",
            Kind::Docker => "docker",
            Kind::Podman => "podman",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "file" => Some(Kind::File),
            "dir" => Some(Kind::Dir),
            "git" => Some(Kind::Git),
            "docker" => Some(Kind::Docker),
            "podman" => Some(Kind::Podman),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Canonical representation of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Asset kind; absent when the artifact was built from a bare hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,

    pub name: String,

    /// Lowercase hex SHA-256 identity.
    pub hash: String,

    pub size: u64,

    #[serde(default)]
    pub content_type: String,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Artifact {
    /// An artifact known only by its hash.
    pub fn from_hash(hash: &str) -> Self {
        Self {
            kind: None,
            name: String::new(),
            hash: hash.trim().to_ascii_lowercase(),
            size: 0,
            content_type: String::new(),
            metadata: Metadata::new(),
        }
    }

    /// Replace the name chosen at extraction time.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Merge caller-supplied attributes; caller values win on conflict.
    pub fn merge_metadata(&mut self, extra: Metadata) {
        self.metadata.extend(extra);
    }
}

/// A parsed asset reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub scheme: String,
    pub target: String,
}

impl AssetRef {
    /// Split `<scheme>://<target>`; a bare path defaults to the file scheme.
    pub fn parse(reference: &str) -> Self {
        match reference.split_once("://") {
            Some((scheme, target)) if !scheme.is_empty() => Self {
                scheme: scheme.to_ascii_lowercase(),
                target: target.to_string(),
            },
            _ => Self {
                scheme: DEFAULT_SCHEME.to_string(),
                target: reference.to_string(),
            },
        }
    }
}

/// Errors for extraction operations
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported scheme '{scheme}' in asset reference '{reference}'")]
    UnsupportedScheme { scheme: String, reference: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("{tool} failed for '{target}': {message}")]
    External {
        tool: String,
        target: String,
        message: String,
    },
}

impl ExtractError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Extraction options
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Write a default ignore file into bundled directories lacking one.
    pub ignore_file_init: bool,
}

/// Asset resolver: dispatches a reference to the extractor for its scheme.
pub struct Extractor {
    options: ExtractOptions,
    external: BTreeMap<Kind, Box<dyn SchemeExtractor>>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractOptions::default())
    }
}

impl Extractor {
    /// Create a resolver with the tool-backed extractors registered.
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            external: BTreeMap::new(),
        }
        .with_external(Box::new(GitExtractor))
        .with_external(Box::new(ImageExtractor::docker()))
        .with_external(Box::new(ImageExtractor::podman()))
    }

    /// Register (or replace) the extractor for a scheme.
    pub fn with_external(mut self, extractor: Box<dyn SchemeExtractor>) -> Self {
        self.external.insert(extractor.kind(), extractor);
        self
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }

    /// Extract an artifact from an asset reference.
    pub fn extract(&self, reference: &str) -> Result<Artifact, ExtractError> {
        let asset = AssetRef::parse(reference);
        let unsupported = || ExtractError::UnsupportedScheme {
            scheme: asset.scheme.clone(),
            reference: reference.to_string(),
        };
        let kind = Kind::from_scheme(&asset.scheme).ok_or_else(unsupported)?;

        let artifact = match kind {
            Kind::File => file::canonicalize(Path::new(&asset.target))?,
            Kind::Dir => Bundler::new(PathBuf::from(&asset.target))
                .with_ignore_file_init(self.options.ignore_file_init)
                .bundle()?,
            other => self
                .external
                .get(&other)
                .ok_or_else(unsupported)?
                .extract(&asset.target)?,
        };

        info!(
            reference,
            kind = %kind,
            hash = %artifact.hash,
            size = artifact.size,
            "asset extracted"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FixedImage;

    impl SchemeExtractor for FixedImage {
        fn kind(&self) -> Kind {
            Kind::Docker
        }

        fn extract(&self, target: &str) -> Result<Artifact, ExtractError> {
            let mut artifact = Artifact::from_hash(&hash_bytes(target.as_bytes()));
            artifact.kind = Some(Kind::Docker);
            artifact.name = target.to_string();
            Ok(artifact)
        }
    }

    #[test]
    fn test_asset_ref_parse() {
        assert_eq!(
            AssetRef::parse("dir://some/where"),
            AssetRef {
                scheme: "dir".to_string(),
                target: "some/where".to_string()
            }
        );
        assert_eq!(AssetRef::parse("plain.txt").scheme, "file");
        assert_eq!(AssetRef::parse("plain.txt").target, "plain.txt");
        assert_eq!(AssetRef::parse("DOCKER://alpine").scheme, "docker");
        assert_eq!(AssetRef::parse("://x").scheme, "file");
    }

    #[test]
    fn test_extract_bare_path_and_file_scheme() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let extractor = Extractor::default();
        let bare = extractor.extract(path.to_str().unwrap()).unwrap();
        let schemed = extractor
            .extract(&format!("file://{}", path.display()))
            .unwrap();

        assert_eq!(bare, schemed);
        assert_eq!(bare.kind, Some(Kind::File));
    }

    #[test]
    fn test_extract_dir_scheme() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let artifact = Extractor::default()
            .extract(&format!("dir://{}", dir.path().display()))
            .unwrap();
        assert_eq!(artifact.kind, Some(Kind::Dir));
        assert_eq!(artifact.metadata["files"], 1);
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = Extractor::default().extract("ftp://example.com/x").unwrap_err();
        match err {
            ExtractError::UnsupportedScheme { scheme, reference } => {
                assert_eq!(scheme, "ftp");
                assert_eq!(reference, "ftp://example.com/x");
            }
            other => panic!("expected UnsupportedScheme, got {:?}", other),
        }
    }

    #[test]
    fn test_external_extractor_override() {
        let extractor = Extractor::default().with_external(Box::new(FixedImage));
        let artifact = extractor.extract("docker://alpine:3.19").unwrap();
        assert_eq!(artifact.kind, Some(Kind::Docker));
        assert_eq!(artifact.name, "alpine:3.19");
    }

    #[test]
    fn test_from_hash_lowercases() {
        let artifact = Artifact::from_hash(" ABCDEF ");
        assert_eq!(artifact.hash, "abcdef");
        assert!(artifact.kind.is_none());
    }

    #[test]
    fn test_merge_metadata_overrides() {
        let mut artifact = Artifact::from_hash("00");
        artifact
            .metadata
            .insert("version".to_string(), Value::from("1.0"));

        let mut extra = Metadata::new();
        extra.insert("version".to_string(), Value::from("2.0"));
        extra.insert("team".to_string(), Value::from("core"));
        artifact.merge_metadata(extra);

        assert_eq!(artifact.metadata["version"], "2.0");
        assert_eq!(artifact.metadata["team"], "core");
    }
}
