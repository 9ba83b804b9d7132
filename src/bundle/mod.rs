//! Directory bundling
//!
//! Walks a directory tree, filters it through the root's ignore rules and
//! reduces the remaining regular files to a sorted [`Manifest`]. The
//! manifest digest is independent of traversal order, timestamps and
//! permissions.

pub mod ignore;
pub mod manifest;

pub use ignore::{IgnoreError, IgnoreRules, IGNORE_FILENAME};
pub use manifest::{Descriptor, Manifest, MANIFEST_FILENAME};

use serde_json::Value;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::extract::{hash_file, Artifact, Kind, Metadata};

/// Media type recorded for directory bundles
pub const BUNDLE_CONTENT_TYPE: &str = "application/x-notary-bundle";

/// Errors for bundling operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Ignore rules error: {0}")]
    Ignore(#[from] IgnoreError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Path is not within bundle root: {0}")]
    PathNotInRoot(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

/// Directory bundler
pub struct Bundler {
    /// Root directory to bundle
    root: PathBuf,
    /// Write a default ignore file when the root has none
    ignore_file_init: bool,
    /// Persist the manifest at the root after bundling
    write_manifest: bool,
}

impl Bundler {
    /// Create a new bundler for the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ignore_file_init: false,
            write_manifest: false,
        }
    }

    pub fn with_ignore_file_init(mut self, init: bool) -> Self {
        self.ignore_file_init = init;
        self
    }

    /// Write `.notary.manifest.json` at the root after bundling.
    ///
    /// The manifest file is excluded from every walk, so writing it never
    /// changes the bundle hash.
    pub fn with_write_manifest(mut self, write: bool) -> Self {
        self.write_manifest = write;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and build the manifest.
    pub fn collect(&self) -> Result<Manifest, BundleError> {
        if !self.root.is_dir() {
            return Err(BundleError::NotADirectory(self.root.clone()));
        }

        if self.ignore_file_init && IgnoreRules::init_default_file(&self.root)? {
            debug!(root = %self.root.display(), "default ignore file written");
        }
        let rules = IgnoreRules::compile(&self.root)?;

        let mut descriptors = Vec::new();
        let mut walker = WalkDir::new(&self.root).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let path = entry.path();

            let rel_path = path
                .strip_prefix(&self.root)
                .map_err(|_| BundleError::PathNotInRoot(path.to_path_buf()))?;

            // Skip root itself
            if rel_path.as_os_str().is_empty() {
                continue;
            }

            let segments = posix_segments(rel_path)?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if rules.is_match(&segments, true) {
                    debug!(path = %segments.join("/"), "ignored directory pruned");
                    walker.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_file() {
                continue;
            }

            if rules.is_match(&segments, false) {
                debug!(path = %segments.join("/"), "ignored file skipped");
                continue;
            }

            let digest = hash_file(path).map_err(|source| BundleError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            descriptors.push(Descriptor {
                path: segments.join("/"),
                hash: digest.sha256,
                size: digest.size,
            });
        }

        Ok(Manifest::new(descriptors))
    }

    /// Bundle the directory into a content-addressed artifact.
    pub fn bundle(&self) -> Result<Artifact, BundleError> {
        let manifest = self.collect()?;

        if self.write_manifest {
            let path = self.root.join(MANIFEST_FILENAME);
            manifest
                .write_to_file(&path)
                .map_err(|source| BundleError::Io { path, source })?;
        }

        let name = self
            .root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| self.root.display().to_string());

        let listing: Vec<Value> = manifest
            .descriptors()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "path": d.path,
                    "hash": d.hash,
                    "size": d.size,
                })
            })
            .collect();

        let mut metadata = Metadata::new();
        metadata.insert("files".to_string(), Value::from(manifest.len()));
        metadata.insert("manifest".to_string(), Value::Array(listing));

        debug!(
            root = %self.root.display(),
            files = manifest.len(),
            "directory bundled"
        );

        Ok(Artifact {
            kind: Some(Kind::Dir),
            name,
            hash: manifest.digest(),
            size: manifest.total_size(),
            content_type: BUNDLE_CONTENT_TYPE.to_string(),
            metadata,
        })
    }
}

/// Split a relative path into UTF-8 segments.
fn posix_segments(rel_path: &Path) -> Result<Vec<&str>, BundleError> {
    rel_path
        .components()
        .map(|c| match c {
            Component::Normal(s) => s
                .to_str()
                .ok_or_else(|| BundleError::NonUtf8Path(rel_path.to_path_buf())),
            _ => Err(BundleError::PathNotInRoot(rel_path.to_path_buf())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_bundle_two_files() {
        let dir = setup_dir(&[("a.txt", "hello"), ("b.txt", "world")]);
        let artifact = Bundler::new(dir.path().to_path_buf()).bundle().unwrap();

        assert_eq!(
            artifact.hash,
            "96f2fee0016a7fee427ee0983f16c24e0dbbcdfa5bae407405b8b99b3b5fa346"
        );
        assert_eq!(artifact.kind, Some(Kind::Dir));
        assert_eq!(artifact.size, 10);
        assert_eq!(artifact.content_type, BUNDLE_CONTENT_TYPE);
        assert_eq!(artifact.metadata["files"], 2);
        assert_eq!(artifact.metadata["manifest"][0]["path"], "a.txt");
    }

    #[test]
    fn test_nested_paths_use_forward_slash() {
        let dir = setup_dir(&[("src/lib/mod.rs", "x"), ("top.txt", "y")]);
        let manifest = Bundler::new(dir.path().to_path_buf()).collect().unwrap();

        assert!(manifest.find("src/lib/mod.rs").is_some());
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_ignored_files_and_directories() {
        let dir = setup_dir(&[
            (".notaryignore", "*.log\nbuild/\n"),
            ("keep.txt", "keep"),
            ("debug.log", "noise"),
            ("build/out.o", "obj"),
            ("build/deep/x.o", "obj"),
        ]);
        let manifest = Bundler::new(dir.path().to_path_buf()).collect().unwrap();

        let paths: Vec<&str> = manifest.descriptors().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec![".notaryignore", "keep.txt"]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let artifact = Bundler::new(dir.path().to_path_buf()).bundle().unwrap();
        assert_eq!(artifact.size, 0);
        assert_eq!(artifact.metadata["files"], 0);
        assert_eq!(
            artifact.hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_written_manifest_does_not_change_hash() {
        let dir = setup_dir(&[("a.txt", "hello"), ("b.txt", "world")]);
        let bundler = Bundler::new(dir.path().to_path_buf()).with_write_manifest(true);

        let first = bundler.bundle().unwrap();
        assert!(dir.path().join(MANIFEST_FILENAME).exists());

        let second = bundler.bundle().unwrap();
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn test_ignore_file_init() {
        let dir = setup_dir(&[("a.txt", "hello"), (".DS_Store", "junk")]);

        let artifact = Bundler::new(dir.path().to_path_buf())
            .with_ignore_file_init(true)
            .bundle()
            .unwrap();

        assert!(dir.path().join(IGNORE_FILENAME).exists());
        // The fresh ignore file is bundled; .DS_Store is not
        assert_eq!(artifact.metadata["files"], 2);
        let manifest = &artifact.metadata["manifest"];
        assert_eq!(manifest[0]["path"], ".notaryignore");
        assert_eq!(manifest[1]["path"], "a.txt");
    }

    #[test]
    fn test_not_a_directory() {
        let dir = setup_dir(&[("a.txt", "hello")]);
        let err = Bundler::new(dir.path().join("a.txt")).bundle().unwrap_err();
        assert!(matches!(err, BundleError::NotADirectory(_)));
    }

    #[test]
    fn test_bad_ignore_pattern_aborts() {
        let dir = setup_dir(&[(".notaryignore", "[oops\n"), ("a.txt", "hello")]);
        let err = Bundler::new(dir.path().to_path_buf()).bundle().unwrap_err();
        assert!(matches!(err, BundleError::Ignore(IgnoreError::Pattern { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped() {
        let dir = setup_dir(&[("a.txt", "hello")]);
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link.txt"))
            .unwrap();

        let manifest = Bundler::new(dir.path().to_path_buf()).collect().unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.find("link.txt").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_segment_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let rel = Path::new("docs").join(OsStr::from_bytes(b"caf\xe9.txt"));
        let err = posix_segments(&rel).unwrap_err();
        assert!(matches!(err, BundleError::NonUtf8Path(ref p) if *p == rel));
        assert!(err.to_string().starts_with("Path is not valid UTF-8"));

        assert_eq!(
            posix_segments(Path::new("docs/cafe.txt")).unwrap(),
            vec!["docs", "cafe.txt"]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_fails_bundle() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = setup_dir(&[("ok.txt", "fine")]);
        fs::write(dir.path().join(OsStr::from_bytes(b"\xff.bin")), "x").unwrap();

        let err = Bundler::new(dir.path().to_path_buf()).collect().unwrap_err();
        assert!(matches!(err, BundleError::NonUtf8Path(_)));
    }
}
