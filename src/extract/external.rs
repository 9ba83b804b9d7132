//! Extractors backed by external tools (git, docker, podman).

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::hasher::hash_bytes;
use super::{Artifact, ExtractError, Kind, Metadata};

/// Media type recorded for container image artifacts.
pub const IMAGE_CONTENT_TYPE: &str = "application/vnd.docker.container.image.v1+json";

/// Media type recorded for repository commit artifacts.
pub const COMMIT_CONTENT_TYPE: &str = "application/x-git-commit";

/// Extractor for one asset-reference scheme that needs an outside tool.
pub trait SchemeExtractor: Send + Sync {
    /// Scheme this extractor serves.
    fn kind(&self) -> Kind;

    /// Produce an artifact for `target` (the part after `scheme://`).
    fn extract(&self, target: &str) -> Result<Artifact, ExtractError>;
}

/// Raw stdout of `tool`; fails on a non-zero exit.
fn run_tool(tool: &str, args: &[&str], target: &str) -> Result<Vec<u8>, ExtractError> {
    debug!(tool, ?args, "running external tool");
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| ExtractError::External {
            tool: tool.to_string(),
            target: target.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ExtractError::External {
            tool: tool.to_string(),
            target: target.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

fn run_tool_text(tool: &str, args: &[&str], target: &str) -> Result<String, ExtractError> {
    let stdout = run_tool(tool, args, target)?;
    Ok(String::from_utf8_lossy(&stdout).to_string())
}

/// `image inspect` arguments; `--` keeps a target starting with `-` from
/// being read as an option.
fn image_inspect_args(target: &str) -> [&str; 4] {
    ["image", "inspect", "--", target]
}

/// Container image extractor using `<tool> image inspect`.
///
/// The image ID is already a SHA-256 content address, so it becomes the
/// artifact hash as-is.
#[derive(Debug, Clone)]
pub struct ImageExtractor {
    kind: Kind,
    tool: &'static str,
}

impl ImageExtractor {
    pub fn docker() -> Self {
        Self {
            kind: Kind::Docker,
            tool: "docker",
        }
    }

    pub fn podman() -> Self {
        Self {
            kind: Kind::Podman,
            tool: "podman",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageInspect {
    id: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}

impl SchemeExtractor for ImageExtractor {
    fn kind(&self) -> Kind {
        self.kind
    }

    fn extract(&self, target: &str) -> Result<Artifact, ExtractError> {
        let stdout = run_tool_text(self.tool, &image_inspect_args(target), target)?;
        parse_image_inspect(&stdout, self.kind, self.tool, target)
    }
}

/// Build an image artifact from `image inspect` JSON output.
pub fn parse_image_inspect(
    json: &str,
    kind: Kind,
    tool: &str,
    target: &str,
) -> Result<Artifact, ExtractError> {
    let malformed = |message: String| ExtractError::External {
        tool: tool.to_string(),
        target: target.to_string(),
        message,
    };

    let images: Vec<ImageInspect> =
        serde_json::from_str(json).map_err(|e| malformed(format!("unreadable inspect output: {}", e)))?;
    let image = images
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no such image".to_string()))?;

    let hash = image
        .id
        .strip_prefix("sha256:")
        .unwrap_or(&image.id)
        .to_ascii_lowercase();
    if !notary_protocol::is_content_hash(&hash) {
        return Err(malformed(format!("unexpected image id '{}'", image.id)));
    }

    let mut metadata = Metadata::new();
    if let Some(arch) = image.architecture {
        metadata.insert("architecture".to_string(), Value::from(arch));
    }
    if let Some(os) = image.os {
        metadata.insert("platform".to_string(), Value::from(os));
    }
    if let Some(tags) = image.repo_tags.filter(|t| !t.is_empty()) {
        metadata.insert("tags".to_string(), Value::from(tags));
    }

    Ok(Artifact {
        kind: Some(kind),
        name: format!("{}://{}", kind.scheme(), target),
        hash,
        size: image.size,
        content_type: IMAGE_CONTENT_TYPE.to_string(),
        metadata,
    })
}

/// Repository extractor: identity is the SHA-256 of the raw `HEAD` commit
/// object, which transitively pins the whole tree.
#[derive(Debug, Clone, Default)]
pub struct GitExtractor;

impl SchemeExtractor for GitExtractor {
    fn kind(&self) -> Kind {
        Kind::Git
    }

    fn extract(&self, target: &str) -> Result<Artifact, ExtractError> {
        let commit_id = run_tool_text("git", &["-C", target, "rev-parse", "HEAD"], target)?;
        let commit = run_tool("git", &["-C", target, "cat-file", "commit", "HEAD"], target)?;
        let branch = run_tool_text(
            "git",
            &["-C", target, "rev-parse", "--abbrev-ref", "HEAD"],
            target,
        )
        .ok();

        let name = Path::new(target)
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| target.to_string());

        Ok(commit_artifact(name, &commit_id, branch.as_deref(), &commit))
    }
}

/// Build a repository artifact from the raw commit object. The object is
/// hashed byte for byte; commit messages need not be UTF-8.
fn commit_artifact(name: String, commit_id: &str, branch: Option<&str>, commit: &[u8]) -> Artifact {
    let mut metadata = Metadata::new();
    metadata.insert(
        "commit".to_string(),
        Value::from(commit_id.trim().to_string()),
    );
    if let Some(branch) = branch.map(str::trim).filter(|b| *b != "HEAD") {
        metadata.insert("branch".to_string(), Value::from(branch.to_string()));
    }

    Artifact {
        kind: Some(Kind::Git),
        name,
        hash: hash_bytes(commit),
        size: commit.len() as u64,
        content_type: COMMIT_CONTENT_TYPE.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_ID: &str = "sha256:9b8f1e0bd5b5c2fd9dbd6d1fd6b0c4b4a2b8e9d9f4a3c8f7b6e5d4c3b2a1f0e9";

    #[test]
    fn test_parse_image_inspect() {
        let json = format!(
            r#"[{{"Id":"{}","Size":1234,"Architecture":"amd64","Os":"linux","RepoTags":["alpine:3.19"]}}]"#,
            IMAGE_ID
        );

        let artifact = parse_image_inspect(&json, Kind::Docker, "docker", "alpine:3.19").unwrap();

        assert_eq!(artifact.kind, Some(Kind::Docker));
        assert_eq!(artifact.name, "docker://alpine:3.19");
        assert_eq!(artifact.hash, &IMAGE_ID[7..]);
        assert_eq!(artifact.size, 1234);
        assert_eq!(artifact.metadata["architecture"], "amd64");
        assert_eq!(artifact.metadata["platform"], "linux");
        assert_eq!(artifact.metadata["tags"][0], "alpine:3.19");
    }

    #[test]
    fn test_parse_image_inspect_empty() {
        let err = parse_image_inspect("[]", Kind::Podman, "podman", "nope").unwrap_err();
        assert!(err.to_string().contains("no such image"));
    }

    #[test]
    fn test_parse_image_inspect_bad_id() {
        let err = parse_image_inspect(r#"[{"Id":"sha256:xyz"}]"#, Kind::Docker, "docker", "x")
            .unwrap_err();
        assert!(matches!(err, ExtractError::External { .. }));
    }

    #[test]
    fn test_image_target_follows_option_terminator() {
        assert_eq!(
            image_inspect_args("--format={{.Id}}"),
            ["image", "inspect", "--", "--format={{.Id}}"]
        );
    }

    #[test]
    fn test_commit_hashed_as_raw_bytes() {
        // Latin-1 commit message, as written with i18n.commitEncoding
        let raw: &[u8] = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\ncaf\xe9\n";
        let artifact = commit_artifact("repo".to_string(), "abc123\n", Some("main\n"), raw);

        assert_eq!(artifact.hash, hash_bytes(raw));
        assert_ne!(
            artifact.hash,
            hash_bytes(String::from_utf8_lossy(raw).as_bytes())
        );
        assert_eq!(artifact.size, raw.len() as u64);
        assert_eq!(artifact.metadata["commit"], "abc123");
        assert_eq!(artifact.metadata["branch"], "main");

        let detached = commit_artifact("repo".to_string(), "abc123", Some("HEAD"), raw);
        assert!(!detached.metadata.contains_key("branch"));
    }

    #[test]
    fn test_missing_tool_is_external_error() {
        let err = run_tool("notary-test-no-such-tool", &[], "target").unwrap_err();
        assert!(matches!(err, ExtractError::External { .. }));
    }
}
