//! Single-file canonicalization.

use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use super::hasher::hash_reader;
use super::sniff::{self, SNIFF_LEN};
use super::version::infer_version;
use super::{Artifact, ExtractError, Kind, Metadata};

/// Canonicalize a regular file into an [`Artifact`].
///
/// The name defaults to the base file name; callers may override it once
/// extraction is done.
pub fn canonicalize(path: &Path) -> Result<Artifact, ExtractError> {
    let mut file = File::open(path).map_err(|e| ExtractError::io(path, e))?;

    let digest = hash_reader(&mut file).map_err(|e| ExtractError::io(path, e))?;

    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    file.seek(SeekFrom::Start(0))
        .and_then(|_| (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut prefix))
        .map_err(|e| ExtractError::io(path, e))?;
    let mut content_type = sniff::content_type(&prefix);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut metadata = Metadata::new();
    if let Some(version) = infer_version(&name) {
        metadata.insert("version".to_string(), Value::from(version));
    }

    if let Some(info) = sniff::executable_info(&mut file) {
        debug!(
            path = %path.display(),
            format = info.format,
            arch = %info.architecture,
            "executable metadata sniffed"
        );
        content_type = info.content_type.to_string();
        metadata.extend(info.to_metadata());
    }

    Ok(Artifact {
        kind: Some(Kind::File),
        name,
        hash: digest.sha256,
        size: digest.size,
        content_type,
        metadata,
    })
}
