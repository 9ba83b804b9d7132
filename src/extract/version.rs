//! Best-effort version inference from file names.

use regex_lite::Regex;
use std::sync::OnceLock;

/// A dotted version preceded by start-of-name or a separator, with an
/// optional pre-release suffix.
const VERSION_PATTERN: &str =
    r"(?:^|[-_ ])[vV]?(\d+(?:\.\d+)+(?:-(?:alpha|beta|rc|pre|dev)(?:\.?\d+)?)?)";

static VERSION_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Infer a version token from a file name, e.g. `tool-v1.2.3-linux-amd64`
/// yields `1.2.3`. Returns `None` when nothing looks like a version.
pub fn infer_version(file_name: &str) -> Option<String> {
    let re = VERSION_RE.get_or_init(|| Regex::new(VERSION_PATTERN).ok()).as_ref()?;
    re.captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
