//! Ignore rules for directory bundling
//!
//! Reads the optional `.notaryignore` file at the bundle root. Patterns use
//! gitignore syntax: `#` comments, `!` negation, trailing `/` for
//! directories, and patterns without an inner `/` match at any depth.

use globset::{GlobBuilder, GlobMatcher};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::manifest::MANIFEST_FILENAME;

/// Name of the per-root ignore file
pub const IGNORE_FILENAME: &str = ".notaryignore";

/// Contents written by [`IgnoreRules::init_default_file`]
pub const DEFAULT_IGNORE_FILE: &str = "\
# Files matching these patterns are excluded from directory notarization.
# Syntax follows .gitignore.
.git/
.DS_Store
Thumbs.db
desktop.ini
";

/// Errors for ignore rules
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    #[error("cannot read ignore file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid ignore pattern '{pattern}' on line {line}: {source}")]
    Pattern {
        line: usize,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug)]
struct Rule {
    matcher: GlobMatcher,
    negate: bool,
    dir_only: bool,
}

/// Compiled ignore rules for one bundle root
#[derive(Debug, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Rules that match nothing but the manifest file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile the ignore file found at `root`, if any.
    ///
    /// A missing ignore file is not an error.
    pub fn compile(root: &Path) -> Result<Self, IgnoreError> {
        let path = root.join(IGNORE_FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(source) => Err(IgnoreError::Io { path, source }),
        }
    }

    /// Compile ignore-file contents.
    pub fn parse(contents: &str) -> Result<Self, IgnoreError> {
        let mut rules = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let rule = compile_rule(line).map_err(|source| IgnoreError::Pattern {
                line: idx + 1,
                pattern: trim_trailing_spaces(line).to_string(),
                source,
            })?;
            rules.extend(rule);
        }
        Ok(Self { rules })
    }

    /// Compile a list of patterns, one per entry.
    pub fn from_patterns(patterns: &[&str]) -> Result<Self, IgnoreError> {
        Self::parse(&patterns.join("\n"))
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check whether a root-relative path, given as its segments, is
    /// excluded. A path below an excluded directory is excluded too.
    pub fn is_match(&self, segments: &[&str], is_dir: bool) -> bool {
        if segments.is_empty() {
            return false;
        }
        if !is_dir && segments == [MANIFEST_FILENAME] {
            return true;
        }
        if self.rules.is_empty() {
            return false;
        }

        for depth in 1..segments.len() {
            let parent = segments[..depth].join("/");
            if self.evaluate(&parent, true) == Some(true) {
                return true;
            }
        }

        self.evaluate(&segments.join("/"), is_dir).unwrap_or(false)
    }

    /// Convenience wrapper over [`is_match`](Self::is_match) for a
    /// `/`-separated relative path.
    pub fn is_path_excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
        self.is_match(&segments, is_dir)
    }

    /// Last matching rule wins; `None` when no rule matches.
    fn evaluate(&self, path: &str, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .filter(|rule| is_dir || !rule.dir_only)
            .find(|rule| rule.matcher.is_match(path))
            .map(|rule| !rule.negate)
    }

    /// Write [`DEFAULT_IGNORE_FILE`] at `root` unless an ignore file exists.
    ///
    /// Returns `true` when a file was written.
    pub fn init_default_file(root: &Path) -> Result<bool, IgnoreError> {
        let path = root.join(IGNORE_FILENAME);
        let file = OpenOptions::new().write(true).create_new(true).open(&path);
        match file {
            Ok(mut f) => {
                f.write_all(DEFAULT_IGNORE_FILE.as_bytes())
                    .map_err(|source| IgnoreError::Io { path, source })?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(IgnoreError::Io { path, source }),
        }
    }
}

/// Strip trailing spaces unless escaped with a backslash. Leading
/// whitespace is part of the pattern.
fn trim_trailing_spaces(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b' ' | b'\r') {
        if bytes[end - 1] == b' ' && end >= 2 && bytes[end - 2] == b'\\' {
            break;
        }
        end -= 1;
    }
    &line[..end]
}

fn compile_rule(line: &str) -> Result<Option<Rule>, globset::Error> {
    let mut pattern = trim_trailing_spaces(line);
    if pattern.is_empty() || pattern.starts_with('#') {
        return Ok(None);
    }

    let negate = pattern.starts_with('!');
    if negate {
        pattern = &pattern[1..];
    } else if pattern.starts_with("\\!") || pattern.starts_with("\\#") {
        pattern = &pattern[1..];
    }

    let dir_only = pattern.ends_with('/');
    pattern = pattern.trim_end_matches('/');

    let anchored = pattern.contains('/');
    pattern = pattern.trim_start_matches('/');
    if pattern.is_empty() {
        return Ok(None);
    }

    let glob = if anchored {
        pattern.to_string()
    } else {
        format!("**/{}", pattern)
    };

    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()?
        .compile_matcher();

    Ok(Some(Rule {
        matcher,
        negate,
        dir_only,
    }))
}
