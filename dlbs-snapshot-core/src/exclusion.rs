//! Exclusion patterns for snapshot tree walking
//!
//! Patterns behave like tar's unanchored `--exclude`: a pattern excludes an
//! entry when it matches either the entry's file name or its whole path
//! relative to the source directory. `*` may cross `/` in the latter case.
//! Excluding a directory prunes everything below it.

use crate::{Result, SnapshotError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Patterns excluded from every snapshot unless the caller opts out.
///
/// Covers the tool's own launcher scripts, Python bytecode caches, logs,
/// package artifacts and every archive format a previous run could leave
/// behind, including the snapshots themselves.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "dlbs_*.sh",
    "__pycache__",
    "*.log",
    "*.egg",
    "*.whl",
    "*.pyc",
    "*.tgz",
    "*.txz",
    "*.tbz2",
    "*.tar",
    "*.iso",
    "*.tar.gz",
];

/// Compiled set of exclusion globs.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    globs: GlobSet,
}

impl ExclusionSet {
    /// Compile `patterns` in order.
    ///
    /// # Errors
    /// * `SnapshotError::Pattern` - If any pattern is not a valid glob
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| {
                    SnapshotError::pattern(format!("Invalid glob pattern '{pattern}': {e}"))
                })?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| SnapshotError::pattern(format!("Failed to build glob set: {e}")))?;

        Ok(Self { patterns, globs })
    }

    /// Compile the default exclusion list.
    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_EXCLUSIONS.iter().copied())
    }

    /// Check whether an entry should be left out of the archive.
    ///
    /// `relative` is the entry's path relative to the source directory.
    #[must_use]
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        if let Some(name) = relative.file_name() {
            if self.globs.is_match(name) {
                return true;
            }
        }
        self.globs.is_match(relative)
    }

    /// The source patterns, in configured order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
