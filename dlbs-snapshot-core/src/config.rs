//! Configuration for snapshot runs
//!
//! Every value the snapshot tool used to hardcode (source directory, name
//! prefix, exclusion list, compression level) lives in [`SnapshotConfig`].
//! The defaults reproduce the fixed behavior; callers override individual
//! fields from a JSON file, the command line or the environment.

use crate::exclusion::{ExclusionSet, DEFAULT_EXCLUSIONS};
use crate::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory to snapshot, relative to the working directory
pub const DEFAULT_SOURCE_DIR: &str = "dlbs";

/// Default archive name prefix
pub const DEFAULT_PREFIX: &str = "dlbs";

/// Extension of every snapshot archive
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Configuration structure for a snapshot run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory to snapshot
    pub source_dir: PathBuf,
    /// Directory the archive is written to (defaults to the current directory)
    pub destination: Option<PathBuf>,
    /// Archive name prefix, as in `<prefix>_<timestamp>.tgz`
    pub prefix: String,
    /// Glob patterns for entries to leave out, in order
    pub exclusion_patterns: Vec<String>,
    /// Gzip level (0-9); `None` uses the gzip default
    pub compression_level: Option<u32>,
    /// Skip unreadable entries with a warning instead of aborting
    pub skip_unreadable: bool,
    /// Print each archived entry to standard output
    pub list_entries: bool,
}

impl SnapshotConfig {
    /// Create a configuration for `source_dir` with every other field defaulted
    pub fn for_source<P: Into<PathBuf>>(source_dir: P) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Self::default()
        }
    }

    /// Set the output directory
    pub fn with_destination<P: Into<PathBuf>>(mut self, destination: P) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Replace the exclusion list
    pub fn with_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusion_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Append patterns to the exclusion list
    pub fn add_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusion_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| SnapshotError::from_io(e, path))?;
        let config: SnapshotConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Compile the configured exclusion patterns
    pub fn exclusion_set(&self) -> Result<ExclusionSet> {
        ExclusionSet::new(self.exclusion_patterns.iter().cloned())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(SnapshotError::validation("source_dir cannot be empty"));
        }
        if self.prefix.is_empty() {
            return Err(SnapshotError::validation("prefix cannot be empty"));
        }
        if self.prefix.contains(['/', '\\']) {
            return Err(SnapshotError::validation(format!(
                "prefix must not contain path separators: {}",
                self.prefix
            )));
        }
        if let Some(level) = self.compression_level {
            if level > 9 {
                return Err(SnapshotError::validation(format!(
                    "compression level must be between 0 and 9, got {level}"
                )));
            }
        }
        self.exclusion_set()?;
        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            destination: None,
            prefix: DEFAULT_PREFIX.to_string(),
            exclusion_patterns: DEFAULT_EXCLUSIONS.iter().map(|p| p.to_string()).collect(),
            compression_level: None,
            skip_unreadable: true,
            list_entries: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_matches_fixed_behavior() {
        let config = SnapshotConfig::default();
        assert_eq!(config.source_dir, PathBuf::from("dlbs"));
        assert_eq!(config.prefix, "dlbs");
        assert!(config.destination.is_none());
        assert_eq!(config.exclusion_patterns.len(), DEFAULT_EXCLUSIONS.len());
        assert!(config.exclusion_patterns.contains(&"*.tgz".to_string()));
        assert!(config.skip_unreadable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = SnapshotConfig::for_source("/data/project")
            .with_destination("/backups")
            .with_exclusions(["*.tmp"])
            .add_exclusions(["*.bak"]);
        assert_eq!(config.source_dir, PathBuf::from("/data/project"));
        assert_eq!(config.destination, Some(PathBuf::from("/backups")));
        assert_eq!(config.exclusion_patterns, vec!["*.tmp", "*.bak"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SnapshotConfig::default();
        config.prefix = String::new();
        assert!(config.validate().is_err());

        let mut config = SnapshotConfig::default();
        config.prefix = "nested/name".to_string();
        assert!(config.validate().is_err());

        let mut config = SnapshotConfig::default();
        config.compression_level = Some(10);
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("compression level"));

        let config = SnapshotConfig::default().add_exclusions(["[oops"]);
        assert!(matches!(config.validate(), Err(SnapshotError::Pattern(_))));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"source_dir": "bench", "compression_level": 9}"#).unwrap();

        let config = SnapshotConfig::from_json_file(&path).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("bench"));
        assert_eq!(config.compression_level, Some(9));
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.exclusion_patterns.len(), DEFAULT_EXCLUSIONS.len());
    }

    #[test]
    fn test_from_json_file_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = SnapshotConfig::from_json_file(&path);
        assert!(matches!(result, Err(SnapshotError::Json(_))));
    }
}
