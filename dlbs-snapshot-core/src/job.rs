/*!
Archive job: the parameter set for one snapshot run.
*/

use crate::config::{SnapshotConfig, ARCHIVE_EXTENSION};
use crate::exclusion::ExclusionSet;
use crate::output::OutputLocation;
use crate::{Result, SnapshotError};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

/// strftime format of the timestamp embedded in archive names.
///
/// `%Z` renders as the literal `UTC` for a `DateTime<Utc>`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S%Z";

/// Format a timestamp the way it appears in archive names
///
/// # Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use dlbs_snapshot_core::job::format_timestamp;
///
/// let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// assert_eq!(format_timestamp(&ts), "20230101-000000UTC");
/// ```
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Build `<prefix>_<timestamp>.tgz`
pub fn output_name_for(prefix: &str, timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        format_timestamp(timestamp),
        ARCHIVE_EXTENSION
    )
}

/// Recover the timestamp from an archive name produced with `prefix`.
///
/// Returns `None` for names that were not produced by this tool.
pub fn parse_output_name(prefix: &str, name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(ARCHIVE_EXTENSION)?
        .strip_suffix('.')?
        .strip_suffix("UTC")?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d-%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// One snapshot run: what to archive, what to leave out, and where to write.
///
/// The timestamp is captured once, when the job is built, and fixes the
/// output name for the rest of the run.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    source_path: PathBuf,
    exclusions: ExclusionSet,
    timestamp: DateTime<Utc>,
    output_name: String,
    output: OutputLocation,
    compression_level: Option<u32>,
    skip_unreadable: bool,
}

impl ArchiveJob {
    /// Create a job from `config`, stamped with the current UTC time
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        Self::at(config, Utc::now())
    }

    /// Create a job from `config` with an explicit timestamp
    ///
    /// # Errors
    /// * `SnapshotError::Validation` - If the configuration is invalid, or the
    ///   archive would land inside the source tree without being excluded
    /// * `SnapshotError::Pattern` - If an exclusion pattern does not compile
    pub fn at(config: &SnapshotConfig, timestamp: DateTime<Utc>) -> Result<Self> {
        config.validate()?;

        let exclusions = config.exclusion_set()?;
        let output_name = output_name_for(&config.prefix, &timestamp);
        let output = match &config.destination {
            Some(dir) => OutputLocation::with_base_dir(dir),
            None => OutputLocation::new(),
        };

        let job = Self {
            source_path: config.source_dir.clone(),
            exclusions,
            timestamp,
            output_name,
            output,
            compression_level: config.compression_level,
            skip_unreadable: config.skip_unreadable,
        };
        job.check_output_not_archived()?;
        Ok(job)
    }

    /// Directory being snapshotted
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Compiled exclusion patterns
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Time the job was created
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// File name of the archive, e.g. `dlbs_20230101-000000UTC.tgz`
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Full path the archive is written to
    pub fn output_path(&self) -> PathBuf {
        self.output.resolve(&self.output_name)
    }

    pub fn output_location(&self) -> &OutputLocation {
        &self.output
    }

    pub fn compression_level(&self) -> Option<u32> {
        self.compression_level
    }

    pub fn skip_unreadable(&self) -> bool {
        self.skip_unreadable
    }

    /// Top-level directory name inside the archive.
    ///
    /// Entries are stored relative to the parent of the source directory, so
    /// they all start with the source directory's own name. `.` and paths
    /// ending in `..` fall back to the canonical name.
    pub fn archive_root_name(&self) -> Result<PathBuf> {
        if let Some(name) = self.source_path.file_name() {
            return Ok(PathBuf::from(name));
        }
        let canonical = self
            .source_path
            .canonicalize()
            .map_err(|e| SnapshotError::from_io(e, &self.source_path))?;
        canonical
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| {
                SnapshotError::validation(format!(
                    "cannot snapshot a filesystem root: {}",
                    self.source_path.display()
                ))
            })
    }

    /// The archive being written must never be swept into itself.
    ///
    /// A missing source is reported later as `SourceNotFound`. A missing
    /// destination is resolved through its nearest existing ancestor, since
    /// the run creates it before writing.
    fn check_output_not_archived(&self) -> Result<()> {
        let Ok(source) = self.source_path.canonicalize() else {
            return Ok(());
        };
        let Some(dest_dir) = resolve_through_ancestors(self.output.base_dir_or_cwd()) else {
            return Ok(());
        };
        let Ok(relative_dir) = dest_dir.strip_prefix(&source) else {
            return Ok(());
        };

        let relative_output = relative_dir.join(&self.output_name);
        if self.exclusions.is_excluded(&relative_output) {
            Ok(())
        } else {
            Err(SnapshotError::validation(format!(
                "archive {} would be written inside {} but is not excluded",
                relative_output.display(),
                self.source_path.display()
            )))
        }
    }
}

/// Canonicalize `path`, or the deepest ancestor of it that exists with the
/// missing components appended.
fn resolve_through_ancestors(path: &Path) -> Option<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(resolved) = current.canonicalize() {
            return Some(missing.iter().rev().fold(resolved, |acc, name| acc.join(name)));
        }
        missing.push(current.file_name()?);
        current = match current.parent()? {
            parent if parent.as_os_str().is_empty() => Path::new("."),
            parent => parent,
        };
    }
}
