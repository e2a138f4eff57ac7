/*!
Read-only listing of snapshots already present in a directory.
*/

use crate::job::parse_output_name;
use crate::{Result, SnapshotError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A snapshot archive found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Timestamp recovered from the file name
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

/// List the snapshots in `dir` whose names were produced with `prefix`.
///
/// Results are sorted oldest first. Files with other names are ignored, and a
/// missing directory yields an empty list.
pub fn list_snapshots(dir: &Path, prefix: &str) -> Result<Vec<SnapshotEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No snapshot directory at {}", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(SnapshotError::from_io(e, dir)),
    };

    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::from_io(e, dir))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();

        let Some(timestamp) = parse_output_name(prefix, &file_name) else {
            continue;
        };

        match entry.metadata() {
            Ok(meta) if meta.is_file() => snapshots.push(SnapshotEntry {
                path: entry.path(),
                file_name,
                timestamp,
                size: meta.len(),
            }),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to stat {}: {}", entry.path().display(), e),
        }
    }

    snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(snapshots)
}

/// Human-readable byte count, e.g. `1.5 KB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
