/*!
Output placement for snapshot archives.
*/

use crate::{Result, SnapshotError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Where archives are written
///
/// Without a base directory, archive names resolve against the current
/// working directory.
///
/// # Example
/// ```rust
/// use dlbs_snapshot_core::OutputLocation;
///
/// let output = OutputLocation::with_base_dir("/var/backups/dlbs");
/// assert_eq!(
///     output.resolve("dlbs_20230101-000000UTC.tgz"),
///     std::path::PathBuf::from("/var/backups/dlbs/dlbs_20230101-000000UTC.tgz")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutputLocation {
    /// Optional base directory for all archives
    base_dir: Option<PathBuf>,
}

impl OutputLocation {
    /// Write archives into the current working directory
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Write archives into `base_dir`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// The directory archives land in, `.` when none is configured
    pub fn base_dir_or_cwd(&self) -> &Path {
        self.base_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Resolve the full path for an archive name
    pub fn resolve(&self, name: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Ensure the parent directory exists, creating it if necessary
    pub fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| SnapshotError::from_io(e, parent))?;
                tracing::debug!("Created output directory {}", parent.display());
            }
        }
        Ok(())
    }
}

/// An archive file that is still being written.
///
/// The file is created exclusively, so an existing archive is never
/// overwritten. Unless [`PartialOutput::commit`] succeeds, dropping the guard
/// deletes the file: a failed or interrupted run leaves nothing behind.
#[derive(Debug)]
pub struct PartialOutput {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl PartialOutput {
    /// Create `path`, failing with `OutputExists` if it is already there
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| SnapshotError::from_io(e, path))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            bytes_written: 0,
        })
    }

    /// Flush and sync the file to disk, keeping it.
    ///
    /// Returns the archive path and its final size.
    pub fn commit(mut self) -> Result<(PathBuf, u64)> {
        let file = self.file.take().ok_or_else(|| {
            SnapshotError::Io(io::Error::new(io::ErrorKind::Other, "output already closed"))
        })?;

        let synced = file
            .sync_all()
            .map_err(|e| SnapshotError::from_io(e, &self.path));
        if let Err(e) = synced {
            // Put the handle back so Drop still cleans up.
            self.file = Some(file);
            return Err(e);
        }

        let path = std::mem::take(&mut self.path);
        Ok((path, self.bytes_written))
    }
}

impl Write for PartialOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output already closed"))?;
        let written = file.write(buf)?;
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!("Removed incomplete archive {}", self.path.display()),
                Err(e) => tracing::warn!(
                    "Failed to remove incomplete archive {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}
