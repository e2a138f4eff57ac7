/*!
Error types for the snapshot core engine.
*/

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type used throughout the snapshot core.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur while creating or inspecting snapshots.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The directory to snapshot does not exist
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A source entry could not be read, or the output could not be created
    #[error("Permission denied: {}: {}", .path.display(), .source)]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive could not be completely written
    #[error("No space left on device while writing {}", .0.display())]
    DiskFull(PathBuf),

    /// The run was interrupted before the archive was complete
    #[error("Snapshot run interrupted")]
    InterruptedRun,

    /// A snapshot with the same name already exists
    #[error("Output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// Invalid exclusion pattern
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors that do not fall into a more specific category
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON configuration errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a new pattern error
    pub fn pattern<S: Into<String>>(msg: S) -> Self {
        Self::Pattern(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify an I/O error raised while touching `path`.
    ///
    /// Kinds with a dedicated variant are mapped onto it; everything else
    /// stays a plain `Io` error.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            },
            io::ErrorKind::Interrupted => Self::InterruptedRun,
            io::ErrorKind::AlreadyExists => Self::OutputExists(path.to_path_buf()),
            _ if is_storage_full(&err) => Self::DiskFull(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Process exit code for this error.
    ///
    /// An interrupted run maps to 130 like a shell killed by SIGINT, and
    /// everything else fatal maps to 1. 2 is reserved for runs that
    /// completed with skipped entries.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InterruptedRun => 130,
            _ => 1,
        }
    }
}

// ENOSPC (28) and EDQUOT (122 on Linux) both mean the output cannot grow.
fn is_storage_full(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(28) | Some(122))
        || err.to_string().contains("No space left on device")
}
