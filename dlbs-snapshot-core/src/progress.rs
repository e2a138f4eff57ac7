/*!
Progress reporting for snapshot runs.

The snapshot creator announces every archived entry through a
[`ProgressReporter`]. The default reporter prints one line per entry to
standard output, like `tar -v`; diagnostics go through `tracing` instead so
the listing stays clean.
*/

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Kind of entry stored in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl EntryKind {
    /// Classify a file type without following symlinks.
    ///
    /// Returns `None` for sockets, fifos and device nodes, which are never
    /// archived.
    pub fn from_file_type(file_type: std::fs::FileType) -> Option<Self> {
        if file_type.is_symlink() {
            Some(Self::Symlink)
        } else if file_type.is_dir() {
            Some(Self::Directory)
        } else if file_type.is_file() {
            Some(Self::File)
        } else {
            None
        }
    }
}

/// Format an archive entry name the way tar lists it: directories get a
/// trailing slash.
pub fn listing_line(archive_name: &Path, kind: EntryKind) -> String {
    let name = archive_name.to_string_lossy();
    match kind {
        EntryKind::Directory => format!("{name}/"),
        EntryKind::File | EntryKind::Symlink => name.into_owned(),
    }
}

/// Receives one call per archived entry, in traversal order.
pub trait ProgressReporter {
    fn entry(&self, archive_name: &Path, kind: EntryKind);
}

/// Prints each entry to standard output
#[derive(Debug, Clone, Default)]
pub struct StdoutProgress;

impl StdoutProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for StdoutProgress {
    fn entry(&self, archive_name: &Path, kind: EntryKind) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not fail the archive itself.
        let _ = writeln!(stdout, "{}", listing_line(archive_name, kind));
    }
}

/// Reports nothing
#[derive(Debug, Clone, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn entry(&self, _archive_name: &Path, _kind: EntryKind) {}
}

/// In-memory reporter for testing
#[derive(Debug, Default)]
pub struct MemoryProgress {
    lines: Mutex<Vec<String>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines reported so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for MemoryProgress {
    fn entry(&self, archive_name: &Path, kind: EntryKind) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(listing_line(archive_name, kind));
        }
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for &R {
    fn entry(&self, archive_name: &Path, kind: EntryKind) {
        (**self).entry(archive_name, kind)
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Box<R> {
    fn entry(&self, archive_name: &Path, kind: EntryKind) {
        (**self).entry(archive_name, kind)
    }
}
