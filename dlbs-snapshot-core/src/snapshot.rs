/*!
Snapshot creator: walks a source tree and streams it into a `.tgz` archive.

This module contains the core business logic of a snapshot run,
orchestrating the exclusion filter, gzip compression, output placement and
progress reporting.
*/

use crate::compression::GzipCompressor;
use crate::config::SnapshotConfig;
use crate::job::ArchiveJob;
use crate::output::PartialOutput;
use crate::progress::{EntryKind, ProgressReporter, StdoutProgress};
use crate::{Result, SnapshotError};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tar::{Builder, Header, HeaderMode};
use walkdir::WalkDir;

/// An entry that could not be archived intact: left out because it could
/// not be read, or padded because it shrank while being read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// An entry the archive will contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    /// Location on disk
    pub path: PathBuf,
    /// Name inside the archive, relative to the source's parent
    pub archive_name: PathBuf,
    pub kind: EntryKind,
}

/// Summary of a finished snapshot run
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    /// Path of the archive that was written
    pub archive_path: PathBuf,
    /// Time the job was stamped with
    pub timestamp: DateTime<Utc>,
    /// Number of entries (directories, files, symlinks) in the archive
    pub entries_archived: usize,
    /// Uncompressed bytes of file content archived
    pub content_bytes: u64,
    /// Size of the compressed archive on disk
    pub archive_size: u64,
    /// Entries that were unreadable or changed while being read
    pub skipped: Vec<SkippedEntry>,
}

impl SnapshotOutcome {
    /// True when every non-excluded entry made it into the archive
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Main engine for snapshot runs
///
/// # Example
/// ```rust,no_run
/// use dlbs_snapshot_core::{ArchiveJob, SnapshotConfig, SnapshotCreator, StdoutProgress};
///
/// let creator = SnapshotCreator::new(StdoutProgress::new());
/// let job = ArchiveJob::new(&SnapshotConfig::default())?;
/// let outcome = creator.create_snapshot(&job)?;
/// println!("wrote {}", outcome.archive_path.display());
/// # Ok::<(), dlbs_snapshot_core::SnapshotError>(())
/// ```
pub struct SnapshotCreator<R>
where
    R: ProgressReporter,
{
    reporter: R,
    cancel: Option<Arc<AtomicBool>>,
}

impl<R> SnapshotCreator<R>
where
    R: ProgressReporter,
{
    /// Create a new snapshot creator reporting progress to `reporter`
    pub fn new(reporter: R) -> Self {
        Self {
            reporter,
            cancel: None,
        }
    }

    /// Abort the run with `InterruptedRun` once `flag` is set.
    ///
    /// The flag is checked before each entry.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// List the entries a run of `job` would archive, without writing anything
    ///
    /// Unreadable directories are logged and left out of the plan.
    pub fn plan(&self, job: &ArchiveJob) -> Result<Vec<PlannedEntry>> {
        check_source(job.source_path())?;
        let root_name = job.archive_root_name()?;

        let mut planned = Vec::new();
        for item in walk_tree(job, &root_name) {
            match item {
                Ok(entry) => planned.push(entry),
                Err(e) => {
                    let (path, err) = split_walk_error(e, job.source_path());
                    tracing::warn!("Cannot read {}: {}", path.display(), err);
                }
            }
        }
        Ok(planned)
    }

    /// Write the snapshot described by `job`
    ///
    /// This method:
    /// 1. Checks that the source directory exists
    /// 2. Creates the output file exclusively (never overwriting)
    /// 3. Walks the source in name order, pruning excluded entries
    /// 4. Streams each entry into a gzip-compressed tar archive
    /// 5. Finishes the gzip stream and syncs the file to disk
    ///
    /// Any failure removes the partially written archive.
    ///
    /// # Errors
    /// * `SnapshotError::SourceNotFound` - If the source directory does not exist
    /// * `SnapshotError::PermissionDenied` - If an entry cannot be read and the
    ///   job does not skip unreadable entries, or the output cannot be created
    /// * `SnapshotError::DiskFull` - If the output device runs out of space
    /// * `SnapshotError::OutputExists` - If the archive name is already taken
    /// * `SnapshotError::InterruptedRun` - If the run was cancelled
    pub fn create_snapshot(&self, job: &ArchiveJob) -> Result<SnapshotOutcome> {
        check_source(job.source_path())?;
        let root_name = job.archive_root_name()?;
        let compressor = GzipCompressor::from_level(job.compression_level())?;

        let output_path = job.output_path();
        job.output_location().ensure_parent_dir(&output_path)?;

        tracing::info!(
            "Creating snapshot {} from {} ({} level {})",
            output_path.display(),
            job.source_path().display(),
            compressor.algorithm_name(),
            compressor.level()
        );
        tracing::debug!("Exclusions: {:?}", job.exclusions().patterns());

        let partial = PartialOutput::create(&output_path)?;
        let mut builder = Builder::new(compressor.encoder(BufWriter::new(partial)));
        builder.mode(HeaderMode::Complete);
        builder.follow_symlinks(false);

        let mut entries_archived = 0usize;
        let mut content_bytes = 0u64;
        let mut skipped = Vec::new();

        for item in walk_tree(job, &root_name) {
            self.check_cancelled()?;

            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    let (path, err) = split_walk_error(e, job.source_path());
                    self.skip_or_fail(job, path, err, &mut skipped)?;
                    continue;
                }
            };

            let Some(bytes) =
                self.append_entry(&mut builder, job, &entry, &output_path, &mut skipped)?
            else {
                continue;
            };

            content_bytes += bytes;
            entries_archived += 1;
            self.reporter.entry(&entry.archive_name, entry.kind);
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| SnapshotError::from_io(e, &output_path))?;
        let buffered = encoder
            .finish()
            .map_err(|e| SnapshotError::from_io(e, &output_path))?;
        let partial = buffered
            .into_inner()
            .map_err(|e| SnapshotError::from_io(e.into_error(), &output_path))?;
        let (archive_path, archive_size) = partial.commit()?;

        if skipped.is_empty() {
            tracing::info!(
                "Snapshot {} complete: {} entries, {} bytes compressed to {}",
                archive_path.display(),
                entries_archived,
                content_bytes,
                archive_size
            );
        } else {
            tracing::warn!(
                "Snapshot {} written with {} unreadable entries skipped",
                archive_path.display(),
                skipped.len()
            );
        }

        Ok(SnapshotOutcome {
            archive_path,
            timestamp: job.timestamp(),
            entries_archived,
            content_bytes,
            archive_size,
            skipped,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(SnapshotError::InterruptedRun),
            _ => Ok(()),
        }
    }

    /// Append one walked entry and return the file content bytes written,
    /// or `None` when the entry was skipped.
    fn append_entry<W: io::Write>(
        &self,
        builder: &mut Builder<W>,
        job: &ArchiveJob,
        entry: &PlannedEntry,
        output_path: &Path,
        skipped: &mut Vec<SkippedEntry>,
    ) -> Result<Option<u64>> {
        let appended = match entry.kind {
            EntryKind::Directory => builder.append_dir(&entry.archive_name, &entry.path),
            EntryKind::Symlink => builder.append_path_with_name(&entry.path, &entry.archive_name),
            EntryKind::File => {
                let file = match File::open(&entry.path) {
                    Ok(file) => file,
                    Err(e) => {
                        self.skip_or_fail(job, entry.path.clone(), e, skipped)?;
                        return Ok(None);
                    }
                };
                let (size, padded) = append_file(builder, entry, file, output_path)?;
                if padded > 0 {
                    let err = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("File shrank by {padded} bytes; padding with zeros"),
                    );
                    self.skip_or_fail(job, entry.path.clone(), err, skipped)?;
                }
                return Ok(Some(size));
            }
        };

        match appended {
            Ok(()) => Ok(Some(0)),
            // Removed between the walk and the append; nothing was written yet.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.skip_or_fail(job, entry.path.clone(), e, skipped)?;
                Ok(None)
            }
            Err(e) => Err(classify(e, &entry.path, output_path)),
        }
    }

    fn skip_or_fail(
        &self,
        job: &ArchiveJob,
        path: PathBuf,
        err: io::Error,
        skipped: &mut Vec<SkippedEntry>,
    ) -> Result<()> {
        if !job.skip_unreadable() || err.kind() == io::ErrorKind::Interrupted {
            return Err(SnapshotError::from_io(err, &path));
        }
        tracing::warn!("{}: {}", path.display(), err);
        skipped.push(SkippedEntry {
            path,
            reason: err.to_string(),
        });
        Ok(())
    }
}

/// Convenience function to create a snapshot creator that lists entries on stdout
pub fn create_default_creator() -> SnapshotCreator<StdoutProgress> {
    SnapshotCreator::new(StdoutProgress::new())
}

/// Snapshot `source_path` into the current directory, leaving out
/// `exclusion_patterns`, and return the archive path.
///
/// Uses the default prefix and compression level and lists each entry on
/// standard output.
pub fn create_snapshot<P, I, S>(source_path: P, exclusion_patterns: I) -> Result<PathBuf>
where
    P: Into<PathBuf>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = SnapshotConfig::for_source(source_path).with_exclusions(exclusion_patterns);
    let job = ArchiveJob::new(&config)?;
    let outcome = create_default_creator().create_snapshot(&job)?;
    Ok(outcome.archive_path)
}

fn check_source(source: &Path) -> Result<()> {
    match std::fs::metadata(source) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SnapshotError::validation(format!(
            "source is not a directory: {}",
            source.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(SnapshotError::SourceNotFound(source.to_path_buf()))
        }
        Err(e) => Err(SnapshotError::from_io(e, source)),
    }
}

/// Walk the source tree in name order, pruning excluded entries.
///
/// Special files are logged and dropped here so callers only see entries
/// that can be archived.
fn walk_tree<'a>(
    job: &'a ArchiveJob,
    root_name: &'a Path,
) -> impl Iterator<Item = std::result::Result<PlannedEntry, walkdir::Error>> + 'a {
    let source = job.source_path();
    let exclusions = job.exclusions();

    WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                return true;
            };
            let excluded = exclusions.is_excluded(relative);
            if excluded {
                tracing::debug!("Excluding {}", relative.display());
            }
            !excluded
        })
        .filter_map(move |item| {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let Some(kind) = EntryKind::from_file_type(entry.file_type()) else {
                tracing::warn!("{}: socket or device ignored", entry.path().display());
                return None;
            };
            let archive_name = match entry.path().strip_prefix(source) {
                Ok(relative) if relative.as_os_str().is_empty() => root_name.to_path_buf(),
                Ok(relative) => root_name.join(relative),
                Err(_) => root_name.join(entry.file_name()),
            };
            Some(Ok(PlannedEntry {
                path: entry.into_path(),
                archive_name,
                kind,
            }))
        })
}

fn split_walk_error(err: walkdir::Error, source: &Path) -> (PathBuf, io::Error) {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.to_path_buf());
    let io_err = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));
    (path, io_err)
}

/// Reader over a file's contents that yields exactly the size recorded in
/// its tar header.
///
/// Bytes appended after the header was sized are cut off. A file that
/// shrinks is padded with zeros so later entries stay aligned. Read errors
/// are remembered so they can be blamed on the source file.
struct SourceReader<T> {
    inner: io::Take<T>,
    remaining: u64,
    padded: u64,
    failed: bool,
}

impl<T: Read> SourceReader<T> {
    fn new(inner: T, size: u64) -> Self {
        Self {
            inner: inner.take(size),
            remaining: size,
            padded: 0,
            failed: false,
        }
    }
}

impl<T: Read> Read for SourceReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let read = self.inner.read(buf).map_err(|e| {
            self.failed = true;
            e
        })?;
        if read > 0 {
            self.remaining -= read as u64;
            return Ok(read);
        }

        let pad = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        buf[..pad].fill(0);
        self.remaining -= pad as u64;
        self.padded += pad as u64;
        Ok(pad)
    }
}

/// Append a regular file and return its archived size and the number of
/// zero bytes padded in for content that vanished during the read.
fn append_file<W: io::Write>(
    builder: &mut Builder<W>,
    entry: &PlannedEntry,
    file: File,
    output_path: &Path,
) -> Result<(u64, u64)> {
    let meta = file
        .metadata()
        .map_err(|e| SnapshotError::from_io(e, &entry.path))?;
    let size = meta.len();

    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&meta, HeaderMode::Complete);

    let mut reader = SourceReader::new(file, size);
    let result = builder.append_data(&mut header, &entry.archive_name, &mut reader);
    match result {
        Ok(()) => Ok((size, reader.padded)),
        Err(e) if reader.failed => Err(SnapshotError::from_io(e, &entry.path)),
        Err(e) => Err(classify(e, &entry.path, output_path)),
    }
}

/// Attribute an error from the tar builder.
///
/// Permission failures come from the source entry; anything else happened
/// while writing the archive.
fn classify(err: io::Error, source: &Path, output: &Path) -> SnapshotError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => SnapshotError::from_io(err, source),
        _ => SnapshotError::from_io(err, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryProgress;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 15, 12, 30, 45).unwrap()
    }

    fn archive_names(path: &Path) -> BTreeSet<String> {
        let file = File::open(path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let name = e.unwrap().path().unwrap().to_string_lossy().into_owned();
                name.trim_end_matches('/').to_string()
            })
            .collect()
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("dlbs");
        let dest = temp_dir.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        (temp_dir, source, dest)
    }

    #[test]
    fn test_scenario_only_sources_are_archived() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "print('a')").unwrap();
        fs::write(source.join("a.pyc"), "bytecode").unwrap();
        fs::write(source.join("build.log"), "log").unwrap();
        fs::write(source.join("pkg.whl"), "wheel").unwrap();
        fs::create_dir(source.join("__pycache__")).unwrap();
        fs::write(source.join("__pycache__/x.pyc"), "bytecode").unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new());

        let outcome = creator.create_snapshot(&job).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.entries_archived, 2);
        assert_eq!(outcome.content_bytes, 10);
        assert_eq!(
            outcome.archive_path,
            dest.join("dlbs_20230615-123045UTC.tgz")
        );

        let names = archive_names(&outcome.archive_path);
        let expected: BTreeSet<String> =
            ["dlbs", "dlbs/a.py"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
        assert_eq!(creator.reporter().lines(), vec!["dlbs/", "dlbs/a.py"]);
    }

    #[test]
    fn test_listing_follows_name_order() {
        let (_temp_dir, source, dest) = setup();
        fs::create_dir(source.join("sub")).unwrap();
        fs::write(source.join("sub/z.txt"), "z").unwrap();
        fs::write(source.join("b.txt"), "b").unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new());
        creator.create_snapshot(&job).unwrap();

        assert_eq!(
            creator.reporter().lines(),
            vec!["dlbs/", "dlbs/a.txt", "dlbs/b.txt", "dlbs/sub/", "dlbs/sub/z.txt"]
        );
    }

    #[test]
    fn test_missing_source_creates_nothing() {
        let (temp_dir, _source, dest) = setup();
        let config =
            SnapshotConfig::for_source(temp_dir.path().join("missing")).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();

        let result = SnapshotCreator::new(MemoryProgress::new()).create_snapshot(&job);
        assert!(matches!(result, Err(SnapshotError::SourceNotFound(_))));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_existing_archive_is_left_alone() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();
        let existing = dest.join("dlbs_20230615-123045UTC.tgz");
        fs::write(&existing, "earlier run").unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let result = SnapshotCreator::new(MemoryProgress::new()).create_snapshot(&job);

        assert!(matches!(result, Err(SnapshotError::OutputExists(_))));
        assert_eq!(fs::read(&existing).unwrap(), b"earlier run");
    }

    #[test]
    fn test_cancelled_run_removes_partial_output() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new()).with_cancel_flag(flag);

        let result = creator.create_snapshot(&job);
        assert!(matches!(result, Err(SnapshotError::InterruptedRun)));
        assert!(!job.output_path().exists());
    }

    #[test]
    fn test_output_inside_source_is_not_archived() {
        let (_temp_dir, source, _dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();
        fs::write(source.join("dlbs_20230101-000000UTC.tgz"), "old").unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&source);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let outcome = SnapshotCreator::new(MemoryProgress::new())
            .create_snapshot(&job)
            .unwrap();

        let names = archive_names(&outcome.archive_path);
        assert!(names.contains("dlbs/a.py"));
        assert!(!names.iter().any(|n| n.ends_with(".tgz")));
    }

    #[test]
    fn test_plan_matches_archive_without_writing() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();
        fs::write(source.join("run.log"), "log").unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new());

        let planned = creator.plan(&job).unwrap();
        let names: Vec<PathBuf> = planned.iter().map(|p| p.archive_name.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("dlbs"), PathBuf::from("dlbs/a.py")]);
        assert_eq!(planned[0].kind, EntryKind::Directory);
        assert!(!job.output_path().exists());
        assert!(creator.reporter().lines().is_empty());
    }

    #[test]
    fn test_archived_file_contents_and_mode() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("run.py"), "#!/usr/bin/env python\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(source.join("run.py"), fs::Permissions::from_mode(0o755))
                .unwrap();
        }

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let outcome = SnapshotCreator::new(MemoryProgress::new())
            .create_snapshot(&job)
            .unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&outcome.archive_path).unwrap()));
        let mut found = false;
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap() == Path::new("dlbs/run.py") {
                let mut contents = String::new();
                entry.read_to_string(&mut contents).unwrap();
                assert_eq!(contents, "#!/usr/bin/env python\n");
                #[cfg(unix)]
                assert_eq!(entry.header().mode().unwrap() & 0o777, 0o755);
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn test_short_source_is_padded_to_declared_size() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_size(10);
        header.set_mode(0o644);
        let mut reader = SourceReader::new(&b"abc"[..], 10);
        builder
            .append_data(&mut header, "dlbs/shrunk.txt", &mut reader)
            .unwrap();
        assert_eq!(reader.padded, 7);

        let mut next = Header::new_gnu();
        next.set_size(2);
        next.set_mode(0o644);
        builder
            .append_data(&mut next, "dlbs/next.txt", &b"ok"[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entries = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            entries.push((name, contents));
        }
        assert_eq!(
            entries,
            vec![
                ("dlbs/shrunk.txt".to_string(), b"abc\0\0\0\0\0\0\0".to_vec()),
                ("dlbs/next.txt".to_string(), b"ok".to_vec()),
            ]
        );
    }

    #[test]
    fn test_grown_source_is_cut_to_declared_size() {
        let mut reader = SourceReader::new(&b"abcdef"[..], 3);
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abc");
        assert_eq!(reader.padded, 0);
    }

    #[test]
    fn test_entry_removed_after_walk_is_skipped() {
        let (_temp_dir, source, dest) = setup();
        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new());
        let mut builder = Builder::new(Vec::new());
        let mut skipped = Vec::new();

        for kind in [EntryKind::Directory, EntryKind::File] {
            let entry = PlannedEntry {
                path: source.join("gone"),
                archive_name: PathBuf::from("dlbs/gone"),
                kind,
            };
            let appended = creator
                .append_entry(&mut builder, &job, &entry, &job.output_path(), &mut skipped)
                .unwrap();
            assert_eq!(appended, None);
        }
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|s| s.path == source.join("gone")));
    }

    #[test]
    fn test_strict_job_fails_on_removed_entry() {
        let (_temp_dir, source, dest) = setup();
        let mut config = SnapshotConfig::for_source(&source).with_destination(&dest);
        config.skip_unreadable = false;
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let creator = SnapshotCreator::new(MemoryProgress::new());
        let mut builder = Builder::new(Vec::new());
        let mut skipped = Vec::new();

        let entry = PlannedEntry {
            path: source.join("gone"),
            archive_name: PathBuf::from("dlbs/gone"),
            kind: EntryKind::Directory,
        };
        let result =
            creator.append_entry(&mut builder, &job, &entry, &job.output_path(), &mut skipped);
        assert!(matches!(result, Err(SnapshotError::Io(_))));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_unreadable_entry_is_recorded_or_fatal() {
        let (_temp_dir, source, dest) = setup();
        let creator = SnapshotCreator::new(MemoryProgress::new());
        let denied = || io::Error::from(io::ErrorKind::PermissionDenied);

        let mut config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let mut skipped = Vec::new();
        creator
            .skip_or_fail(&job, source.join("secret.py"), denied(), &mut skipped)
            .unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].path, source.join("secret.py"));

        config.skip_unreadable = false;
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let result = creator.skip_or_fail(&job, source.join("secret.py"), denied(), &mut skipped);
        assert!(matches!(result, Err(SnapshotError::PermissionDenied { .. })));
        assert_eq!(skipped.len(), 1);
    }

    /// Drop read permission from `path`. Returns false when the process can
    /// still read it, as root can.
    #[cfg(unix)]
    fn make_unreadable(path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o000)).unwrap();
        fs::read(path).is_err()
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_skipped_and_archive_kept() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();
        fs::write(source.join("secret.py"), "hidden").unwrap();
        if !make_unreadable(&source.join("secret.py")) {
            return;
        }

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let outcome = SnapshotCreator::new(MemoryProgress::new())
            .create_snapshot(&job)
            .unwrap();

        assert!(!outcome.is_complete());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, source.join("secret.py"));
        let names = archive_names(&outcome.archive_path);
        assert!(names.contains("dlbs/a.py"));
        assert!(!names.contains("dlbs/secret.py"));
    }

    #[cfg(unix)]
    #[test]
    fn test_strict_run_removes_archive_on_unreadable_file() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("a.py"), "a").unwrap();
        fs::write(source.join("secret.py"), "hidden").unwrap();
        if !make_unreadable(&source.join("secret.py")) {
            return;
        }

        let mut config = SnapshotConfig::for_source(&source).with_destination(&dest);
        config.skip_unreadable = false;
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let result = SnapshotCreator::new(MemoryProgress::new()).create_snapshot(&job);

        assert!(matches!(result, Err(SnapshotError::PermissionDenied { .. })));
        assert!(!job.output_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_stored_not_followed() {
        let (_temp_dir, source, dest) = setup();
        fs::write(source.join("target.txt"), "data").unwrap();
        std::os::unix::fs::symlink("target.txt", source.join("link.txt")).unwrap();

        let config = SnapshotConfig::for_source(&source).with_destination(&dest);
        let job = ArchiveJob::at(&config, fixed_time()).unwrap();
        let outcome = SnapshotCreator::new(MemoryProgress::new())
            .create_snapshot(&job)
            .unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&outcome.archive_path).unwrap()));
        let link = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| e.path().unwrap() == Path::new("dlbs/link.txt"))
            .map(|e| e.header().entry_type())
            .unwrap();
        assert!(link.is_symlink());
    }
}
