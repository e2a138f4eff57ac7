/*!
# DLBS Snapshot Core

Creates timestamped, gzip-compressed tar snapshots of a directory tree.

A snapshot run:

- captures the current UTC time once and names the archive
  `<prefix>_<YYYYMMDD-HHMMSS>UTC.tgz`
- walks the source directory in name order, pruning entries that match the
  exclusion globs (build artifacts, logs, caches, earlier archives)
- streams every remaining entry into a tar archive through gzip, with paths
  relative to the parent of the source directory
- lists each archived entry on standard output as it goes

A failed run never leaves a partial archive behind.

## Usage

```rust,no_run
use dlbs_snapshot_core::{create_default_creator, ArchiveJob, SnapshotConfig};

let config = SnapshotConfig::for_source("dlbs").with_destination("backups");
let job = ArchiveJob::new(&config)?;
let outcome = create_default_creator().create_snapshot(&job)?;
println!("{} ({} entries)", outcome.archive_path.display(), outcome.entries_archived);
# Ok::<(), dlbs_snapshot_core::SnapshotError>(())
```
*/

pub mod catalog;
pub mod compression;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod job;
pub mod observability;
pub mod output;
pub mod progress;
pub mod snapshot;


pub use catalog::{list_snapshots, SnapshotEntry};
pub use compression::GzipCompressor;
pub use config::SnapshotConfig;
pub use error::{Result, SnapshotError};
pub use exclusion::{ExclusionSet, DEFAULT_EXCLUSIONS};
pub use job::ArchiveJob;
pub use output::OutputLocation;
pub use progress::{EntryKind, MemoryProgress, ProgressReporter, SilentProgress, StdoutProgress};
pub use snapshot::{
    create_default_creator, create_snapshot, PlannedEntry, SkippedEntry, SnapshotCreator,
    SnapshotOutcome,
};
