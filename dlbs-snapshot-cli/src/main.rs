/*!
DLBS snapshot CLI - writes a timestamped `.tgz` snapshot of the benchmark tree.

Run without arguments it snapshots `./dlbs` into the current directory using
the built-in exclusion list. Every default can be overridden by a flag, an
environment variable or a JSON configuration file.
*/

use clap::{Parser, Subcommand};
use dlbs_snapshot_core::{
    catalog::format_size,
    list_snapshots,
    observability::{init_tracing, LogFormat},
    progress::listing_line,
    ArchiveJob, ProgressReporter, SilentProgress, SnapshotConfig, SnapshotCreator, SnapshotError,
    SnapshotOutcome, StdoutProgress,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

/// Exit status for an archive written with unreadable entries skipped
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(name = "dlbs-snapshot")]
#[command(about = "Create a timestamped tar.gz snapshot of the DLBS source tree")]
#[command(version)]
#[command(after_help = "Exit status: 0 on success, 1 on error, 2 when unreadable \
entries were skipped, 130 when the run was interrupted.")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// JSON configuration file; flags override its values
    #[arg(short, long, global = true, env = "DLBS_SNAPSHOT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to snapshot
    #[arg(short, long, global = true, env = "DLBS_SNAPSHOT_SOURCE")]
    source: Option<PathBuf>,

    /// Directory the archive is written to
    #[arg(short, long, global = true, env = "DLBS_SNAPSHOT_DEST")]
    dest: Option<PathBuf>,

    /// Archive name prefix
    #[arg(short, long, global = true, env = "DLBS_SNAPSHOT_PREFIX")]
    prefix: Option<String>,

    /// Additional exclusion glob (repeatable)
    #[arg(short = 'x', long = "exclude", global = true, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Start from an empty exclusion list
    #[arg(long, global = true)]
    no_default_excludes: bool,

    /// Gzip compression level
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: Option<u32>,

    /// Abort on the first unreadable entry instead of skipping it
    #[arg(long, global = true)]
    strict: bool,

    /// Do not list archived entries
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a snapshot (the default)
    Create,
    /// Show what a snapshot would contain without writing it
    Plan,
    /// List existing snapshots in the destination directory
    List,
}

#[derive(Tabled)]
struct SnapshotInfo {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created (UTC)")]
    created: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("Warning: {e}");
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<SnapshotError>()
                .map(SnapshotError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, anyhow::Error> {
    let config = build_config(&cli)?;

    match cli.command.unwrap_or(Commands::Create) {
        Commands::Create => create(&config),
        Commands::Plan => plan(&config),
        Commands::List => list(&config),
    }
}

fn build_config(cli: &Cli) -> Result<SnapshotConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SnapshotConfig::from_json_file(path)?
        }
        None => SnapshotConfig::default(),
    };

    if let Some(source) = &cli.source {
        config.source_dir = source.clone();
    }
    if let Some(dest) = &cli.dest {
        config.destination = Some(dest.clone());
    }
    if let Some(prefix) = &cli.prefix {
        config.prefix = prefix.clone();
    }
    if cli.no_default_excludes {
        config.exclusion_patterns.clear();
    }
    config.exclusion_patterns.extend(cli.exclude.iter().cloned());
    if cli.level.is_some() {
        config.compression_level = cli.level;
    }
    if cli.strict {
        config.skip_unreadable = false;
    }
    if cli.quiet {
        config.list_entries = false;
    }

    config.validate()?;
    Ok(config)
}

fn create(config: &SnapshotConfig) -> Result<ExitCode, anyhow::Error> {
    let job = ArchiveJob::new(config)?;

    let reporter: Box<dyn ProgressReporter> = if config.list_entries {
        Box::new(StdoutProgress::new())
    } else {
        Box::new(SilentProgress)
    };
    let outcome = SnapshotCreator::new(reporter).create_snapshot(&job)?;

    info!(
        "Wrote {} ({} entries, {})",
        outcome.archive_path.display(),
        outcome.entries_archived,
        format_size(outcome.archive_size)
    );

    for skipped in &outcome.skipped {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    let status = exit_status(&outcome);
    if status != 0 {
        warn!("Exiting with failure status due to previous errors");
    }
    Ok(ExitCode::from(status))
}

/// Exit status for a run that produced an archive
fn exit_status(outcome: &SnapshotOutcome) -> u8 {
    if outcome.is_complete() {
        0
    } else {
        EXIT_PARTIAL
    }
}

fn plan(config: &SnapshotConfig) -> Result<ExitCode, anyhow::Error> {
    let job = ArchiveJob::new(config)?;
    let planned = SnapshotCreator::new(SilentProgress).plan(&job)?;

    for entry in &planned {
        println!("{}", listing_line(&entry.archive_name, entry.kind));
    }
    info!(
        "{} entries would be written to {}",
        planned.len(),
        job.output_path().display()
    );
    Ok(ExitCode::SUCCESS)
}

fn list(config: &SnapshotConfig) -> Result<ExitCode, anyhow::Error> {
    let dir = config
        .destination
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Listing snapshots in {}", dir.display());

    let snapshots = list_snapshots(&dir, &config.prefix)?;
    if snapshots.is_empty() {
        println!("No snapshots found");
        return Ok(ExitCode::SUCCESS);
    }

    let rows: Vec<SnapshotInfo> = snapshots
        .into_iter()
        .map(|snapshot| SnapshotInfo {
            name: snapshot.file_name,
            created: snapshot.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: format_size(snapshot.size),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(ExitCode::SUCCESS)
}
