/*!
Logging setup for the snapshot tool.

Standard output is reserved for the per-entry listing, so every log line,
warning and diagnostic is written to standard error.
*/

use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SnapshotError};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Build the level filter.
///
/// `RUST_LOG` wins when set; otherwise `debug` with `verbose`, else `info`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// * `SnapshotError::Validation` - If a global subscriber is already installed
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = env_filter(verbose);

    let result = match format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_current_span(false);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
    };

    result.map_err(|e| {
        SnapshotError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Tracing initialized");
    Ok(())
}
