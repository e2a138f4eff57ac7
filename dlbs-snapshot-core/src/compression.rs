/*!
Gzip compression for snapshot archives.

The archive is streamed: the tar builder writes into a gzip encoder that
writes into the output file, so nothing is buffered in memory beyond the
encoder's window.
*/

use crate::{Result, SnapshotError};
use flate2::{write::GzEncoder, Compression};
use std::io::Write;

/// Gzip stream compressor
///
/// Uses the DEFLATE algorithm at the configured level. The default level
/// matches what the `gzip` tool uses.
///
/// # Example
/// ```rust
/// use dlbs_snapshot_core::GzipCompressor;
///
/// let compressor = GzipCompressor::new();
/// let mut encoder = compressor.encoder(Vec::new());
/// std::io::Write::write_all(&mut encoder, b"snapshot bytes").unwrap();
/// let compressed = encoder.finish().unwrap();
/// assert!(!compressed.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Create a new gzip compressor with default compression level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Create a new gzip compressor with the specified compression level
    ///
    /// # Arguments
    /// * `level` - Compression level (0-9, where 0 is no compression and 9 is maximum)
    ///
    /// # Errors
    /// * `SnapshotError::Validation` - If the level is above 9
    pub fn with_level(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(SnapshotError::validation(format!(
                "compression level must be between 0 and 9, got {level}"
            )));
        }
        Ok(Self {
            compression_level: Compression::new(level),
        })
    }

    /// Create a compressor from an optional configured level
    pub fn from_level(level: Option<u32>) -> Result<Self> {
        match level {
            Some(level) => Self::with_level(level),
            None => Ok(Self::new()),
        }
    }

    /// Create a compressor for fast compression (level 1)
    pub fn fast() -> Self {
        Self {
            compression_level: Compression::fast(),
        }
    }

    /// Create a compressor for maximum compression (level 9)
    pub fn max() -> Self {
        Self {
            compression_level: Compression::best(),
        }
    }

    /// Wrap `writer` in a gzip stream at this compressor's level
    pub fn encoder<W: Write>(&self, writer: W) -> GzEncoder<W> {
        GzEncoder::new(writer, self.compression_level)
    }

    /// Numeric compression level
    pub fn level(&self) -> u32 {
        self.compression_level.level()
    }

    /// Get the name of the compression algorithm
    pub fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}
