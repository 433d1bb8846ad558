//! Configuration for segkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default file name prefix for segment files
pub const DEFAULT_SEGMENT_PREFIX: &str = "segment-data-";

/// Default rollover threshold for the active segment (bytes)
pub const DEFAULT_SEGMENT_SIZE_LIMIT: u64 = 10_000_000;

/// Main configuration for a segkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segment-data-1
    ///     ├── segment-data-2
    ///     └── ...
    pub data_dir: PathBuf,

    /// File name prefix; segment files are named `<prefix><number>`
    pub segment_prefix: String,

    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Once the active segment grows past this many bytes, the next put
    /// rolls over to a fresh segment
    pub segment_size_limit: u64,

    /// fsync (data only) after every append
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./segkv_data"),
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            segment_size_limit: DEFAULT_SEGMENT_SIZE_LIMIT,
            sync_writes: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment file name prefix
    pub fn segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.segment_prefix = prefix.into();
        self
    }

    /// Set the rollover threshold (in bytes)
    pub fn segment_size_limit(mut self, size: u64) -> Self {
        self.config.segment_size_limit = size;
        self
    }

    /// Sync every append to disk
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
