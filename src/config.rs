//! Configuration for LodeKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use tracing::Dispatch;

use crate::error::{LodeError, Result};

/// Main configuration for a LodeKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── data.db          (memory-mapped page arena)
    ///     └── index.log        (append-only key -> pages log)
    pub data_dir: PathBuf,

    /// Size of a single page in bytes.
    ///
    /// Not persisted: a directory must always be reopened with the page size
    /// it was created with.
    pub page_size: usize,

    /// Size of a freshly created data file (in bytes)
    pub initial_data_size: u64,

    /// Largest size the data file may grow to (in bytes); unlimited if None
    pub max_data_size: Option<u64>,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Rewrite the log on open when replay found too much superseded history
    pub auto_compact: bool,

    // -------------------------------------------------------------------------
    // Logging Configuration
    // -------------------------------------------------------------------------
    /// Subscriber used for this instance's events instead of the global default
    pub dispatch: Option<Dispatch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lodekv_data"),
            page_size: 256,
            initial_data_size: 1 << 20, // 1 MB
            max_data_size: None,
            auto_compact: true,
            dispatch: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the storage options describe a usable page arena
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(LodeError::Config("page_size must be greater than 0".to_string()));
        }
        if self.initial_data_size < self.page_size as u64 {
            return Err(LodeError::Config(format!(
                "initial_data_size ({}) must hold at least one page of {} bytes",
                self.initial_data_size, self.page_size
            )));
        }
        if let Some(max) = self.max_data_size {
            if max < self.initial_data_size {
                return Err(LodeError::Config(format!(
                    "max_data_size ({}) is smaller than initial_data_size ({})",
                    max, self.initial_data_size
                )));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the size of a new data file (in bytes)
    pub fn initial_data_size(mut self, size: u64) -> Self {
        self.config.initial_data_size = size;
        self
    }

    /// Cap the data file size (in bytes)
    pub fn max_data_size(mut self, size: u64) -> Self {
        self.config.max_data_size = Some(size);
        self
    }

    /// Enable or disable compaction on open
    pub fn auto_compact(mut self, enabled: bool) -> Self {
        self.config.auto_compact = enabled;
        self
    }

    /// Route this instance's events to the given subscriber
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.config.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
