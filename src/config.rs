//! Configuration for a bigt database
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::file::{BUFFER_POOL_SIZE, FileError, FileResult, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PAGE_SIZE};

/// Main configuration for a database instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the paged database file. The catalog is stored next to it
    /// as `{db_path}.catalog.json`.
    pub db_path: PathBuf,

    /// Size of every page in bytes. Fixed when the database is created.
    pub page_size: usize,

    /// Number of frames in the buffer pool
    pub buffer_pool_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./bigt.db"),
            page_size: PAGE_SIZE,
            buffer_pool_frames: BUFFER_POOL_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the values can back a working buffer pool
    pub fn validate(&self) -> FileResult<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(FileError::InvalidConfig(format!(
                "page size {} outside {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if self.buffer_pool_frames == 0 {
            return Err(FileError::InvalidConfig(
                "buffer pool needs at least one frame".to_string(),
            ));
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
    /// Set the database file path
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the number of buffer pool frames
    pub fn buffer_pool_frames(mut self, frames: usize) -> Self {
        self.config.buffer_pool_frames = frames;
        self
    }

    /// Build the config
    pub fn build(self) -> Config {
        self.config
    }
}
