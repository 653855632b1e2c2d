//! Configuration structures for Cellar.

use crate::error::{CellarError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::System;

/// Configuration for the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool. Fixed for the lifetime of the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl BufferPoolConfig {
    /// Creates a config for a pool of the given number of frames.
    pub fn with_frames(num_frames: usize) -> Self {
        Self { num_frames }
    }

    /// Sizes the pool to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames so low-memory systems still get useful caching.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self { num_frames }
    }

    /// Returns the memory held by the page buffers in bytes.
    pub fn pool_size_bytes(&self) -> usize {
        self.num_frames * PAGE_SIZE
    }

    /// Checks that the pool can hold at least one page.
    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 {
            return Err(CellarError::ConfigError(
                "buffer.num_frames must be at least 1".to_string(),
            ));
        }
        if self.num_frames >= u32::MAX as usize {
            return Err(CellarError::ConfigError(format!(
                "buffer.num_frames {} exceeds the frame id range",
                self.num_frames
            )));
        }
        Ok(())
    }
}

/// Storage configuration for on-disk page files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Resolves a file name against the data directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellarConfig {
    pub buffer: BufferPoolConfig,
    pub storage: StorageConfig,
}

impl CellarConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CellarConfig = serde_json::from_str(json)
            .map_err(|e| CellarError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.buffer.validate()
    }
}
