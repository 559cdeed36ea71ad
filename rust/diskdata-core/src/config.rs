// rust/diskdata-core/src/config.rs

//! Configuration management for disk data providers.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ProviderError, Result};

// Top-level provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub storage: StorageConfig,
    pub provider: BufferConfig,
    pub reader: ReaderConfig,
}

/// Which buffer strategy a provider reads into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// Bounded FIFO; every buffered datapoint is consumed once.
    #[default]
    Channel,
    /// Reusable ring; the consumer never waits once it is primed.
    Queue,
}

impl FromStr for BufferKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "channel" => Ok(Self::Channel),
            "queue" => Ok(Self::Queue),
            other => Err(ProviderError::config(format!(
                "unknown buffer kind '{other}', expected 'channel' or 'queue'"
            ))),
        }
    }
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative sample paths resolve against.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to use memory-mapped I/O.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Batching and buffering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of datapoints per batch.
    pub batch_size: usize,
    /// Capacity of the read buffer. An integer multiple of `batch_size`
    /// works best.
    pub queue_length: usize,
    /// Buffer strategy.
    pub buffer: BufferKind,
    /// Seed for reader shuffling, sampling and splitting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Background reader tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// How often a blocked reader or consumer re-checks the stop flag.
    pub poll_interval_ms: u64,
    /// Upper bound for `wait` before giving up.
    pub wait_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            queue_length: 128,
            buffer: BufferKind::Channel,
            seed: None,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            wait_timeout_ms: 60_000,
        }
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl FromStr for ProviderConfig {
    type Err = ProviderError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ProviderError::config_with_source("failed to parse TOML config", e))
    }
}

impl ProviderConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `DDP_` and use underscores
    // to separate nested fields. For example:
    // - `DDP_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `DDP_PROVIDER_BATCH_SIZE` overrides `provider.batch_size`
    // - `DDP_PROVIDER_BUFFER` overrides `provider.buffer` ("channel" or "queue")
    // - `DDP_READER_POLL_INTERVAL_MS` overrides `reader.poll_interval_ms`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("DDP_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DDP_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        // Provider overrides
        if let Ok(val) = std::env::var("DDP_PROVIDER_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.provider.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_PROVIDER_QUEUE_LENGTH") {
            if let Ok(v) = val.parse() {
                self.provider.queue_length = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_PROVIDER_BUFFER") {
            if let Ok(v) = val.parse() {
                self.provider.buffer = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_PROVIDER_SEED") {
            if let Ok(v) = val.parse() {
                self.provider.seed = Some(v);
            }
        }

        // Reader overrides
        if let Ok(val) = std::env::var("DDP_READER_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.reader.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("DDP_READER_WAIT_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.reader.wait_timeout_ms = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(ProviderError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.provider.batch_size == 0 {
            return Err(ProviderError::config(
                "provider.batch_size must be greater than 0",
            ));
        }
        if self.provider.queue_length == 0 {
            return Err(ProviderError::config(
                "provider.queue_length must be greater than 0",
            ));
        }

        if self.reader.poll_interval_ms == 0 {
            return Err(ProviderError::config(
                "reader.poll_interval_ms must be greater than 0",
            ));
        }
        if self.reader.wait_timeout_ms < self.reader.poll_interval_ms {
            return Err(ProviderError::config(
                "reader.wait_timeout_ms must be at least reader.poll_interval_ms",
            ));
        }

        Ok(())
    }
}
