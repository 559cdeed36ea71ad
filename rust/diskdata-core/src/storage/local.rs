// rust/diskdata-core/src/storage/local.rs

//! Local filesystem backend.
//!
//! Files below `mmap_threshold` are read through a `BufReader` sized by
//! `buffer_size`; larger ones are memory-mapped and decoded in place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::trace;

use super::traits::{FileMeta, SampleBytes, StorageBackend};
use crate::config::StorageConfig;
use crate::error::{ProviderError, Result};

pub struct LocalStorage {
    base_path: PathBuf,
    buffer_size: usize,
    /// Files of at least this many bytes are mapped; `None` disables mmap.
    mmap_threshold: Option<u64>,
}

impl LocalStorage {
    /// Creates the backend, creating `base_path` if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be created.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();
        fs::create_dir_all(&base_path).map_err(|e| {
            ProviderError::storage_with_source(&base_path, "failed to create base directory", e)
        })?;

        Ok(Self {
            base_path,
            buffer_size: config.buffer_size,
            mmap_threshold: config.use_mmap.then_some(config.mmap_threshold),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn should_map(&self, size: u64) -> bool {
        // Empty files cannot be mapped on every platform.
        size > 0 && self.mmap_threshold.is_some_and(|threshold| size >= threshold)
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).is_file())
    }

    fn metadata(&self, path: &Path) -> Result<FileMeta> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to read metadata", e))?;

        Ok(FileMeta {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    fn read_all(&self, path: &Path) -> Result<SampleBytes> {
        let full = self.resolve(path);
        let file = File::open(&full)
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to open file", e))?;
        let size = file
            .metadata()
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to read metadata", e))?
            .len();

        if self.should_map(size) {
            trace!(path = %full.display(), size, "mapping sample");
            // SAFETY: the map is read-only and owns its file handle. Sample
            // files are not expected to change while a provider reads them.
            let mmap = unsafe { Mmap::map(&file) }
                .map_err(|e| ProviderError::storage_with_source(&full, "failed to map file", e))?;
            return Ok(SampleBytes::Mapped(mmap));
        }

        let capacity = usize::try_from(size)
            .map_err(|_| ProviderError::storage(&full, format!("file of {size} bytes is too large")))?;
        let mut bytes = Vec::with_capacity(capacity);
        BufReader::with_capacity(self.buffer_size, file)
            .read_to_end(&mut bytes)
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to read file", e))?;

        Ok(SampleBytes::Owned(bytes))
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::storage_with_source(parent, "failed to create parent directories", e)
            })?;
        }

        let file = File::create(&full)
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to create file", e))?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        writer
            .write_all(data)
            .and_then(|()| writer.flush())
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to write file", e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to sync file", e))
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let full = self.resolve(dir);
        if !full.exists() {
            return Ok(Vec::new());
        }
        if !full.is_dir() {
            return Err(ProviderError::storage(&full, "path is not a directory"));
        }

        let entries = fs::read_dir(&full)
            .map_err(|e| ProviderError::storage_with_source(&full, "failed to read directory", e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| ProviderError::storage_with_source(&full, "failed to read directory", e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
