// rust/diskdata-core/src/storage/traits.rs

//! Storage abstraction for sample files.
//!
//! Sample files are small, opaque and always read whole, so a backend hands
//! back the complete contents of a file in one call.

use std::ops::Deref;
use std::path::Path;
use std::time::SystemTime;

use memmap2::Mmap;

use crate::error::Result;

/// Metadata about a stored sample file.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Size in bytes.
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// The contents of one sample file, either read into memory or mapped.
pub enum SampleBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl SampleBytes {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl Deref for SampleBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => bytes.as_slice(),
            Self::Mapped(mmap) => &mmap[..],
        }
    }
}

impl AsRef<[u8]> for SampleBytes {
    fn as_ref(&self) -> &[u8] {
        &**self
    }
}

impl std::fmt::Debug for SampleBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBytes")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Where sample files live.
///
/// Shared between the consumer and the background reader as
/// `Arc<dyn StorageBackend>`, so implementations must be thread-safe.
pub trait StorageBackend: Send + Sync {
    fn exists(&self, path: &Path) -> Result<bool>;

    /// # Errors
    ///
    /// Returns an error if the file does not exist.
    fn metadata(&self, path: &Path) -> Result<FileMeta>;

    /// Reads a whole sample file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    fn read_all(&self, path: &Path) -> Result<SampleBytes>;

    /// Writes `data` as a whole file, creating parent directories and
    /// replacing any existing file.
    fn write_all(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Names of the entries directly under `dir`, sorted. A missing
    /// directory lists as empty.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;
}
