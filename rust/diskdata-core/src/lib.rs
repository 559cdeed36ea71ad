// rust/diskdata-core/src/lib.rs

//! Disk Data Providers - Core Library
//!
//! Datasets too large for memory are described as a list of sample files
//! with optional labels. A provider reads them from storage in a background
//! thread into a bounded buffer and hands out fixed-size batches, so the
//! training loop does not wait on disk.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{BufferKind, ProviderConfig};
pub use error::{ProviderError, Result};
pub use storage::{FileMeta, LocalStorage, SampleBytes, StorageBackend};

pub mod sample;
pub use sample::{Batch, Datapoint, FnDecoder, RawF32Decoder, SampleDecoder, Transform};

pub mod source;
pub use source::{Label, SampleSource};

pub mod split;

pub mod buffer;
pub use buffer::{ChannelBuffer, QueueBuffer, ReadBuffer};

pub mod iter;
pub use iter::{BatchView, BufferedIterator, UnbufferedIterator};

pub mod manifest;
pub use manifest::{Manifest, ManifestEntry};

pub mod provider;
pub use provider::{
    ChannelDiskDataProvider, DiskDataProvider, ProviderBuilder, QueueDiskDataProvider,
};
