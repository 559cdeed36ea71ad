// rust/diskdata-core/src/storage/mod.rs

//! Storage for sample files.
//!
//! # Example
//!
//! ```no_run
//! use diskdata_core::config::StorageConfig;
//! use diskdata_core::storage::{LocalStorage, StorageBackend};
//! use std::path::Path;
//!
//! # fn main() -> diskdata_core::Result<()> {
//! let storage = LocalStorage::new(&StorageConfig::default())?;
//!
//! storage.write_all(Path::new("0.bin"), &[0u8; 16])?;
//! let bytes = storage.read_all(Path::new("0.bin"))?;
//! assert_eq!(bytes.len(), 16);
//! # Ok(())
//! # }
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{FileMeta, SampleBytes, StorageBackend};
