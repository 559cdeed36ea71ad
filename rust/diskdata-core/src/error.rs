// rust/diskdata-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to decode sample '{path}': {message}")]
    Decode {
        path: PathBuf,
        message: String,
    },

    #[error("Input has {actual} elements, expected {expected}")]
    ShapeMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("Invalid split fractions: {message}")]
    InvalidFraction {
        message: String,
    },

    #[error("Dataset has no labels")]
    Unlabeled,

    #[error("No observation has label {label}")]
    LabelNotFound {
        label: String,
    },

    #[error("Index {index} out of range (observations: {len})")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    #[error("Reader is already running")]
    AlreadyReading,

    #[error("Reader is not running and the buffer is empty")]
    NotReading,

    #[error("Background reader failed: {message}")]
    ReaderFailed {
        message: String,
    },

    #[error("Manifest error: {message}")]
    Manifest {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

// Convenience constructors
impl ProviderError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn shape_mismatch(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch { expected, actual }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_fraction(message: impl Into<String>) -> Self {
        Self::InvalidFraction {
            message: message.into(),
        }
    }

    pub fn label_not_found(label: impl std::fmt::Debug) -> Self {
        Self::LabelNotFound {
            label: format!("{label:?}"),
        }
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn reader_failed(message: impl Into<String>) -> Self {
        Self::ReaderFailed {
            message: message.into(),
        }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            source: None,
        }
    }

    pub fn manifest_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Manifest {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Rebuilds an error so it can be handed across the reader thread
    /// boundary more than once; `std::io::Error` sources are not `Clone`.
    pub(crate) fn detached(&self) -> Self {
        Self::reader_failed(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ProviderError::shape_mismatch(12, 10);
        assert_eq!(err.to_string(), "Input has 10 elements, expected 12");

        let err = ProviderError::index_out_of_range(7, 5);
        assert!(err.to_string().contains("Index 7"));

        let err = ProviderError::label_not_found("cat");
        assert_eq!(err.to_string(), "No observation has label \"cat\"");
    }

    #[test]
    fn test_storage_source_is_kept() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ProviderError::storage_with_source("/tmp/x.bin", "failed to open file", io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/tmp/x.bin"));
    }

    #[test]
    fn test_detached_keeps_message() {
        let err = ProviderError::decode("a.bin", "truncated");
        let detached = err.detached();
        assert!(matches!(detached, ProviderError::ReaderFailed { .. }));
        assert!(detached.to_string().contains("truncated"));
    }
}
