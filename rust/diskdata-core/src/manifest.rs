// rust/diskdata-core/src/manifest.rs

//! JSON description of a dataset on disk.
//!
//! ```json
//! {
//!   "xsize": [28, 28, 1],
//!   "samples": [
//!     { "file": "cats/1.bin", "label": "cat" },
//!     { "file": "dogs/1.bin", "label": "dog" }
//!   ]
//! }
//! ```
//!
//! Relative file paths are resolved by the storage backend against its base
//! path. Labels are optional but must be given for every sample or for none.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::storage::StorageBackend;

/// One sample file and its optional label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Shape of one input.
    pub xsize: Vec<usize>,
    pub samples: Vec<ManifestEntry>,
}

impl FromStr for Manifest {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| ProviderError::manifest_with_source("failed to parse manifest", e))
    }
}

impl Manifest {
    /// Builds a manifest from parallel file and label lists.
    ///
    /// # Errors
    ///
    /// Returns an error if `labels` is given with a different length.
    pub fn from_parts<L: Display>(
        xsize: Vec<usize>,
        files: Vec<PathBuf>,
        labels: Option<&[L]>,
    ) -> Result<Self> {
        if let Some(labels) = labels {
            if labels.len() != files.len() {
                return Err(ProviderError::manifest(format!(
                    "{} labels for {} files",
                    labels.len(),
                    files.len()
                )));
            }
        }

        let samples = files
            .into_iter()
            .enumerate()
            .map(|(i, file)| ManifestEntry {
                file,
                label: labels.map(|labels| labels[i].to_string()),
            })
            .collect();

        Ok(Self { xsize, samples })
    }

    /// An unlabeled manifest over the files in `dir` ending in `.{ext}`,
    /// sorted by name. Paths are relative to the storage base path.
    pub fn from_dir(
        storage: &dyn StorageBackend,
        dir: &Path,
        ext: &str,
        xsize: Vec<usize>,
    ) -> Result<Self> {
        let suffix = format!(".{}", ext.trim_start_matches('.'));
        let samples: Vec<ManifestEntry> = storage
            .list(dir)?
            .into_iter()
            .filter(|name| name.ends_with(&suffix))
            .map(|name| ManifestEntry {
                file: dir.join(name),
                label: None,
            })
            .collect();

        debug!(dir = %dir.display(), files = samples.len(), "built manifest from directory");
        Ok(Self { xsize, samples })
    }

    /// Loads and validates a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::storage_with_source(path, "failed to read manifest", e)
        })?;
        let manifest: Self = content.parse()?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProviderError::manifest_with_source("failed to serialize manifest", e))?;
        std::fs::write(path, content)
            .map_err(|e| ProviderError::storage_with_source(path, "failed to write manifest", e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.xsize.is_empty() || self.xsize.contains(&0) {
            return Err(ProviderError::manifest(format!(
                "xsize {:?} must be non-empty with positive dimensions",
                self.xsize
            )));
        }
        if self.samples.is_empty() {
            return Err(ProviderError::manifest("manifest lists no samples"));
        }
        self.labels().map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.samples.iter().map(|s| s.file.clone()).collect()
    }

    /// All labels, or `None` for an unlabeled manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if only some samples are labelled.
    pub fn labels(&self) -> Result<Option<Vec<String>>> {
        let labelled = self.samples.iter().filter(|s| s.label.is_some()).count();
        if labelled == 0 {
            return Ok(None);
        }
        if labelled != self.samples.len() {
            return Err(ProviderError::manifest(format!(
                "{labelled} of {} samples are labelled; label all or none",
                self.samples.len()
            )));
        }

        Ok(Some(
            self.samples
                .iter()
                .filter_map(|s| s.label.clone())
                .collect(),
        ))
    }
}
