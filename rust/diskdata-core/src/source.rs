// rust/diskdata-core/src/source.rs

//! The read path shared by every iterator and background reader.

use std::fmt::Debug;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ProviderError, Result};
use crate::sample::{element_count, Datapoint, SampleDecoder, Transform};
use crate::storage::StorageBackend;

/// Bounds a label type must satisfy. Implemented for every type that meets
/// them, e.g. integers, `String`, or small enums.
pub trait Label: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> Label for T where T: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

/// Files, labels and the decoding pipeline of one provider.
///
/// A source is immutable once built and is shared between the consumer and
/// the background reader through an `Arc`.
pub struct SampleSource<L> {
    storage: Arc<dyn StorageBackend>,
    files: Vec<PathBuf>,
    labels: Option<Vec<L>>,
    xsize: Vec<usize>,
    decoder: Arc<dyn SampleDecoder>,
    transform: Option<Transform<L>>,
}

impl<L: Label> SampleSource<L> {
    pub(crate) fn new(
        storage: Arc<dyn StorageBackend>,
        files: Vec<PathBuf>,
        labels: Option<Vec<L>>,
        xsize: Vec<usize>,
        decoder: Arc<dyn SampleDecoder>,
        transform: Option<Transform<L>>,
    ) -> Self {
        Self {
            storage,
            files,
            labels,
            xsize,
            decoder,
            transform,
        }
    }

    /// A source over `indices` of this one, sharing storage, decoder and
    /// transform.
    pub(crate) fn subset(&self, indices: &[usize]) -> Result<Self> {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(ProviderError::index_out_of_range(bad, len));
        }

        Ok(Self {
            storage: self.storage.clone(),
            files: indices.iter().map(|&i| self.files[i].clone()).collect(),
            labels: self
                .labels
                .as_ref()
                .map(|labels| indices.iter().map(|&i| labels[i].clone()).collect()),
            xsize: self.xsize.clone(),
            decoder: self.decoder.clone(),
            transform: self.transform.clone(),
        })
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn labels(&self) -> Option<&[L]> {
        self.labels.as_deref()
    }

    pub fn xsize(&self) -> &[usize] {
        &self.xsize
    }

    /// Reads, decodes and transforms observation `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range, the file cannot be
    /// read or decoded, or the transformed input has the wrong length.
    pub fn read(&self, index: usize) -> Result<Datapoint<L>> {
        let path = self
            .files
            .get(index)
            .ok_or_else(|| ProviderError::index_out_of_range(index, self.len()))?;

        let bytes = self.storage.read_all(path)?;
        let input = self.decoder.decode(path, &bytes, &self.xsize)?;
        let label = self.labels.as_ref().map(|labels| labels[index].clone());

        let mut datapoint = Datapoint::new(input, label);
        if let Some(transform) = &self.transform {
            datapoint = transform(datapoint);
        }

        let expected = element_count(&self.xsize);
        if datapoint.input.len() != expected {
            return Err(ProviderError::shape_mismatch(expected, datapoint.input.len()));
        }

        Ok(datapoint)
    }
}
