// rust/diskdata-core/src/iter.rs

//! Iterators over a provider.
//!
//! [`UnbufferedIterator`] reads every file in order on the calling thread.
//! [`BufferedIterator`] and [`BatchView`] draw from the provider's
//! background buffer and yield `nobs` datapoints or `nobs / size` batches
//! respectively. All of them stop after the first error.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::ReadBuffer;
use crate::error::Result;
use crate::sample::{Batch, Datapoint};
use crate::source::{Label, SampleSource};

/// Reads observations `0..nobs` straight from disk.
pub struct UnbufferedIterator<'a, L> {
    source: &'a SampleSource<L>,
    position: usize,
    failed: bool,
}

impl<'a, L: Label> UnbufferedIterator<'a, L> {
    pub(crate) fn new(source: &'a SampleSource<L>) -> Self {
        Self {
            source,
            position: 0,
            failed: false,
        }
    }
}

impl<L: Label> Iterator for UnbufferedIterator<'_, L> {
    type Item = Result<Datapoint<L>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.source.len() {
            return None;
        }

        let item = self.source.read(self.position);
        self.position += 1;
        self.failed = item.is_err();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.failed {
            0
        } else {
            self.source.len() - self.position
        };
        (remaining, Some(remaining))
    }
}

impl<L: Label> ExactSizeIterator for UnbufferedIterator<'_, L> {}

/// Takes a fixed number of datapoints from a running buffer.
pub struct BufferedIterator<L, B> {
    buffer: Arc<B>,
    remaining: usize,
    _label: PhantomData<fn() -> L>,
}

impl<L: Label, B: ReadBuffer<L>> BufferedIterator<L, B> {
    pub(crate) fn new(buffer: Arc<B>, count: usize) -> Self {
        Self {
            buffer,
            remaining: count,
            _label: PhantomData,
        }
    }
}

impl<L: Label, B: ReadBuffer<L>> Iterator for BufferedIterator<L, B> {
    type Item = Result<Datapoint<L>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let item = self.buffer.take();
        self.remaining = if item.is_ok() { self.remaining - 1 } else { 0 };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<L: Label, B: ReadBuffer<L>> ExactSizeIterator for BufferedIterator<L, B> {}

/// Takes `count` batches of `size` datapoints each from a running buffer.
///
/// A trailing partial batch is never produced: a dataset of 9 observations
/// viewed in batches of 2 yields 4 batches.
pub struct BatchView<L, B> {
    buffer: Arc<B>,
    size: usize,
    remaining: usize,
    xsize: Vec<usize>,
    _label: PhantomData<fn() -> L>,
}

impl<L: Label, B: ReadBuffer<L>> BatchView<L, B> {
    pub(crate) fn new(buffer: Arc<B>, size: usize, count: usize, xsize: Vec<usize>) -> Self {
        Self {
            buffer,
            size,
            remaining: count,
            xsize,
            _label: PhantomData,
        }
    }

    /// Datapoints per batch.
    pub fn batch_size(&self) -> usize {
        self.size
    }

    fn next_batch(&self) -> Result<Batch<L>> {
        let datapoints = (0..self.size)
            .map(|_| self.buffer.take())
            .collect::<Result<Vec<_>>>()?;
        Batch::stack(datapoints, &self.xsize)
    }
}

impl<L: Label, B: ReadBuffer<L>> Iterator for BatchView<L, B> {
    type Item = Result<Batch<L>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let batch = self.next_batch();
        self.remaining = if batch.is_ok() { self.remaining - 1 } else { 0 };
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<L: Label, B: ReadBuffer<L>> ExactSizeIterator for BatchView<L, B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ChannelBuffer, QueueBuffer, ReaderSettings};
    use crate::config::StorageConfig;
    use crate::error::ProviderError;
    use crate::sample::RawF32Decoder;
    use crate::storage::{LocalStorage, StorageBackend};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn source(n: usize, missing: Option<usize>) -> (Arc<SampleSource<u8>>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let files: Vec<PathBuf> = (0..n).map(|i| PathBuf::from(format!("s{i}.bin"))).collect();
        for (i, file) in files.iter().enumerate() {
            if Some(i) != missing {
                storage
                    .write_all(file, &RawF32Decoder::encode(&[i as f32, 0.0]))
                    .unwrap();
            }
        }

        let source = SampleSource::new(
            Arc::new(storage),
            files,
            Some((0..n as u8).map(|i| i % 2).collect()),
            vec![2, 1],
            Arc::new(RawF32Decoder),
            None,
        );
        (Arc::new(source), temp)
    }

    fn settings(queue_length: usize) -> ReaderSettings {
        ReaderSettings {
            queue_length,
            poll_interval: Duration::from_millis(5),
            seed: Some(9),
        }
    }

    #[test]
    fn test_unbuffered_reads_in_order() {
        let (source, _temp) = source(4, None);
        let iter = UnbufferedIterator::new(&source);
        assert_eq!(iter.len(), 4);

        let firsts: Vec<f32> = iter.map(|dp| dp.unwrap().input[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unbuffered_stops_after_error() {
        let (source, _temp) = source(4, Some(1));
        let items: Vec<_> = UnbufferedIterator::new(&source).collect();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ProviderError::Storage { .. })));
    }

    #[test]
    fn test_buffered_yields_count() {
        let (source, _temp) = source(5, None);
        let buffer = Arc::new(ChannelBuffer::start(source, settings(2)).unwrap());

        let iter = BufferedIterator::new(buffer, 5);
        assert_eq!(iter.len(), 5);

        let items: Vec<_> = iter.collect();
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(Result::is_ok));
    }

    #[test]
    fn test_batch_view_stacks_row_major() {
        let (source, _temp) = source(6, None);
        let buffer = Arc::new(QueueBuffer::start(source, settings(4)).unwrap());

        let view = BatchView::new(buffer, 3, 2, vec![2, 1]);
        assert_eq!(view.len(), 2);
        assert_eq!(view.batch_size(), 3);

        for batch in view {
            let batch = batch.unwrap();
            assert_eq!(batch.shape, vec![3, 2, 1]);
            assert_eq!(batch.inputs.len(), 6);
            for i in 0..3 {
                let sample = batch.sample(i).unwrap();
                assert_eq!(sample[1], 0.0);
                assert_eq!(batch.label(i), Some(&(sample[0] as u8 % 2)));
            }
        }
    }

    #[test]
    fn test_batch_view_stops_after_error() {
        let (source, _temp) = source(3, Some(0));
        let buffer = Arc::new(ChannelBuffer::start(source, settings(3)).unwrap());

        let items: Vec<_> = BatchView::new(buffer, 3, 5, vec![2, 1]).collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
