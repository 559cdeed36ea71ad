// rust/diskdata-core/src/provider.rs

//! Disk-backed dataset providers.
//!
//! A [`DiskDataProvider`] describes a dataset as a list of sample files, an
//! optional label per file and the shape of one input. It can be iterated
//! directly from disk, or it can start a background reader that fills a
//! buffer the training loop draws batches from.
//!
//! # Example
//!
//! ```no_run
//! use diskdata_core::{ChannelDiskDataProvider, ProviderBuilder};
//!
//! # fn main() -> diskdata_core::Result<()> {
//! let files: Vec<_> = (1..=100).map(|i| format!("/data/{i}.bin").into()).collect();
//! let labels: Vec<u32> = (0..100).map(|i| i % 5).collect();
//!
//! let dataset: ChannelDiskDataProvider<u32> = ProviderBuilder::new(vec![500], 2, 10)
//!     .files(files)
//!     .labels(labels)
//!     .build()?;
//!
//! let (train, _validation) = dataset.stratifiedobs(0.75)?;
//!
//! train.start_reading()?;
//! train.wait()?;
//! for batch in train.batchview()? {
//!     let batch = batch?;
//!     // batch.inputs has shape batch.shape = [2, 500]
//! }
//! train.stop();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::buffer::{ChannelBuffer, QueueBuffer, ReadBuffer, ReaderSettings};
use crate::config::{ProviderConfig, ReaderConfig};
use crate::error::{ProviderError, Result};
use crate::iter::{BatchView, BufferedIterator, UnbufferedIterator};
use crate::manifest::Manifest;
use crate::sample::{Batch, Datapoint, RawF32Decoder, SampleDecoder, Transform};
use crate::source::{Label, SampleSource};
use crate::split::stratified_indices;
use crate::storage::{LocalStorage, StorageBackend};

/// Provider whose reader fills a bounded FIFO; see [`ChannelBuffer`].
pub type ChannelDiskDataProvider<L> = DiskDataProvider<L, ChannelBuffer<L>>;

/// Provider whose reader refreshes a reusable ring; see [`QueueBuffer`].
pub type QueueDiskDataProvider<L> = DiskDataProvider<L, QueueBuffer<L>>;

/// Builds a [`DiskDataProvider`]. The buffer strategy is picked by the type
/// `build` is asked to produce.
pub struct ProviderBuilder<L> {
    xsize: Vec<usize>,
    batch_size: usize,
    queue_length: usize,
    files: Vec<PathBuf>,
    labels: Option<Vec<L>>,
    storage: Option<Arc<dyn StorageBackend>>,
    decoder: Arc<dyn SampleDecoder>,
    transform: Option<Transform<L>>,
    seed: Option<u64>,
    reader: ReaderConfig,
}

impl<L: Label> ProviderBuilder<L> {
    /// Starts a builder for inputs of shape `xsize`.
    ///
    /// # Arguments
    ///
    /// * `xsize` - Shape of one input, e.g. `[nrows, ncols, nchannels]`
    /// * `batch_size` - Datapoints per batch
    /// * `queue_length` - Buffer capacity; an integer multiple of the batch
    ///   size works best
    pub fn new(xsize: Vec<usize>, batch_size: usize, queue_length: usize) -> Self {
        Self {
            xsize,
            batch_size,
            queue_length,
            files: Vec::new(),
            labels: None,
            storage: None,
            decoder: Arc::new(RawF32Decoder),
            transform: None,
            seed: None,
            reader: ReaderConfig::default(),
        }
    }

    /// Starts a builder from configuration, with local storage rooted at
    /// `storage.base_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the storage
    /// backend cannot be created.
    pub fn from_config(config: &ProviderConfig, xsize: Vec<usize>) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage)?);

        let mut builder = Self::new(xsize, config.provider.batch_size, config.provider.queue_length)
            .storage(storage);
        builder.seed = config.provider.seed;
        builder.reader = config.reader.clone();
        Ok(builder)
    }

    pub fn files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    /// Makes the dataset supervised: datapoints carry `labels[i]`.
    pub fn labels(mut self, labels: Vec<L>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn SampleDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Applies `transform` to every datapoint before it is buffered or
    /// batched.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Datapoint<L>) -> Datapoint<L> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn reader_config(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    /// Validates the settings and builds an idle provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty file list, a label vector of
    /// the wrong length, a zero batch size or queue length, or an empty or
    /// degenerate `xsize`.
    pub fn build<B: ReadBuffer<L>>(self) -> Result<DiskDataProvider<L, B>> {
        if self.files.is_empty() {
            return Err(ProviderError::invalid_argument("at least one file is required"));
        }
        if let Some(labels) = &self.labels {
            if labels.len() != self.files.len() {
                return Err(ProviderError::invalid_argument(format!(
                    "{} labels supplied for {} files",
                    labels.len(),
                    self.files.len()
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(ProviderError::invalid_argument("batch_size must be greater than 0"));
        }
        if self.queue_length == 0 {
            return Err(ProviderError::invalid_argument("queue_length must be greater than 0"));
        }
        if self.xsize.is_empty() || self.xsize.contains(&0) {
            return Err(ProviderError::invalid_argument(format!(
                "xsize {:?} must be non-empty with positive dimensions",
                self.xsize
            )));
        }
        if self.queue_length < self.batch_size {
            debug!(
                queue_length = self.queue_length,
                batch_size = self.batch_size,
                "queue shorter than one batch; the consumer will wait on every batch"
            );
        }

        debug!(
            files = self.files.len(),
            labelled = self.labels.is_some(),
            decoder = self.decoder.name(),
            xsize = ?self.xsize,
            "building provider"
        );

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(LocalStorage::new(&Default::default())?),
        };

        let source = SampleSource::new(
            storage,
            self.files,
            self.labels,
            self.xsize,
            self.decoder,
            self.transform,
        );

        Ok(DiskDataProvider::from_source(
            Arc::new(source),
            self.batch_size,
            self.queue_length,
            self.seed,
            self.reader,
        ))
    }
}

/// An iterable dataset backed by files on disk and an optional background
/// read buffer of kind `B`.
pub struct DiskDataProvider<L: Label, B: ReadBuffer<L>> {
    source: Arc<SampleSource<L>>,
    ulabels: Vec<L>,
    batch_size: usize,
    queue_length: usize,
    seed: Option<u64>,
    reader_config: ReaderConfig,
    rng: Mutex<StdRng>,
    reader: Mutex<Option<Arc<B>>>,
}

impl<B: ReadBuffer<String>> DiskDataProvider<String, B> {
    /// Builds a provider from a manifest, with settings and storage taken
    /// from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest or configuration is invalid.
    pub fn from_manifest(manifest: &Manifest, config: &ProviderConfig) -> Result<Self> {
        manifest.validate()?;

        let mut builder = ProviderBuilder::from_config(config, manifest.xsize.clone())?
            .files(manifest.files());
        if let Some(labels) = manifest.labels()? {
            builder = builder.labels(labels);
        }
        builder.build()
    }
}

impl<L: Label, B: ReadBuffer<L>> DiskDataProvider<L, B> {
    fn from_source(
        source: Arc<SampleSource<L>>,
        batch_size: usize,
        queue_length: usize,
        seed: Option<u64>,
        reader_config: ReaderConfig,
    ) -> Self {
        let mut ulabels: Vec<L> = source.labels().map(<[L]>::to_vec).unwrap_or_default();
        ulabels.sort();
        ulabels.dedup();

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            source,
            ulabels,
            batch_size,
            queue_length,
            seed,
            reader_config,
            rng: Mutex::new(rng),
            reader: Mutex::new(None),
        }
    }

    /// A new, idle provider over the observations at `indices`, with the
    /// same settings, storage, decoder and transform.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for an invalid index and `InvalidArgument`
    /// for an empty selection.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            return Err(ProviderError::invalid_argument("a subset needs at least one index"));
        }
        let source = self.source.subset(indices)?;
        Ok(Self::from_source(
            Arc::new(source),
            self.batch_size,
            self.queue_length,
            self.seed,
            self.reader_config.clone(),
        ))
    }

    /// Number of observations.
    pub fn nobs(&self) -> usize {
        self.source.len()
    }

    pub fn len(&self) -> usize {
        self.nobs()
    }

    pub fn is_empty(&self) -> bool {
        self.nobs() == 0
    }

    /// The labels of the dataset, in file order.
    pub fn labels(&self) -> Option<&[L]> {
        self.source.labels()
    }

    /// Distinct labels, sorted.
    pub fn ulabels(&self) -> &[L] {
        &self.ulabels
    }

    pub fn files(&self) -> &[PathBuf] {
        self.source.files()
    }

    pub fn xsize(&self) -> &[usize] {
        self.source.xsize()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn queue_length(&self) -> usize {
        self.queue_length
    }

    /// Name of the buffer strategy.
    pub fn buffer_kind(&self) -> &'static str {
        B::KIND
    }

    /// Reads observation `index` straight from disk.
    pub fn get(&self, index: usize) -> Result<Datapoint<L>> {
        self.source.read(index)
    }

    /// Reads the first observation straight from disk.
    pub fn first(&self) -> Result<Datapoint<L>> {
        self.get(0)
    }

    /// A uniformly random label from the label vector, so labels are drawn
    /// with their dataset frequency.
    ///
    /// # Errors
    ///
    /// Returns `Unlabeled` for an unsupervised dataset.
    pub fn sample_label(&self) -> Result<L> {
        let labels = self.labels().ok_or(ProviderError::Unlabeled)?;
        let mut rng = self.rng.lock();
        labels
            .choose(&mut *rng)
            .cloned()
            .ok_or(ProviderError::Unlabeled)
    }

    /// A random datapoint, read from disk.
    pub fn sample_input(&self) -> Result<Datapoint<L>> {
        let index = self.rng.lock().gen_range(0..self.nobs());
        self.get(index)
    }

    /// A random datapoint with label `label`, read from disk.
    ///
    /// # Errors
    ///
    /// Returns `Unlabeled` for an unsupervised dataset and `LabelNotFound`
    /// if no observation carries `label`.
    pub fn sample_input_with_label(&self, label: &L) -> Result<Datapoint<L>> {
        let labels = self.labels().ok_or(ProviderError::Unlabeled)?;
        let candidates: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| (l == label).then_some(i))
            .collect();

        let index = *candidates
            .choose(&mut *self.rng.lock())
            .ok_or_else(|| ProviderError::label_not_found(label))?;
        self.get(index)
    }

    /// One batch holding the whole dataset in file order. Reads every file
    /// on the calling thread.
    pub fn full_batch(&self) -> Result<Batch<L>> {
        let datapoints = self.iter().collect::<Result<Vec<_>>>()?;
        Batch::stack(datapoints, self.xsize())
    }

    /// Partitions the dataset into `fractions.len() + 1` disjoint providers
    /// while preserving the label distribution in each.
    ///
    /// # Errors
    ///
    /// Returns `Unlabeled` for an unsupervised dataset, `InvalidFraction`
    /// for bad fractions, and `InvalidArgument` if a piece ends up empty.
    pub fn stratified_split(&self, fractions: &[f64]) -> Result<Vec<Self>> {
        let labels = self.labels().ok_or(ProviderError::Unlabeled)?;
        let pieces = {
            let mut rng = self.rng.lock();
            stratified_indices(labels, fractions, &mut *rng)?
        };

        debug!(
            sizes = ?pieces.iter().map(Vec::len).collect::<Vec<_>>(),
            "stratified split"
        );
        pieces.iter().map(|indices| self.subset(indices)).collect()
    }

    /// Two-way stratified split: about `p` of each class goes to the first
    /// provider, the rest to the second.
    pub fn stratifiedobs(&self, p: f64) -> Result<(Self, Self)> {
        let mut pieces = self.stratified_split(&[p])?.into_iter();
        match (pieces.next(), pieces.next()) {
            (Some(train), Some(test)) => Ok((train, test)),
            _ => Err(ProviderError::invalid_fraction("expected two subsets")),
        }
    }

    /// Starts the background reader that fills the buffer.
    ///
    /// Reading continues until [`stop`](Self::stop) is called or the
    /// provider is dropped. Buffered iterators call this on first use.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyReading` if a reader is running.
    pub fn start_reading(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        if reader.as_ref().is_some_and(|b| b.is_running()) {
            return Err(ProviderError::AlreadyReading);
        }

        *reader = Some(Arc::new(self.spawn_buffer()?));
        Ok(())
    }

    fn spawn_buffer(&self) -> Result<B> {
        let settings = ReaderSettings {
            queue_length: self.queue_length,
            poll_interval: self.reader_config.poll_interval(),
            seed: self.seed.map(|seed| seed.wrapping_add(1)),
        };
        info!(
            kind = B::KIND,
            nobs = self.nobs(),
            queue_length = self.queue_length,
            "starting background reader"
        );
        B::start(self.source.clone(), settings)
    }

    /// The current buffer, starting one if none was started or the last one
    /// was stopped. A buffer whose reader ended on its own is returned as is,
    /// so its failure or `NotReading` reaches the consumer.
    pub(crate) fn ensure_reading(&self) -> Result<Arc<B>> {
        let mut reader = self.reader.lock();
        if let Some(buffer) = reader.as_ref() {
            return Ok(buffer.clone());
        }

        let buffer = Arc::new(self.spawn_buffer()?);
        *reader = Some(buffer.clone());
        Ok(buffer)
    }

    /// Blocks until the buffer is primed or the reader has stopped, up to
    /// `reader.wait_timeout_ms`. A reader that stopped on a failure reports
    /// it on the next take.
    ///
    /// # Errors
    ///
    /// Returns `NotReading` if no reader was started and `ReaderFailed` if
    /// the buffer is not primed in time.
    pub fn wait(&self) -> Result<()> {
        let timeout = self.reader_config.wait_timeout();
        let buffer = self.reader.lock().clone().ok_or(ProviderError::NotReading)?;

        if buffer.wait_ready(timeout) || !buffer.is_running() {
            Ok(())
        } else {
            Err(ProviderError::reader_failed(format!(
                "buffer not primed within {timeout:?}"
            )))
        }
    }

    /// Blocks until the buffer is primed or `timeout` elapses. Returns
    /// whether it is primed.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let buffer = self.reader.lock().clone().ok_or(ProviderError::NotReading)?;
        Ok(buffer.wait_ready(timeout))
    }

    /// Stops the background reader and joins its thread. Does nothing if
    /// no reader is running.
    pub fn stop(&self) {
        let buffer = self.reader.lock().take();
        if let Some(buffer) = buffer {
            buffer.stop();
            debug!(kind = B::KIND, "background reader stopped");
        }
    }

    pub fn is_reading(&self) -> bool {
        self.reader.lock().as_ref().is_some_and(|b| b.is_running())
    }

    /// Datapoints currently held by the buffer.
    pub fn buffered_len(&self) -> usize {
        self.reader.lock().as_ref().map_or(0, |b| b.buffered_len())
    }

    /// Iterates every observation in file order, straight from disk.
    pub fn iter(&self) -> UnbufferedIterator<'_, L> {
        UnbufferedIterator::new(&self.source)
    }

    /// Iterates `nobs` datapoints from the buffer.
    pub fn buffered(&self) -> Result<BufferedIterator<L, B>> {
        Ok(BufferedIterator::new(self.ensure_reading()?, self.nobs()))
    }

    /// Iterates `nobs / batch_size` batches from the buffer.
    pub fn batchview(&self) -> Result<BatchView<L, B>> {
        self.batchview_with_size(self.batch_size)
    }

    /// Iterates `nobs / size` batches of `size` datapoints from the buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `size` is zero.
    pub fn batchview_with_size(&self, size: usize) -> Result<BatchView<L, B>> {
        if size == 0 {
            return Err(ProviderError::invalid_argument("batch size must be greater than 0"));
        }
        let buffer = self.ensure_reading()?;
        Ok(BatchView::new(buffer, size, self.nobs() / size, self.xsize().to_vec()))
    }
}

impl<L: Label, B: ReadBuffer<L>> fmt::Debug for DiskDataProvider<L, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskDataProvider")
            .field("buffer", &B::KIND)
            .field("nobs", &self.nobs())
            .field("xsize", &self.xsize())
            .field("batch_size", &self.batch_size)
            .field("queue_length", &self.queue_length)
            .field("reading", &self.is_reading())
            .finish()
    }
}

impl<'a, L: Label, B: ReadBuffer<L>> IntoIterator for &'a DiskDataProvider<L, B> {
    type Item = Result<Datapoint<L>>;
    type IntoIter = UnbufferedIterator<'a, L>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<L: Label, B: ReadBuffer<L>> Drop for DiskDataProvider<L, B> {
    fn drop(&mut self) {
        self.stop();
    }
}
