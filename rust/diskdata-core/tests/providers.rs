//! End-to-end provider behaviour against real files on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use diskdata_core::{
    ChannelBuffer, ChannelDiskDataProvider, Datapoint, FnDecoder, Manifest, ProviderBuilder,
    ProviderConfig, ProviderError, QueueBuffer, QueueDiskDataProvider, RawF32Decoder, ReadBuffer,
};
use tempfile::TempDir;

const XSIZE: [usize; 2] = [4, 2];

/// Writes `n` samples of 8 floats whose first value is the sample index.
fn write_samples(dir: &Path, n: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| {
            let file = PathBuf::from(format!("{}.bin", i + 1));
            let mut input = vec![0.0f32; 8];
            input[0] = i as f32;
            std::fs::write(dir.join(&file), RawF32Decoder::encode(&input)).unwrap();
            file
        })
        .collect()
}

fn config(dir: &Path) -> ProviderConfig {
    let mut config = ProviderConfig::default();
    config.storage.base_path = dir.to_path_buf();
    config.provider.batch_size = 2;
    config.provider.queue_length = 10;
    config.provider.seed = Some(17);
    config.reader.poll_interval_ms = 5;
    config
}

#[test]
fn channel_provider_trains_on_stratified_split() {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 100);
    let labels: Vec<u32> = (0..100).map(|i| i % 5 + 1).collect();

    let dataset: ChannelDiskDataProvider<u32> =
        ProviderBuilder::from_config(&config(temp.path()), XSIZE.to_vec())
            .unwrap()
            .files(files)
            .labels(labels)
            .build()
            .unwrap();

    let (train, validation) = dataset.stratifiedobs(0.75).unwrap();
    assert_eq!(train.nobs() + validation.nobs(), 100);
    assert_eq!(train.ulabels(), &[1, 2, 3, 4, 5]);

    train.start_reading().unwrap();
    train.wait().unwrap();

    let mut batches = 0;
    for batch in train.batchview().unwrap() {
        let batch = batch.unwrap();
        assert_eq!(batch.shape, vec![2, 4, 2]);
        for i in 0..batch.len() {
            let index = batch.sample(i).unwrap()[0] as u32;
            assert_eq!(batch.label(i), Some(&(index % 5 + 1)));
        }
        batches += 1;
    }
    assert_eq!(batches, train.nobs() / 2);

    train.stop();
    assert!(!train.is_reading());

    // Validation is evaluated straight from disk.
    let full = validation.full_batch().unwrap();
    assert_eq!(full.shape, vec![validation.nobs(), 4, 2]);
}

#[test]
fn queue_provider_serves_without_blocking_after_wait() {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 30);

    let dataset: QueueDiskDataProvider<u32> =
        ProviderBuilder::from_config(&config(temp.path()), XSIZE.to_vec())
            .unwrap()
            .files(files)
            .labels((0..30).map(|i| i % 3).collect())
            .build()
            .unwrap();

    dataset.start_reading().unwrap();
    assert!(dataset.wait_timeout(Duration::from_secs(10)).unwrap());
    assert_eq!(dataset.buffered_len(), 10);

    // More batches than the dataset holds; the ring keeps serving.
    for _ in 0..5 {
        let view = dataset.batchview_with_size(5).unwrap();
        assert_eq!(view.len(), 6);
        for batch in view {
            assert_eq!(batch.unwrap().len(), 5);
        }
    }

    dataset.stop();
}

fn failing_batchview<B: ReadBuffer<u32>>() -> ProviderError {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 6);

    let dataset = ProviderBuilder::<u32>::from_config(&config(temp.path()), XSIZE.to_vec())
        .unwrap()
        .files(files)
        .decoder(Arc::new(FnDecoder::new(|_, _| Err("unreadable sample".to_string()))))
        .build::<B>()
        .unwrap();

    dataset.start_reading().unwrap();
    dataset.wait().unwrap();
    assert!(!dataset.is_reading());

    let batches: Vec<_> = dataset.batchview().unwrap().collect();
    assert_eq!(batches.len(), 1);
    batches.into_iter().next().unwrap().unwrap_err()
}

#[test]
fn channel_reader_failure_surfaces_in_batchview() {
    let err = failing_batchview::<ChannelBuffer<u32>>();
    assert!(matches!(err, ProviderError::Decode { .. }));
    assert!(err.to_string().contains("unreadable sample"));
}

#[test]
fn queue_reader_failure_surfaces_in_batchview() {
    let err = failing_batchview::<QueueBuffer<u32>>();
    assert!(matches!(err, ProviderError::ReaderFailed { .. }));
    assert!(err.to_string().contains("unreadable sample"));
}

#[test]
fn transform_runs_in_reader() {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 6);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let dataset: ChannelDiskDataProvider<u32> =
        ProviderBuilder::from_config(&config(temp.path()), XSIZE.to_vec())
            .unwrap()
            .files(files)
            .transform(move |mut dp: Datapoint<u32>| {
                counter.fetch_add(1, Ordering::Relaxed);
                dp.input[1] = 1.0;
                dp
            })
            .build()
            .unwrap();

    for dp in dataset.buffered().unwrap() {
        let dp = dp.unwrap();
        assert_eq!(dp.input[1], 1.0);
        assert!(dp.label.is_none());
    }
    assert!(calls.load(Ordering::Relaxed) >= 6);
}

#[test]
fn manifest_round_trip_builds_provider() {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 8);
    let labels: Vec<&str> = ["cat", "dog"].iter().copied().cycle().take(8).collect();

    let path = temp.path().join("manifest.json");
    Manifest::from_parts(XSIZE.to_vec(), files, Some(&labels[..]))
        .unwrap()
        .to_file(&path)
        .unwrap();

    let manifest = Manifest::from_file(&path).unwrap();
    let dataset: QueueDiskDataProvider<String> =
        QueueDiskDataProvider::from_manifest(&manifest, &config(temp.path())).unwrap();

    assert_eq!(dataset.nobs(), 8);
    assert_eq!(dataset.ulabels(), &["cat".to_string(), "dog".to_string()]);

    let dog = dataset.sample_input_with_label(&"dog".to_string()).unwrap();
    assert_eq!(dog.input[0] as usize % 2, 1);
}

#[test]
fn dropping_provider_stops_reader() {
    let temp = TempDir::new().unwrap();
    let files = write_samples(temp.path(), 20);

    let dataset: ChannelDiskDataProvider<u32> =
        ProviderBuilder::from_config(&config(temp.path()), XSIZE.to_vec())
            .unwrap()
            .files(files)
            .build()
            .unwrap();

    dataset.start_reading().unwrap();
    let mut batches = dataset.batchview().unwrap();
    assert!(batches.next().unwrap().is_ok());

    drop(dataset);

    // The view drains what was buffered, then reports the stopped reader.
    let rest: Vec<_> = batches.collect();
    assert!(rest.iter().filter(|b| b.is_ok()).count() <= 5);
    assert!(matches!(rest.last(), Some(Err(ProviderError::NotReading))));
}
