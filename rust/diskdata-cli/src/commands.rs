//! Subcommand implementations, kept apart from argument parsing so they can
//! be tested without a process.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use diskdata_core::{
    BufferKind, ChannelBuffer, DiskDataProvider, Manifest, ProviderConfig, QueueBuffer,
    ReadBuffer, Result,
};

/// Relative sample paths resolve against the manifest's directory unless a
/// base path was configured.
fn resolve_config(manifest_path: &Path, config: &ProviderConfig) -> ProviderConfig {
    let mut config = config.clone();
    if config.storage.base_path == Path::new(".") {
        if let Some(parent) = manifest_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.storage.base_path = parent.to_path_buf();
        }
    }
    config
}

pub fn inspect(manifest_path: &Path, config: &ProviderConfig) -> Result<String> {
    let manifest = Manifest::from_file(manifest_path)?;
    let config = resolve_config(manifest_path, config);

    // Checked on the filesystem directly; opening a storage backend would
    // create the base directory.
    let base = &config.storage.base_path;
    let missing = manifest
        .files()
        .into_iter()
        .filter(|file| !base.join(file).is_file())
        .count();

    let mut out = String::new();
    out.push_str(&format!("samples: {}\n", manifest.len()));
    out.push_str(&format!("xsize:   {:?}\n", manifest.xsize));
    out.push_str(&format!("missing: {missing}\n"));

    match manifest.labels()? {
        Some(labels) => {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for label in labels {
                *counts.entry(label).or_default() += 1;
            }
            out.push_str(&format!("classes: {}\n", counts.len()));
            for (label, count) in counts {
                out.push_str(&format!("  {label}: {count}\n"));
            }
        }
        None => out.push_str("classes: unlabeled\n"),
    }

    Ok(out)
}

/// Writes the two halves of a stratified split and returns their sizes.
pub fn split(
    manifest_path: &Path,
    config: &ProviderConfig,
    fraction: f64,
    out_train: &Path,
    out_test: &Path,
) -> Result<(usize, usize)> {
    let manifest = Manifest::from_file(manifest_path)?;
    let config = resolve_config(manifest_path, config);
    let dataset: DiskDataProvider<String, ChannelBuffer<String>> =
        DiskDataProvider::from_manifest(&manifest, &config)?;

    let (train, test) = dataset.stratifiedobs(fraction)?;
    for (part, path) in [(&train, out_train), (&test, out_test)] {
        Manifest::from_parts(
            manifest.xsize.clone(),
            part.files().to_vec(),
            part.labels(),
        )?
        .to_file(path)?;
    }

    tracing::info!(train = train.nobs(), test = test.nobs(), fraction, "split manifest");
    Ok((train.nobs(), test.nobs()))
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub buffer: &'static str,
    pub batches: usize,
    pub batch_size: usize,
    pub warmup: Duration,
    pub elapsed: Duration,
}

impl BenchReport {
    pub fn datapoints_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.batches * self.batch_size) as f64 / secs
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buffer: {} batches of {} in {:.3}s after {:.3}s warmup ({:.1} datapoints/s)",
            self.buffer,
            self.batches,
            self.batch_size,
            self.elapsed.as_secs_f64(),
            self.warmup.as_secs_f64(),
            self.datapoints_per_sec()
        )
    }
}

pub fn bench(manifest_path: &Path, config: &ProviderConfig, batches: usize) -> Result<BenchReport> {
    let manifest = Manifest::from_file(manifest_path)?;
    let config = resolve_config(manifest_path, config);

    match config.provider.buffer {
        BufferKind::Channel => run_bench::<ChannelBuffer<String>>(&manifest, &config, batches),
        BufferKind::Queue => run_bench::<QueueBuffer<String>>(&manifest, &config, batches),
    }
}

fn run_bench<B: ReadBuffer<String>>(
    manifest: &Manifest,
    config: &ProviderConfig,
    batches: usize,
) -> Result<BenchReport> {
    let dataset: DiskDataProvider<String, B> = DiskDataProvider::from_manifest(manifest, config)?;

    let started = Instant::now();
    dataset.start_reading()?;
    dataset.wait()?;
    let warmup = started.elapsed();

    // The queue buffer never runs dry, so the batch count is not bounded by
    // the dataset size; the channel view is.
    let started = Instant::now();
    let mut read = 0usize;
    while read < batches {
        let view = dataset.batchview()?;
        if view.len() == 0 {
            break;
        }
        for batch in view.take(batches - read) {
            batch?;
            read += 1;
        }
    }
    let elapsed = started.elapsed();
    dataset.stop();

    Ok(BenchReport {
        buffer: B::KIND,
        batches: read,
        batch_size: dataset.batch_size(),
        warmup,
        elapsed,
    })
}
