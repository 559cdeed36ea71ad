//! Disk Data Providers command-line tool
//!
//! Inspects dataset manifests, splits them stratified by label, and measures
//! how fast a buffered provider can feed batches.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a manifest
//! ddp inspect data/manifest.json
//!
//! # 80/20 stratified split into two new manifests
//! ddp split data/manifest.json --fraction 0.8 --out-train train.json --out-test test.json
//!
//! # Time 100 batches through the queue buffer
//! ddp --config ddp.toml bench data/manifest.json --buffer queue --batches 100
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diskdata_core::{BufferKind, ProviderConfig};

/// Disk Data Providers
#[derive(Parser, Debug)]
#[command(name = "ddp")]
#[command(about = "Inspect, split and benchmark disk-backed datasets")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the size, shape and label counts of a manifest
    Inspect {
        manifest: PathBuf,
    },

    /// Split a labelled manifest into stratified train and test manifests
    Split {
        manifest: PathBuf,

        /// Fraction of each class that goes to the train manifest
        #[arg(long, default_value = "0.8")]
        fraction: f64,

        #[arg(long)]
        out_train: PathBuf,

        #[arg(long)]
        out_test: PathBuf,

        /// Seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Read batches through a background buffer and report throughput
    Bench {
        manifest: PathBuf,

        /// Buffer strategy (channel, queue); defaults to the configured one
        #[arg(long)]
        buffer: Option<BufferKind>,

        /// Number of batches to read
        #[arg(long, default_value = "50")]
        batches: usize,

        /// Overrides provider.batch_size
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    match args.command {
        Command::Inspect { manifest } => {
            let summary = commands::inspect(&manifest, &config)?;
            print!("{summary}");
        }
        Command::Split {
            manifest,
            fraction,
            out_train,
            out_test,
            seed,
        } => {
            let mut config = config;
            if seed.is_some() {
                config.provider.seed = seed;
            }
            let (train, test) =
                commands::split(&manifest, &config, fraction, &out_train, &out_test)?;
            println!(
                "wrote {train} samples to {} and {test} samples to {}",
                out_train.display(),
                out_test.display()
            );
        }
        Command::Bench {
            manifest,
            buffer,
            batches,
            batch_size,
        } => {
            let mut config = config;
            if let Some(buffer) = buffer {
                config.provider.buffer = buffer;
            }
            if let Some(batch_size) = batch_size {
                config.provider.batch_size = batch_size;
            }
            config.validate()?;

            let report = commands::bench(&manifest, &config, batches)?;
            println!("{report}");
        }
    }

    Ok(())
}
