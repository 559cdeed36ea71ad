// rust/diskdata-core/src/buffer/mod.rs

//! Background read buffers.
//!
//! A provider owns at most one running buffer. The buffer spawns a reader
//! thread that pulls observations from the provider's [`SampleSource`] in
//! shuffled order and parks them until the consumer takes them. Two
//! strategies are available:
//!
//! - [`ChannelBuffer`]: a bounded FIFO. Every buffered datapoint is handed
//!   out once and the consumer waits when the buffer runs dry. Use it when
//!   reading a datapoint is faster than one training step.
//! - [`QueueBuffer`]: a ring of slots that the reader keeps refreshing. The
//!   consumer never waits once the ring is primed and may see a datapoint
//!   more than once. Use it when reading is the bottleneck.

mod channel;
mod queue;

pub use channel::ChannelBuffer;
pub use queue::QueueBuffer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, error};

use crate::error::{ProviderError, Result};
use crate::sample::Datapoint;
use crate::source::{Label, SampleSource};

/// Settings handed to a buffer when reading starts.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    /// Buffer capacity in datapoints.
    pub queue_length: usize,
    /// How often blocked parties re-check for stop or progress.
    pub poll_interval: Duration,
    /// Seed for the reader's visiting order; entropy when `None`.
    pub seed: Option<u64>,
}

/// A buffer strategy fed by a background reader thread.
pub trait ReadBuffer<L: Label>: Send + Sync + Sized + 'static {
    /// Human-readable strategy name, for logs.
    const KIND: &'static str;

    /// Spawns the reader thread and returns the running buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    fn start(source: Arc<SampleSource<L>>, settings: ReaderSettings) -> Result<Self>;

    /// Takes the next datapoint from the buffer.
    ///
    /// # Errors
    ///
    /// Forwards a read failure from the reader thread, or returns
    /// `NotReading` once the reader has stopped and nothing is left.
    fn take(&self) -> Result<Datapoint<L>>;

    /// Blocks until the buffer is primed, the reader stops, or `timeout`
    /// elapses. Returns whether the buffer is primed.
    fn wait_ready(&self, timeout: Duration) -> bool;

    /// Signals the reader to stop and joins it. Idempotent.
    fn stop(&self);

    /// Whether the reader thread is still running.
    fn is_running(&self) -> bool;

    /// Number of datapoints currently held.
    fn buffered_len(&self) -> usize;
}

/// Owns the reader thread and its stop flag.
pub(crate) struct ReaderThread {
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReaderThread {
    /// Spawns `body` on a named thread. `body` receives the stop flag and
    /// must return soon after it is set.
    pub(crate) fn spawn<F>(body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();

        let handle = thread::Builder::new()
            .name("ddp-reader".into())
            .spawn(move || body(flag))
            .map_err(|e| ProviderError::reader_failed(format!("failed to spawn reader thread: {e}")))?;

        Ok(Self {
            stop_flag,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn signal_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub(crate) fn join(&self) {
        self.signal_stop();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("reader thread panicked");
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ReaderThread {
    fn drop(&mut self) {
        self.join();
    }
}

/// Endless visiting order over `0..len`: a fresh permutation per epoch.
pub(crate) struct EpochOrder {
    order: Vec<usize>,
    position: usize,
    epoch: u64,
    rng: StdRng,
}

impl EpochOrder {
    pub(crate) fn new(len: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order = Self {
            order: (0..len).collect(),
            position: 0,
            epoch: 0,
            rng,
        };
        order.order.shuffle(&mut order.rng);
        order
    }

    /// The next index to read. `len` must be non-zero.
    pub(crate) fn next_index(&mut self) -> usize {
        if self.position == self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.position = 0;
            self.epoch += 1;
            debug!(epoch = self.epoch, "reader starting new pass over files");
        }
        let index = self.order[self.position];
        self.position += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_epoch_order_is_permutation_per_epoch() {
        let mut order = EpochOrder::new(10, Some(3));

        for _ in 0..3 {
            let mut seen: Vec<usize> = (0..10).map(|_| order.next_index()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_epoch_order_seeded() {
        let mut a = EpochOrder::new(20, Some(42));
        let mut b = EpochOrder::new(20, Some(42));
        let first: Vec<usize> = (0..40).map(|_| a.next_index()).collect();
        let second: Vec<usize> = (0..40).map(|_| b.next_index()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reader_thread_stops_on_flag() {
        let reader = ReaderThread::spawn(|stop| {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert!(!reader.is_finished());
        let started = Instant::now();
        reader.join();
        assert!(reader.is_finished());
        assert!(started.elapsed() < Duration::from_secs(5));

        // Joining again is a no-op
        reader.join();
    }
}
