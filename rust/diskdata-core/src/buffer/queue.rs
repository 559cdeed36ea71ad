// rust/diskdata-core/src/buffer/queue.rs

//! Ring buffer that the reader keeps refreshing behind the consumer.
//!
//! The reader first fills every slot, then replaces slots in round-robin
//! order with newly read datapoints. A slot is only replaced after the
//! consumer has read it since it was last written, so a fast reader idles
//! instead of churning the disk. The consumer reads slots round-robin and
//! never waits once the ring is primed; if the reader lags it simply sees
//! older datapoints again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use super::{EpochOrder, ReadBuffer, ReaderSettings, ReaderThread};
use crate::error::{ProviderError, Result};
use crate::sample::Datapoint;
use crate::source::{Label, SampleSource};

struct RingState<L> {
    slots: Vec<Option<Datapoint<L>>>,
    /// Written since the consumer last read the slot.
    unread: Vec<bool>,
    filled: usize,
    read_pos: usize,
    failure: Option<ProviderError>,
    finished: bool,
}

struct Ring<L> {
    state: Mutex<RingState<L>>,
    changed: Condvar,
}

/// A reusable ring buffer with a background refresher thread.
pub struct QueueBuffer<L> {
    ring: Arc<Ring<L>>,
    capacity: usize,
    poll_interval: Duration,
    reader: ReaderThread,
}

impl<L: Label> QueueBuffer<L> {
    fn run_reader(
        source: Arc<SampleSource<L>>,
        ring: Arc<Ring<L>>,
        stop_flag: Arc<AtomicBool>,
        settings: ReaderSettings,
    ) {
        let capacity = settings.queue_length;
        let mut order = EpochOrder::new(source.len(), settings.seed);
        let mut write_pos = 0usize;
        let mut replaced = 0u64;

        while !stop_flag.load(Ordering::Relaxed) {
            // Once primed, wait for the consumer to read the target slot.
            {
                let mut state = ring.state.lock();
                while state.filled == capacity && state.unread[write_pos] {
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    ring.changed.wait_for(&mut state, settings.poll_interval);
                }
            }
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let index = order.next_index();
            let datapoint = match source.read(index) {
                Ok(datapoint) => datapoint,
                Err(e) => {
                    error!(file = %source.files()[index].display(), "failed to read sample: {e}");
                    ring.state.lock().failure = Some(e);
                    break;
                }
            };

            let mut state = ring.state.lock();
            if state.slots[write_pos].is_none() {
                state.filled += 1;
                if state.filled == capacity {
                    debug!(capacity, "queue buffer primed");
                }
            } else {
                replaced += 1;
            }
            state.slots[write_pos] = Some(datapoint);
            state.unread[write_pos] = true;
            drop(state);
            ring.changed.notify_all();

            write_pos = (write_pos + 1) % capacity;
        }

        ring.state.lock().finished = true;
        ring.changed.notify_all();
        debug!(replaced, "queue reader stopped");
    }
}

impl<L: Label> ReadBuffer<L> for QueueBuffer<L> {
    const KIND: &'static str = "queue";

    fn start(source: Arc<SampleSource<L>>, settings: ReaderSettings) -> Result<Self> {
        if source.is_empty() {
            return Err(ProviderError::invalid_argument("cannot read from an empty dataset"));
        }
        if settings.queue_length == 0 {
            return Err(ProviderError::invalid_argument("queue_length must be greater than 0"));
        }

        let capacity = settings.queue_length;
        let ring = Arc::new(Ring {
            state: Mutex::new(RingState {
                slots: (0..capacity).map(|_| None).collect(),
                unread: vec![false; capacity],
                filled: 0,
                read_pos: 0,
                failure: None,
                finished: false,
            }),
            changed: Condvar::new(),
        });
        let poll_interval = settings.poll_interval;

        let reader_ring = ring.clone();
        let reader = ReaderThread::spawn(move |stop_flag| {
            Self::run_reader(source, reader_ring, stop_flag, settings);
        })?;

        Ok(Self {
            ring,
            capacity,
            poll_interval,
            reader,
        })
    }

    fn take(&self) -> Result<Datapoint<L>> {
        let mut state = self.ring.state.lock();

        loop {
            if let Some(e) = &state.failure {
                return Err(e.detached());
            }

            let pos = state.read_pos;
            if let Some(datapoint) = state.slots[pos].clone() {
                state.unread[pos] = false;
                state.read_pos = (pos + 1) % self.capacity;
                drop(state);
                self.ring.changed.notify_all();
                return Ok(datapoint);
            }

            if state.finished {
                // Stopped before the ring was full; cycle over what exists.
                if state.filled == 0 {
                    return Err(ProviderError::NotReading);
                }
                state.read_pos = 0;
                continue;
            }

            self.ring.changed.wait_for(&mut state, self.poll_interval);
        }
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.ring.state.lock();

        while state.filled < self.capacity && !state.finished {
            if self.ring.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        state.filled == self.capacity
    }

    fn stop(&self) {
        self.reader.signal_stop();
        self.ring.changed.notify_all();
        self.reader.join();
    }

    fn is_running(&self) -> bool {
        !self.ring.state.lock().finished && !self.reader.is_finished()
    }

    fn buffered_len(&self) -> usize {
        self.ring.state.lock().filled
    }
}

impl<L> Drop for QueueBuffer<L> {
    fn drop(&mut self) {
        self.reader.signal_stop();
        self.ring.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::sample::RawF32Decoder;
    use crate::storage::{LocalStorage, StorageBackend};
    use std::path::PathBuf;
    use std::thread;
    use tempfile::TempDir;

    fn source(n: usize) -> (Arc<SampleSource<u32>>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        let files: Vec<PathBuf> = (0..n).map(|i| PathBuf::from(format!("{i}.bin"))).collect();
        for (i, file) in files.iter().enumerate() {
            storage.write_all(file, &RawF32Decoder::encode(&[i as f32, 1.0])).unwrap();
        }

        let source = SampleSource::new(
            Arc::new(storage),
            files,
            Some((0..n as u32).collect()),
            vec![2],
            Arc::new(RawF32Decoder),
            None,
        );
        (Arc::new(source), temp)
    }

    fn settings(queue_length: usize) -> ReaderSettings {
        ReaderSettings {
            queue_length,
            poll_interval: Duration::from_millis(5),
            seed: Some(11),
        }
    }

    #[test]
    fn test_primes_every_slot() {
        let (source, _temp) = source(3);
        let buffer = QueueBuffer::start(source, settings(8)).unwrap();

        assert!(buffer.wait_ready(Duration::from_secs(10)));
        assert_eq!(buffer.buffered_len(), 8);
    }

    #[test]
    fn test_reader_does_not_overwrite_unread_slots() {
        let (source, _temp) = source(50);
        let buffer = QueueBuffer::start(source, settings(4)).unwrap();
        assert!(buffer.wait_ready(Duration::from_secs(10)));

        let snapshot: Vec<_> = buffer.ring.state.lock().slots.clone();
        thread::sleep(Duration::from_millis(50));
        let later: Vec<_> = buffer.ring.state.lock().slots.clone();
        assert_eq!(snapshot, later);
    }

    #[test]
    fn test_take_never_blocks_once_primed() {
        let (source, _temp) = source(5);
        let buffer = QueueBuffer::start(source, settings(4)).unwrap();
        assert!(buffer.wait_ready(Duration::from_secs(10)));

        buffer.stop();
        assert!(!buffer.is_running());

        // With the reader gone the ring is served as-is, repeatedly.
        let first: Vec<u32> = (0..4).map(|_| buffer.take().unwrap().label.unwrap()).collect();
        let second: Vec<u32> = (0..4).map(|_| buffer.take().unwrap().label.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reader_refreshes_consumed_slots() {
        let (source, _temp) = source(40);
        let buffer = QueueBuffer::start(source, settings(4)).unwrap();
        assert!(buffer.wait_ready(Duration::from_secs(10)));

        let mut labels = Vec::new();
        for _ in 0..40 {
            labels.push(buffer.take().unwrap().label.unwrap());
            thread::sleep(Duration::from_millis(2));
        }
        labels.sort_unstable();
        labels.dedup();
        // More distinct files than slots means slots were replaced.
        assert!(labels.len() > 4);
    }

    #[test]
    fn test_stop_before_primed_serves_partial_ring() {
        let (source, _temp) = source(2);
        let buffer = QueueBuffer::start(source, settings(1000)).unwrap();

        // Let the reader load something, then stop it mid-fill.
        let dp = buffer.take().unwrap();
        buffer.stop();

        assert!(dp.label.is_some());
        assert!(buffer.take().is_ok());
    }

    #[test]
    fn test_read_failure_sticks() {
        use crate::sample::FnDecoder;

        let (source, temp) = source(3);
        let failing: SampleSource<u32> = SampleSource::new(
            Arc::new(LocalStorage::new(&StorageConfig {
                base_path: temp.path().to_path_buf(),
                ..Default::default()
            })
            .unwrap()),
            source.files().to_vec(),
            None,
            vec![2],
            Arc::new(FnDecoder::new(|_, _| Err("corrupt sample".to_string()))),
            None,
        );
        let buffer = QueueBuffer::start(Arc::new(failing), settings(4)).unwrap();

        assert!(!buffer.wait_ready(Duration::from_secs(10)));
        assert!(!buffer.is_running());
        assert_eq!(buffer.buffered_len(), 0);

        for _ in 0..3 {
            let err = buffer.take().unwrap_err();
            assert!(matches!(err, ProviderError::ReaderFailed { .. }));
            assert!(err.to_string().contains("corrupt sample"));
        }
    }

    #[test]
    fn test_labels_travel_with_inputs() {
        let (source, _temp) = source(7);
        let buffer = QueueBuffer::start(source, settings(3)).unwrap();

        for _ in 0..20 {
            let dp = buffer.take().unwrap();
            assert_eq!(dp.input[0] as u32, dp.label.unwrap());
        }
    }
}
