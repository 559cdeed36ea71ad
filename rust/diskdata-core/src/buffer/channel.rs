// rust/diskdata-core/src/buffer/channel.rs

//! Bounded FIFO buffer fed by a background reader thread.
//!
//! The reader walks the files in a shuffled order, one permutation per
//! pass, and blocks while the channel is full. The consumer blocks while it
//! is empty, so each side runs at the pace of the slower one.
//!
//! A read failure travels through the channel like any other item: the
//! consumer receives it after the datapoints already buffered ahead of it,
//! up to `queue_length` of them. The reader exits after sending it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, error};

use super::{EpochOrder, ReadBuffer, ReaderSettings, ReaderThread};
use crate::error::{ProviderError, Result};
use crate::sample::Datapoint;
use crate::source::{Label, SampleSource};

/// Result type for buffered items.
type BufferedItem<L> = Result<Datapoint<L>>;

/// A consume-once buffer backed by a bounded crossbeam channel.
pub struct ChannelBuffer<L> {
    /// Receiving end; the reader thread owns the sender.
    receiver: Receiver<BufferedItem<L>>,
    /// Datapoints that make the buffer count as primed.
    ready_len: usize,
    poll_interval: Duration,
    reader: ReaderThread,
}

impl<L: Label> ChannelBuffer<L> {
    fn run_reader(
        source: Arc<SampleSource<L>>,
        sender: Sender<BufferedItem<L>>,
        stop_flag: Arc<AtomicBool>,
        settings: ReaderSettings,
    ) {
        let mut order = EpochOrder::new(source.len(), settings.seed);
        let mut sent = 0u64;

        'reading: while !stop_flag.load(Ordering::Relaxed) {
            let index = order.next_index();
            let mut item = source.read(index);
            let failed = item.is_err();
            if let Err(e) = &item {
                error!(file = %source.files()[index].display(), "failed to read sample: {e}");
            }

            // Block until there is room, re-checking the stop flag.
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break 'reading;
                }

                match sender.send_timeout(item, settings.poll_interval) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(back)) => item = back,
                    Err(SendTimeoutError::Disconnected(_)) => break 'reading,
                }
            }

            sent += 1;
            if failed {
                break;
            }
        }

        debug!(sent, "channel reader stopped");
    }
}

impl<L: Label> ReadBuffer<L> for ChannelBuffer<L> {
    const KIND: &'static str = "channel";

    fn start(source: Arc<SampleSource<L>>, settings: ReaderSettings) -> Result<Self> {
        if source.is_empty() {
            return Err(ProviderError::invalid_argument("cannot read from an empty dataset"));
        }
        if settings.queue_length == 0 {
            return Err(ProviderError::invalid_argument("queue_length must be greater than 0"));
        }

        let (sender, receiver) = channel::bounded(settings.queue_length);
        let ready_len = settings.queue_length.min(source.len());
        let poll_interval = settings.poll_interval;

        let reader = ReaderThread::spawn(move |stop_flag| {
            Self::run_reader(source, sender, stop_flag, settings);
        })?;

        Ok(Self {
            receiver,
            ready_len,
            poll_interval,
            reader,
        })
    }

    fn take(&self) -> Result<Datapoint<L>> {
        loop {
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(item) => return item,
                Err(RecvTimeoutError::Timeout) => {
                    if self.reader.is_finished() && self.receiver.is_empty() {
                        return Err(ProviderError::NotReading);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ProviderError::NotReading),
            }
        }
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            if self.receiver.len() >= self.ready_len {
                return true;
            }
            if self.reader.is_finished() || Instant::now() >= deadline {
                return self.receiver.len() >= self.ready_len;
            }
            thread::sleep(self.poll_interval.min(Duration::from_millis(5)));
        }
    }

    fn stop(&self) {
        self.reader.join();
    }

    fn is_running(&self) -> bool {
        !self.reader.is_finished()
    }

    fn buffered_len(&self) -> usize {
        self.receiver.len()
    }
}
