use crate::kinds::SensorKind;
use crate::samples::Sample;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{trace, warn};

/// Default number of samples kept for slow readers
pub const DEFAULT_RING_CAPACITY: usize = 64;

/// Destination for completed samples
pub trait SampleSink: Send + Sync {
    /// Commit one completed sample and wake any waiting readers.
    fn publish(&self, sample: Sample);
}

/// Bounded ring of samples for one sensor kind. Readers that fall behind
/// lose the oldest samples.
pub struct RingBufferSink {
    kind: SensorKind,
    tx: broadcast::Sender<Sample>,
    published: AtomicU64,
}

impl RingBufferSink {
    pub fn new(kind: SensorKind, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            kind,
            tx,
            published: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.tx.subscribe()
    }

    /// Stream of samples that skips over lag gaps.
    pub fn stream(&self) -> impl Stream<Item = Sample> + Send + 'static {
        let kind = self.kind;
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| match item {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("[sink:{}] reader lagged: {}", kind, e);
                None
            }
        })
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl SampleSink for RingBufferSink {
    fn publish(&self, sample: Sample) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(sample).is_err() {
            // No active readers - this is fine
            trace!("[sink:{}] sample dropped, no readers", self.kind);
        }
    }
}
