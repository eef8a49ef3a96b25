//! Display sink contract and the sinks the daemon and tests use.

use parking_lot::Mutex;
use signal_core::DisplayUpdate;
use tokio::sync::broadcast;

/// Receives normalized state. Always called from the pipeline task, one
/// update at a time.
pub trait DisplaySink: Send + Sync {
    fn update(&self, update: DisplayUpdate);
}

pub type UpdateTx = broadcast::Sender<DisplayUpdate>;

/// Fans updates out over a broadcast channel and keeps the latest one for
/// snapshot reads.
pub struct ChannelSink {
    tx: UpdateTx,
    latest: Mutex<Option<DisplayUpdate>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayUpdate> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<DisplayUpdate> {
        self.latest.lock().clone()
    }
}

impl DisplaySink for ChannelSink {
    fn update(&self, update: DisplayUpdate) {
        *self.latest.lock() = Some(update.clone());
        // No receivers is fine; the snapshot still holds the update.
        let _ = self.tx.send(update);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> DisplaySink for FnSink<F>
where
    F: Fn(DisplayUpdate) + Send + Sync,
{
    fn update(&self, update: DisplayUpdate) {
        (self.0)(update);
    }
}
