//! Event source contract and the in-process broadcast implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use signal_core::Payload;
use thiserror::Error;

/// Callback invoked for every payload on a subscribed channel. May be called
/// from any thread.
pub type PayloadHandler = Arc<dyn Fn(Payload) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("event source is closed")]
    Closed,
    #[error("subscription to channel '{channel}' rejected: {reason}")]
    Rejected { channel: String, reason: String },
}

/// Broadcast-style event source filtered by channel id.
pub trait EventSource: Send + Sync {
    fn subscribe(
        &self,
        channel: &str,
        handler: PayloadHandler,
    ) -> Result<SubscriptionHandle, SourceError>;

    /// Unknown or already-dropped handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

struct Subscriber {
    channel: String,
    handler: PayloadHandler,
}

/// In-process pub/sub keyed by channel id.
#[derive(Default)]
pub struct LocalBroadcastSource {
    subscribers: Mutex<HashMap<SubscriptionHandle, Subscriber>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl LocalBroadcastSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `payload` to every subscriber of `channel`. Returns how many
    /// handlers were invoked.
    pub fn publish(&self, channel: &str, payload: &Payload) -> usize {
        // Snapshot handlers so a handler may (un)subscribe without deadlocking.
        let handlers: Vec<PayloadHandler> = self
            .subscribers
            .lock()
            .values()
            .filter(|s| s.channel == channel)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Closing makes further subscriptions fail. Existing ones keep working.
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .values()
            .filter(|s| s.channel == channel)
            .count()
    }
}

impl EventSource for LocalBroadcastSource {
    fn subscribe(
        &self,
        channel: &str,
        handler: PayloadHandler,
    ) -> Result<SubscriptionHandle, SourceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SourceError::Closed);
        }
        if channel.is_empty() {
            return Err(SourceError::Rejected {
                channel: channel.to_string(),
                reason: "empty channel id".to_string(),
            });
        }
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().insert(
            handle,
            Subscriber {
                channel: channel.to_string(),
                handler,
            },
        );
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.lock().remove(&handle);
    }
}
