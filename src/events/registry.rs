//! Live subscriber registry for upload notifications.
//!
//! Each subscriber is one open `GET /events` stream. The registry owns the
//! sending half of a bounded channel per subscriber; the SSE response body
//! owns the receiving half (see [`Subscription`]).

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::subscription::Subscription;

/// Default per-subscriber queue depth (frames buffered before dropping).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One serialized event. Shared by every subscriber it is delivered to.
pub type Frame = Arc<str>;

/// Sending half of a subscriber's channel.
pub type SubscriberSink = mpsc::Sender<Frame>;

/// Registry-unique subscriber identifier, allocated from a monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a single broadcast, for logging only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued on a subscriber's channel
    pub delivered: usize,
    /// Subscribers skipped because their queue was full
    pub dropped: usize,
    /// Subscribers removed because their receiver was gone
    pub reaped: usize,
}

/// Process-wide set of connected event subscribers.
///
/// Cheap to clone; all clones share the same set. Construct one in `main`
/// and hand it to the handlers through `AppState`.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    subscribers: DashMap<SubscriberId, SubscriberSink>,
    next_id: AtomicU64,
    broadcasts: AtomicU64,
    channel_capacity: usize,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl SubscriberRegistry {
    /// Create an empty registry. `channel_capacity` is the queue depth used by
    /// [`subscribe`](Self::subscribe); zero is raised to one.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                broadcasts: AtomicU64::new(0),
                channel_capacity: channel_capacity.max(1),
            }),
        }
    }

    /// Add a sink to the set and return its fresh id. Never blocks.
    pub fn register(&self, sink: SubscriberSink) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.insert(id, sink);

        tracing::debug!(
            subscriber_id = %id,
            subscribers = self.inner.subscribers.len(),
            "Subscriber registered"
        );
        id
    }

    /// Open a new channel, register its sender and return the receiving side.
    /// The returned [`Subscription`] deregisters itself when dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);
        let id = self.register(tx);
        Subscription::new(id, rx, self.clone())
    }

    /// Remove a subscriber. Unknown or already removed ids are ignored.
    ///
    /// Returns whether an entry was removed.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(
                subscriber_id = %id,
                subscribers = self.inner.subscribers.len(),
                "Subscriber deregistered"
            );
        }
        removed
    }

    /// Serialize `payload` once and queue it for every registered subscriber.
    ///
    /// Best effort per subscriber: a full queue drops this frame for that
    /// subscriber only, and a closed queue gets its subscriber reaped. Nothing
    /// is reported back as an error.
    pub fn broadcast<T: Serialize + ?Sized>(&self, payload: &T) -> BroadcastReport {
        self.inner.broadcasts.fetch_add(1, Ordering::Relaxed);

        let frame: Frame = match serde_json::to_string(payload) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast payload");
                return BroadcastReport::default();
            }
        };

        // Snapshot first so the map is never held across the whole fan-out.
        let ids: Vec<SubscriberId> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        for id in ids {
            // The entry guard excludes a concurrent deregister until the send returns.
            let Some(sink) = self.inner.subscribers.get(&id) else {
                continue;
            };
            match sink.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::warn!(subscriber_id = %id, "Subscriber queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            if self.deregister(id) {
                report.reaped += 1;
            }
        }

        report
    }

    /// Number of currently registered subscribers.
    pub fn len(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.is_empty()
    }

    /// Total broadcasts issued since construction.
    pub fn broadcast_count(&self) -> u64 {
        self.inner.broadcasts.load(Ordering::Relaxed)
    }

    /// Drop every sink so open event streams end. Used on server shutdown.
    pub fn shutdown(&self) {
        let count = self.inner.subscribers.len();
        self.inner.subscribers.clear();
        tracing::info!(subscribers = count, "Subscriber registry closed");
    }
}
