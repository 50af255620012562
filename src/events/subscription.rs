use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::registry::{Frame, SubscriberId, SubscriberRegistry};

/// Receiving side of one registered subscriber.
///
/// Yields frames until the registry drops the sender (deregistration or
/// shutdown). Dropping a `Subscription` deregisters it, so every exit path of
/// the owning connection cleans up exactly once.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Frame>,
    registry: SubscriberRegistry,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, rx: mpsc::Receiver<Frame>, registry: SubscriberRegistry) -> Self {
        Self { id, rx, registry }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame. `None` once the subscriber has been removed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
        tracing::debug!(subscriber_id = %self.id, "Subscription dropped");
    }
}
