//! Observer Broadcast Hub
//!
//! Fire-and-forget fan-out of engine output to every connected observer.
//! The tick loop publishes and moves on; a slow or disconnected observer can
//! never block it or delay delivery to others.
//!
//! Each observer reads through a bounded queue with drop-oldest-on-overflow
//! semantics. Falling behind surfaces as a [`FeedItem::Gap`], after which the
//! observer re-derives correct state from a fresh snapshot.

use tokio::sync::broadcast;
use tracing::trace;

use crate::network::protocol::ServerMessage;

/// Default per-observer queue capacity, in events.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// One item read from an observer's feed.
#[derive(Debug, Clone)]
pub enum FeedItem {
    /// The next event in order.
    Event(ServerMessage),
    /// This observer fell behind and `missed` oldest events were dropped.
    /// Re-sync from a snapshot before trusting local round state.
    Gap {
        /// Number of events dropped for this observer.
        missed: u64,
    },
}

/// Fan-out point for engine events.
pub struct ObserverHub {
    tx: broadcast::Sender<ServerMessage>,
}

impl ObserverHub {
    /// Create a hub whose per-observer queues hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every subscribed observer. Never blocks; with no
    /// observers connected the event is simply dropped.
    pub fn publish(&self, message: ServerMessage) {
        let delivered = self.tx.send(message).unwrap_or(0);
        trace!(delivered, "event published");
    }

    /// Subscribe a new observer. Dropping the feed unsubscribes.
    pub fn subscribe(&self) -> ObserverFeed {
        ObserverFeed {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

/// One observer's ordered view of the event stream.
pub struct ObserverFeed {
    rx: broadcast::Receiver<ServerMessage>,
}

impl ObserverFeed {
    /// Wait for the next item. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<FeedItem> {
        match self.rx.recv().await {
            Ok(message) => Some(FeedItem::Event(message)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(FeedItem::Gap { missed }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(n: u64) -> ServerMessage {
        ServerMessage::Pong {
            timestamp: n,
            server_time: n,
        }
    }

    fn timestamp(item: &FeedItem) -> Option<u64> {
        match item {
            FeedItem::Event(ServerMessage::Pong { timestamp, .. }) => Some(*timestamp),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_observers() {
        let hub = ObserverHub::new(16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.observer_count(), 2);

        hub.publish(tick(1));
        hub.publish(tick(2));

        for feed in [&mut a, &mut b] {
            assert_eq!(timestamp(&feed.next().await.unwrap()), Some(1));
            assert_eq!(timestamp(&feed.next().await.unwrap()), Some(2));
        }
    }

    #[tokio::test]
    async fn test_slow_observer_sees_gap_and_newest_events() {
        let hub = ObserverHub::new(4);
        let mut slow = hub.subscribe();

        // Publisher runs far ahead without the observer draining
        for n in 0..10 {
            hub.publish(tick(n));
        }

        // Oldest events dropped, gap reported once
        match slow.next().await.unwrap() {
            FeedItem::Gap { missed } => assert_eq!(missed, 6),
            other => panic!("expected gap, got {other:?}"),
        }
        // The newest events are intact and in order
        for n in 6..10 {
            assert_eq!(timestamp(&slow.next().await.unwrap()), Some(n));
        }
    }

    #[tokio::test]
    async fn test_publish_without_observers_is_harmless() {
        let hub = ObserverHub::new(4);
        assert_eq!(hub.observer_count(), 0);
        hub.publish(tick(1));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = ObserverHub::new(4);
        let feed = hub.subscribe();
        assert_eq!(hub.observer_count(), 1);
        drop(feed);
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_ends_when_hub_dropped() {
        let hub = ObserverHub::new(4);
        let mut feed = hub.subscribe();
        drop(hub);
        assert!(feed.next().await.is_none());
    }
}
