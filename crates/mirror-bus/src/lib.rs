// In-process live bus for newly-committed topic messages.
// The ingestion pathway publishes; any number of subscriptions fan out from
// per-topic broadcast channels. Receivers that fall behind the channel
// capacity observe a lag error rather than stalling the publisher.
use mirror_common::{EntityId, TopicMessage};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

pub type Result<T> = std::result::Result<T, BusError>;

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("channel capacity must be greater than zero")]
    CapacityTooSmall,
}

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Live source of newly-committed topic messages.
///
/// Subscribing returns a receiver positioned at the tail of the topic; only
/// messages published after the call are observed. Unsubscribing is dropping
/// the receiver. Delivery is best-effort in order: a receiver may observe a
/// sequence gap (publish races) or a boundary duplicate; consumers own
/// dedup and gap repair.
pub trait LiveBus: Send + Sync {
    fn subscribe(&self, topic_id: EntityId) -> broadcast::Receiver<TopicMessage>;
}

/// In-process implementation of [`LiveBus`].
///
/// ```
/// use bytes::Bytes;
/// use mirror_bus::{LiveBus, TopicBus};
/// use mirror_common::{EntityId, TopicMessage};
///
/// let bus = TopicBus::new(16).expect("bus");
/// let topic_id = EntityId::new(100);
/// let mut sub = bus.subscribe(topic_id);
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     bus.publish(TopicMessage {
///         topic_id,
///         sequence_number: 1,
///         consensus_timestamp: 1,
///         message: Bytes::from_static(b"hello"),
///         running_hash: Bytes::from_static(b"hash"),
///         running_hash_version: 2,
///     });
///     let message = sub.recv().await.expect("recv");
///     assert_eq!(message.sequence_number, 1);
/// });
/// ```
#[derive(Debug)]
pub struct TopicBus {
    // Map of topic id -> broadcast channel, created lazily on first subscribe.
    topics: RwLock<HashMap<EntityId, broadcast::Sender<TopicMessage>>>,
    // Per-channel capacity; a receiver that falls this far behind lags out.
    capacity: usize,
}

impl Default for TopicBus {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl TopicBus {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BusError::CapacityTooSmall);
        }
        Ok(Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        })
    }

    /// Fan a committed message out to current subscribers of its topic.
    /// Returns the number of receivers reached; zero when nobody listens.
    pub fn publish(&self, message: TopicMessage) -> usize {
        let guard = self.topics.read().expect("bus lock");
        let Some(sender) = guard.get(&message.topic_id) else {
            return 0;
        };
        let reached = sender.send(message).unwrap_or(0);
        tracing::trace!(reached, "published live topic message");
        reached
    }

    fn sender_for(&self, topic_id: EntityId) -> broadcast::Sender<TopicMessage> {
        if let Some(sender) = self.topics.read().expect("bus lock").get(&topic_id) {
            return sender.clone();
        }
        let mut guard = self.topics.write().expect("bus lock");
        guard
            .entry(topic_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl LiveBus for TopicBus {
    fn subscribe(&self, topic_id: EntityId) -> broadcast::Receiver<TopicMessage> {
        self.sender_for(topic_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message(topic_id: EntityId, sequence_number: u64) -> TopicMessage {
        TopicMessage {
            topic_id,
            sequence_number,
            consensus_timestamp: sequence_number as i64,
            message: Bytes::from_static(&[0, 1, 2]),
            running_hash: Bytes::from_static(&[3, 4, 5]),
            running_hash_version: 2,
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = TopicBus::new(16).expect("bus");
        let topic_id = EntityId::new(100);
        let mut sub = bus.subscribe(topic_id);
        assert_eq!(bus.publish(message(topic_id, 1)), 1);
        let received = sub.recv().await.expect("recv");
        assert_eq!(received.sequence_number, 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let bus = TopicBus::new(16).expect("bus");
        assert_eq!(bus.publish(message(EntityId::new(100), 1)), 0);
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = TopicBus::new(16).expect("bus");
        let topic_id = EntityId::new(100);
        let mut sub = bus.subscribe(topic_id);
        bus.publish(message(topic_id, 1));
        bus.publish(message(topic_id, 2));
        assert_eq!(sub.recv().await.expect("recv").sequence_number, 1);
        assert_eq!(sub.recv().await.expect("recv").sequence_number, 2);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = TopicBus::new(16).expect("bus");
        let topic_a = EntityId::new(100);
        let topic_b = EntityId::new(101);
        let mut sub_a = bus.subscribe(topic_a);
        let _sub_b = bus.subscribe(topic_b);
        assert_eq!(bus.publish(message(topic_b, 1)), 1);
        assert_eq!(bus.publish(message(topic_a, 1)), 1);
        let received = sub_a.recv().await.expect("recv");
        assert_eq!(received.topic_id, topic_a);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_fanout() {
        let bus = TopicBus::new(16).expect("bus");
        let topic_id = EntityId::new(100);
        let mut sub_a = bus.subscribe(topic_id);
        let mut sub_b = bus.subscribe(topic_id);
        assert_eq!(bus.publish(message(topic_id, 7)), 2);
        assert_eq!(sub_a.recv().await.expect("recv").sequence_number, 7);
        assert_eq!(sub_b.recv().await.expect("recv").sequence_number, 7);
    }

    #[tokio::test]
    async fn lagging_subscriber_observes_lag() {
        let bus = TopicBus::new(1).expect("bus");
        let topic_id = EntityId::new(100);
        let mut sub = bus.subscribe(topic_id);
        bus.publish(message(topic_id, 1));
        bus.publish(message(topic_id, 2));
        match sub.recv().await {
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            other => panic!("expected lagged error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_receiver_unsubscribes() {
        let bus = TopicBus::new(16).expect("bus");
        let topic_id = EntityId::new(100);
        let sub = bus.subscribe(topic_id);
        drop(sub);
        assert_eq!(bus.publish(message(topic_id, 1)), 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = TopicBus::new(0).expect_err("capacity");
        assert!(matches!(err, BusError::CapacityTooSmall));
    }
}
