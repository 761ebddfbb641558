use crate::error::SubscribeError;
use mirror_common::{EntityId, TopicMessage};
use tokio::sync::broadcast;

/// Live tail of a single topic, opened before the historical drain starts
/// so nothing committed in between is lost.
///
/// Messages before the filter's start time are skipped; routing is already
/// per-topic on the bus, but the topic is re-checked so a misrouted publish
/// can never leak into a subscription. A receiver that falls behind the
/// channel capacity is cut off rather than allowed to stall the publisher.
pub(crate) struct LiveStream {
    rx: broadcast::Receiver<TopicMessage>,
    topic_id: EntityId,
    start_time: i64,
}

impl LiveStream {
    pub(crate) fn new(
        rx: broadcast::Receiver<TopicMessage>,
        topic_id: EntityId,
        start_time: i64,
    ) -> Self {
        Self {
            rx,
            topic_id,
            start_time,
        }
    }

    /// Next live message matching the filter. `Ok(None)` means the bus shut
    /// down, which completes the subscription gracefully.
    pub(crate) async fn recv(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if message.topic_id != self.topic_id
                        || message.consensus_timestamp < self.start_time
                    {
                        continue;
                    }
                    return Ok(Some(message));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(SubscribeError::Overflow(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
