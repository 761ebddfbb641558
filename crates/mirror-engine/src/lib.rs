//! Streaming topic-message subscription engine for a consensus-ledger
//! mirror node.
//!
//! A subscriber names a topic, a time range, and an optional row limit; the
//! engine splices the finite historical stream (paged from storage) into
//! the unbounded live stream (in-process bus) and delivers every message in
//! strict sequence order, without duplicates and without gaps. Sequence
//! jumps observed on the live side are repaired by targeted backfills from
//! storage before delivery resumes.
//!
//! The engine talks to the outside world through three ports: an entity
//! lookup and a message pager (both storage), and the live bus. The RPC
//! surface, the SQL behind the pager, and the ingestion pathway that feeds
//! the bus all live elsewhere.
use mirror_bus::LiveBus;
use mirror_common::{EntityKind, now_nanos};
use mirror_store::{EntityLookup, MessagePager};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod config;
pub mod error;
pub mod filter;
mod listener;
mod retriever;
mod subscription;
mod telemetry;

pub use config::{EngineConfig, RetrieverConfig};
pub use error::{StatusCode, SubscribeError};
pub use filter::TopicMessageFilter;
pub use subscription::TopicSubscription;

use listener::LiveStream;

/// Entry point for topic subscriptions. One engine serves the whole
/// process; every subscription it opens is an independent pull pipeline.
pub struct TopicMessageEngine {
    config: EngineConfig,
    entities: Arc<dyn EntityLookup>,
    pager: Arc<dyn MessagePager>,
    bus: Arc<dyn LiveBus>,
    next_subscriber_id: AtomicU64,
}

impl TopicMessageEngine {
    pub fn new(
        config: EngineConfig,
        entities: Arc<dyn EntityLookup>,
        pager: Arc<dyn MessagePager>,
        bus: Arc<dyn LiveBus>,
    ) -> Self {
        Self {
            config,
            entities,
            pager,
            bus,
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Validate the filter, verify the topic, and open a subscription.
    ///
    /// The live receiver is attached before historical retrieval begins so
    /// messages that commit while storage drains are buffered, not lost;
    /// the seam overlap is removed by the subscription's dedup stage.
    pub async fn subscribe_topic(
        &self,
        mut filter: TopicMessageFilter,
    ) -> Result<TopicSubscription, SubscribeError> {
        let result = self.open_subscription(&mut filter).await;
        if self.config.metrics_enabled {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics::counter!("mirror_subscribe_requests_total", "result" => outcome).increment(1);
        }
        result
    }

    async fn open_subscription(
        &self,
        filter: &mut TopicMessageFilter,
    ) -> Result<TopicSubscription, SubscribeError> {
        let topic_id = filter.validate(now_nanos())?;

        if self.config.check_topic_exists {
            match self.entities.find_entity(topic_id).await? {
                None => return Err(SubscribeError::TopicNotFound(topic_id)),
                Some(entity) if entity.kind != EntityKind::Topic => {
                    return Err(SubscribeError::InvalidArgument(format!(
                        "{topic_id} is not a valid topic id"
                    )));
                }
                Some(_) => {}
            }
        }

        filter.subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            subscriber_id = filter.subscriber_id,
            topic_id = %topic_id,
            start_time = filter.start_time,
            end_time = filter.end_time,
            limit = filter.limit,
            "opening topic subscription"
        );

        // Live first, then historical.
        let live = LiveStream::new(self.bus.subscribe(topic_id), topic_id, filter.start_time);
        Ok(TopicSubscription::new(
            &self.config,
            topic_id,
            filter,
            self.pager.clone(),
            live,
        ))
    }
}
