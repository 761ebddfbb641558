//! Pull-driven subscription pipeline.
//!
//! ## High-level flow
//! A subscription is opened with the live receiver already attached (so
//! nothing committed during the historical drain is lost), then pulled one
//! message at a time by the subscriber:
//!
//! - **Historical phase**: drain the throttled retriever to exhaustion.
//! - **Live phase**: tail the broadcast receiver. Anything at or below the
//!   last emitted sequence number is a seam overlap or a retransmit and is
//!   dropped silently.
//! - **Backfill**: a live message that jumps the sequence by more than one
//!   is parked, the missing window is fetched unthrottled from storage, and
//!   the fill is spliced in ahead of the parked message. The fill must be
//!   exactly contiguous; anything else fails the subscription rather than
//!   delivering a stream with a hole in it. A gap is backfilled once; if the
//!   parked message still does not line up afterwards, that is fatal.
//!
//! ## Termination
//! The stream completes on the row limit, on the exclusive end time (either
//! an out-of-range candidate or the wall clock passing the end time while
//! tailing), or when the subscriber drops the subscription. Errors are
//! first-terminal-wins; nothing is delivered after one.
//!
//! ## Backpressure
//! The pipeline is demand-driven end to end: no storage page is fetched and
//! no live message is consumed until the subscriber asks for the next
//! message. A subscriber that stalls long enough for its broadcast receiver
//! to overrun its capacity is cut off with a resource-exhausted error.
use crate::config::{EngineConfig, RetrieverConfig};
use crate::error::SubscribeError;
use crate::filter::TopicMessageFilter;
use crate::listener::LiveStream;
use crate::retriever::{HistoricalRetriever, RetrieveWindow};
use crate::telemetry::SubscriptionTelemetry;
use mirror_common::{EntityId, TopicMessage, nanos_until};
use mirror_store::MessagePager;
use std::sync::Arc;

// Sequence/timestamp pair of the most recently emitted message.
#[derive(Debug, Clone, Copy)]
struct Emitted {
    sequence_number: u64,
    consensus_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Historical,
    Live,
}

struct BackfillState {
    retriever: HistoricalRetriever,
    // Sequence the next fill row must carry.
    expected_next: u64,
    // The live message that revealed the gap; delivered after the fill.
    resume: TopicMessage,
}

/// One subscriber's view of a topic. Dropping it cancels the subscription
/// and releases the live receiver and any in-flight pagination.
impl std::fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("topic_id", &self.topic_id)
            .field("subscriber_id", &self.subscriber_id)
            .field("end_time", &self.end_time)
            .field("limit", &self.limit)
            .field("phase", &self.phase)
            .field("delivered", &self.delivered)
            .field("complete", &self.complete)
            .finish()
    }
}

pub struct TopicSubscription {
    topic_id: EntityId,
    subscriber_id: u64,
    end_time: Option<i64>,
    limit: u64,
    pager: Arc<dyn MessagePager>,
    retriever_config: RetrieverConfig,
    retriever: HistoricalRetriever,
    live: LiveStream,
    phase: Phase,
    backfill: Option<BackfillState>,
    last: Option<Emitted>,
    delivered: u64,
    complete: bool,
    telemetry: SubscriptionTelemetry,
}

impl TopicSubscription {
    pub(crate) fn new(
        config: &EngineConfig,
        topic_id: EntityId,
        filter: &TopicMessageFilter,
        pager: Arc<dyn MessagePager>,
        live: LiveStream,
    ) -> Self {
        let limit = filter.limit.max(0) as u64;
        let window = RetrieveWindow {
            topic_id,
            start_time: filter.start_time,
            end_time: filter.end_time,
            limit,
        };
        let retriever =
            HistoricalRetriever::new(pager.clone(), config.retriever.clone(), window, true);
        let telemetry = SubscriptionTelemetry::new(
            config.metrics_enabled,
            config.status_interval(),
            filter.subscriber_id,
            topic_id,
        );
        Self {
            topic_id,
            subscriber_id: filter.subscriber_id,
            end_time: filter.end_time,
            limit,
            pager,
            retriever_config: config.retriever.clone(),
            retriever,
            live,
            phase: Phase::Historical,
            backfill: None,
            last: None,
            delivered: 0,
            complete: false,
            telemetry,
        }
    }

    pub fn subscriber_id(&self) -> u64 {
        self.subscriber_id
    }

    pub fn topic_id(&self) -> EntityId {
        self.topic_id
    }

    /// Next message for this subscriber, in strictly ascending sequence
    /// order. `Ok(None)` is normal completion; errors are terminal.
    pub async fn next_message(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        match self.advance().await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                self.telemetry.finish_complete();
                Ok(None)
            }
            Err(err) => {
                self.complete = true;
                self.telemetry.finish_error(&err);
                Err(err)
            }
        }
    }

    /// Explicit cancellation; equivalent to dropping the subscription.
    pub fn cancel(mut self) {
        self.telemetry.finish_cancelled();
    }

    async fn advance(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        loop {
            if self.complete {
                return Ok(None);
            }

            // An active backfill owns the stream until the gap is repaired.
            if self.backfill.is_some() {
                return self.next_backfilled().await;
            }

            let candidate = match self.phase {
                Phase::Historical => match self.retriever.next().await? {
                    Some(message) => message,
                    None => {
                        self.phase = Phase::Live;
                        continue;
                    }
                },
                Phase::Live => match self.next_live().await? {
                    Some(message) => message,
                    None => {
                        self.complete = true;
                        return Ok(None);
                    }
                },
            };

            if let Some(last) = self.last {
                // Seam overlap or retransmit: already emitted, drop silently.
                if candidate.sequence_number <= last.sequence_number {
                    continue;
                }
                if self.phase == Phase::Live
                    && candidate.sequence_number > last.sequence_number + 1
                {
                    self.begin_backfill(last, candidate);
                    continue;
                }
            }
            return Ok(self.deliver(candidate));
        }
    }

    // Drain the fill in strict sequence order, then re-check the parked
    // live message. The fill is never retried; anything out of order or
    // short of the gap is an unreconciled gap and fails the subscription.
    async fn next_backfilled(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        let expected = match self.backfill.as_mut() {
            Some(state) => {
                let expected = state.expected_next;
                match state.retriever.next().await? {
                    Some(fill) => {
                        if fill.sequence_number != expected {
                            return Err(SubscribeError::MissingMessages {
                                last: expected - 1,
                                current: fill.sequence_number,
                            });
                        }
                        state.expected_next += 1;
                        return Ok(self.deliver(fill));
                    }
                    None => expected,
                }
            }
            None => return Ok(None),
        };

        // Fill exhausted: the parked message must line up exactly.
        let Some(state) = self.backfill.take() else {
            return Ok(None);
        };
        let resume = state.resume;
        if resume.sequence_number != expected {
            return Err(SubscribeError::MissingMessages {
                last: expected - 1,
                current: resume.sequence_number,
            });
        }
        Ok(self.deliver(resume))
    }

    async fn next_live(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        match self.end_time {
            Some(end_time) => {
                let wait = nanos_until(end_time);
                if wait.is_zero() {
                    return Ok(None);
                }
                match tokio::time::timeout(wait, self.live.recv()).await {
                    Ok(result) => result,
                    // Consensus time has reached the end time; nothing that
                    // can still arrive would be in range.
                    Err(_) => Ok(None),
                }
            }
            None => self.live.recv().await,
        }
    }

    /// Final bounds check and bookkeeping for an in-order candidate.
    fn deliver(&mut self, message: TopicMessage) -> Option<TopicMessage> {
        if let Some(end_time) = self.end_time
            && message.consensus_timestamp >= end_time
        {
            // End time is exclusive.
            self.complete = true;
            return None;
        }
        let live = self.phase == Phase::Live && self.backfill.is_none();
        self.last = Some(Emitted {
            sequence_number: message.sequence_number,
            consensus_timestamp: message.consensus_timestamp,
        });
        self.delivered += 1;
        if self.limit > 0 && self.delivered >= self.limit {
            self.complete = true;
        }
        self.telemetry.on_delivery(&message, live);
        Some(message)
    }

    fn begin_backfill(&mut self, last: Emitted, current: TopicMessage) {
        tracing::info!(
            subscriber_id = self.subscriber_id,
            topic_id = %self.topic_id,
            have = last.sequence_number,
            saw = current.sequence_number,
            "sequence gap on live stream, backfilling from storage"
        );
        self.telemetry.on_gap_backfill();
        let retriever = HistoricalRetriever::new(
            self.pager.clone(),
            self.retriever_config.clone(),
            backfill_window(self.topic_id, last, &current),
            false,
        );
        self.backfill = Some(BackfillState {
            retriever,
            expected_next: last.sequence_number + 1,
            resume: current,
        });
    }
}

impl Drop for TopicSubscription {
    fn drop(&mut self) {
        // Completion and errors are already finalized; anything else means
        // the subscriber went away mid-stream.
        self.telemetry.finish_cancelled();
    }
}

// The repair window between the last emitted message and the live message
// that exposed the gap: everything strictly between the two.
fn backfill_window(topic_id: EntityId, last: Emitted, current: &TopicMessage) -> RetrieveWindow {
    RetrieveWindow {
        topic_id,
        start_time: last.consensus_timestamp + 1,
        end_time: Some(current.consensus_timestamp),
        limit: current.sequence_number - last.sequence_number - 1,
    }
}
