// Per-subscription counters, latency, and optional periodic status lines.
// Everything here is observational: emission goes through the global
// `metrics` recorder and never affects delivery.
use crate::error::SubscribeError;
use mirror_common::{EntityId, TopicMessage, now_nanos};
use std::time::{Duration, Instant};

pub(crate) struct SubscriptionTelemetry {
    enabled: bool,
    status_interval: Option<Duration>,
    subscriber_id: u64,
    topic_id: EntityId,
    started_at: Instant,
    last_status: Instant,
    delivered: u64,
    finished: bool,
}

impl SubscriptionTelemetry {
    pub(crate) fn new(
        enabled: bool,
        status_interval: Option<Duration>,
        subscriber_id: u64,
        topic_id: EntityId,
    ) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            status_interval,
            subscriber_id,
            topic_id,
            started_at: now,
            last_status: now,
            delivered: 0,
            finished: false,
        }
    }

    /// Record one delivery. End-to-end latency is only meaningful for live
    /// messages; historical rows would just measure their age.
    pub(crate) fn on_delivery(&mut self, message: &TopicMessage, live: bool) {
        self.delivered += 1;
        if self.enabled {
            metrics::counter!("mirror_subscribe_messages_total").increment(1);
            if live {
                let latency_ns = now_nanos().saturating_sub(message.consensus_timestamp);
                if latency_ns >= 0 {
                    metrics::histogram!("mirror_subscribe_e2e_latency_seconds")
                        .record(latency_ns as f64 / 1e9);
                }
            }
        }
        if let Some(interval) = self.status_interval
            && self.last_status.elapsed() >= interval
        {
            self.last_status = Instant::now();
            tracing::info!(
                subscriber_id = self.subscriber_id,
                topic_id = %self.topic_id,
                delivered = self.delivered,
                "subscription status"
            );
        }
    }

    pub(crate) fn on_gap_backfill(&self) {
        if self.enabled {
            metrics::counter!("mirror_subscribe_gap_backfills_total").increment(1);
        }
    }

    pub(crate) fn finish_complete(&mut self) {
        self.finish("ok");
    }

    pub(crate) fn finish_cancelled(&mut self) {
        self.finish("cancelled");
    }

    pub(crate) fn finish_error(&mut self, err: &SubscribeError) {
        self.finish(err.code().as_str());
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered
    }

    fn finish(&mut self, status: &'static str) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.enabled {
            metrics::counter!("mirror_subscribe_terminations_total", "status" => status)
                .increment(1);
            metrics::histogram!("mirror_subscribe_duration_seconds")
                .record(self.started_at.elapsed().as_secs_f64());
        }
        tracing::debug!(
            subscriber_id = self.subscriber_id,
            topic_id = %self.topic_id,
            delivered = self.delivered,
            status,
            "subscription finished"
        );
    }
}
