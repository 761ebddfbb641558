use crate::error::SubscribeError;
use mirror_common::EntityId;

/// Request-scoped subscription filter.
///
/// `topic_id` arrives from the wire and may be absent; validation rejects
/// that before any I/O. `limit` of zero means unbounded. `subscriber_id` is
/// assigned by the engine when the subscription is established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMessageFilter {
    pub topic_id: Option<EntityId>,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub limit: i64,
    pub subscriber_id: u64,
}

impl TopicMessageFilter {
    pub fn new(topic_id: EntityId) -> Self {
        Self {
            topic_id: Some(topic_id),
            ..Self::default()
        }
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_end_time(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn has_limit(&self) -> bool {
        self.limit > 0
    }

    /// Check every filter invariant against `now` (nanoseconds since epoch)
    /// and return the topic id on success. All violations are reported in a
    /// single message so clients can fix a bad request in one round trip.
    pub fn validate(&self, now: i64) -> Result<EntityId, SubscribeError> {
        let mut violations = Vec::new();
        if self.topic_id.is_none() {
            violations.push("topicId must not be null".to_string());
        }
        if self.start_time < 0 {
            violations.push("startTime must be greater than or equal to 0".to_string());
        }
        if self.limit < 0 {
            violations.push("limit must be greater than or equal to 0".to_string());
        }
        if let Some(end_time) = self.end_time
            && end_time <= self.start_time
        {
            violations.push("End time must be after start time".to_string());
        }
        if self.start_time > now {
            violations.push("Start time must be before the current time".to_string());
        }
        match (violations.is_empty(), self.topic_id) {
            (true, Some(topic_id)) => Ok(topic_id),
            _ => Err(SubscribeError::InvalidArgument(violations.join(", "))),
        }
    }
}
